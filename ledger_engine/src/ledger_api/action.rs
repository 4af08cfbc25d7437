use serde::{Deserialize, Serialize};

use crate::traits::{LedgerError, WithdrawalError};

pub const INVALID_AMOUNT: &str = "INVALID_AMOUNT";
pub const BELOW_MINIMUM: &str = "BELOW_MINIMUM";
pub const NO_PAYOUT_ACCOUNT: &str = "NO_PAYOUT_ACCOUNT";
pub const INSUFFICIENT_BALANCE: &str = "INSUFFICIENT_BALANCE";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const INVALID_STATE: &str = "INVALID_STATE";
pub const TRANSFER_FAILED: &str = "TRANSFER_FAILED";
/// The provider could not be reached. The withdrawal is still PROCESSING and may be approved again.
pub const TRANSFER_PENDING: &str = "TRANSFER_PENDING";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// The small structured result the withdrawal actions hand back to their callers instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, code: None, message: None, data: Some(data) }
    }

    pub fn failure<S: Into<String>>(code: &str, message: S) -> Self {
        Self { success: false, code: Some(code.to_string()), message: Some(message.into()), data: None }
    }

    /// A failure that still carries the record it concerns, e.g. a withdrawal that was rejected.
    pub fn failure_with<S: Into<String>>(code: &str, message: S, data: T) -> Self {
        Self { data: Some(data), ..Self::failure(code, message) }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl<T> From<WithdrawalError> for ActionResult<T> {
    fn from(e: WithdrawalError) -> Self {
        let code = match &e {
            WithdrawalError::InvalidAmount(_) => INVALID_AMOUNT,
            WithdrawalError::BelowMinimum { .. } => BELOW_MINIMUM,
            WithdrawalError::NoPayoutAccount(_) => NO_PAYOUT_ACCOUNT,
            WithdrawalError::InsufficientBalance { .. } |
            WithdrawalError::LedgerError(LedgerError::InsufficientFunds { .. }) => INSUFFICIENT_BALANCE,
            WithdrawalError::UserNotFound(_) | WithdrawalError::WithdrawalNotFound(_) => NOT_FOUND,
            WithdrawalError::InvalidState { .. } => INVALID_STATE,
            WithdrawalError::DatabaseError(_) | WithdrawalError::LedgerError(_) => INTERNAL_ERROR,
        };
        Self::failure(code, e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::{Usd, WithdrawalStatus};

    #[test]
    fn errors_map_to_stable_codes() {
        let r: ActionResult<()> =
            WithdrawalError::InsufficientBalance { available: Usd::from(1500), requested: Usd::from(2000) }.into();
        assert!(!r.success);
        assert_eq!(r.code(), Some(INSUFFICIENT_BALANCE));
        let r: ActionResult<()> = WithdrawalError::InvalidState { id: 4, status: WithdrawalStatus::Rejected }.into();
        assert_eq!(r.code(), Some(INVALID_STATE));
        let r: ActionResult<()> = WithdrawalError::DatabaseError("disk full".into()).into();
        assert_eq!(r.code(), Some(INTERNAL_ERROR));
    }

    #[test]
    fn an_overdrawn_wallet_is_a_balance_problem() {
        let overdrawn =
            LedgerError::InsufficientFunds { wallet_id: 3, balance: Usd::from(900), required: Usd::from(2500) };
        let r: ActionResult<()> = WithdrawalError::from(overdrawn).into();
        assert_eq!(r.code(), Some(INSUFFICIENT_BALANCE));
        let r: ActionResult<()> = WithdrawalError::from(LedgerError::DatabaseError("locked".into())).into();
        assert_eq!(r.code(), Some(INTERNAL_ERROR));
    }

    #[test]
    fn success_serializes_without_code() {
        let r = ActionResult::ok(42);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"success":true,"data":42}"#);
    }
}
