use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewWithdrawal, Usd, Withdrawal, WithdrawalStatus},
    ledger_api::transfer::TransferReceipt,
    traits::LedgerError,
};

#[derive(Debug, Clone, Error)]
pub enum WithdrawalError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),
    #[error("Withdrawal amount must be greater than zero. Got {0}")]
    InvalidAmount(Usd),
    #[error("Withdrawal of {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Usd, minimum: Usd },
    #[error("User #{0} has no payout account configured")]
    NoPayoutAccount(i64),
    #[error("Insufficient balance. {available} is available, but {requested} was requested")]
    InsufficientBalance { available: Usd, requested: Usd },
    #[error("User #{0} does not exist")]
    UserNotFound(i64),
    #[error("Withdrawal #{0} does not exist")]
    WithdrawalNotFound(i64),
    #[error("Withdrawal #{id} is {status} and cannot be processed")]
    InvalidState { id: i64, status: WithdrawalStatus },
}

impl From<sqlx::Error> for WithdrawalError {
    fn from(e: sqlx::Error) -> Self {
        WithdrawalError::DatabaseError(e.to_string())
    }
}

/// Persistence for the withdrawal state machine: `PENDING -> PROCESSING -> COMPLETED`, or `-> REJECTED`.
#[allow(async_fn_in_trait)]
pub trait WithdrawalManagement {
    /// Checks the available balance, stores the request and reserves the funds (wallet -> treasury) in one
    /// transaction.
    async fn create_withdrawal(
        &self,
        request: NewWithdrawal,
        treasury_user_id: i64,
    ) -> Result<Withdrawal, WithdrawalError>;

    async fn fetch_withdrawal(&self, id: i64) -> Result<Option<Withdrawal>, WithdrawalError>;

    async fn fetch_withdrawals_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalError>;

    /// Moves a PENDING or PROCESSING withdrawal to PROCESSING. Terminal withdrawals are returned as
    /// `InvalidState`.
    async fn mark_withdrawal_processing(&self, id: i64, now: DateTime<Utc>) -> Result<Withdrawal, WithdrawalError>;

    /// Writes the settlement (treasury -> external) and marks the withdrawal COMPLETED. Calling this again for a
    /// completed withdrawal returns it unchanged.
    async fn complete_withdrawal(
        &self,
        id: i64,
        receipt: &TransferReceipt,
        treasury_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, WithdrawalError>;

    /// Marks a PENDING withdrawal REJECTED and returns the reserved funds to the wallet. A PROCESSING withdrawal may
    /// have a transfer in flight and is returned as `InvalidState`.
    async fn reject_withdrawal(
        &self,
        id: i64,
        reason: &str,
        treasury_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, WithdrawalError>;

    /// Like [`Self::reject_withdrawal`], but also closes a PROCESSING withdrawal. Only call this once the provider has
    /// declined the transfer.
    async fn fail_withdrawal(
        &self,
        id: i64,
        reason: &str,
        treasury_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, WithdrawalError>;
}
