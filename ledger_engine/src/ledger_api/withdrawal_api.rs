//! The withdrawal actions used by sellers and riders, and by whoever approves their requests.
//!
//! Both actions return an [`ActionResult`] rather than an error so that the role-gated layer calling them can hand the
//! outcome straight back to the user.
use std::fmt::Debug;

use chrono::Utc;
use ledger_common::USD_CURRENCY_CODE_LOWER;
use log::*;

use crate::{
    db_types::{NewWithdrawal, Usd, Withdrawal, WithdrawalKind, WithdrawalMethod, WithdrawalStatus},
    ledger_api::{
        action::{ActionResult, INVALID_AMOUNT, NOT_FOUND, NO_PAYOUT_ACCOUNT, TRANSFER_FAILED, TRANSFER_PENDING},
        policy::PayoutPolicy,
        transfer::{TransferError, TransferProvider, TransferRequest},
    },
    references,
    traits::{OrderManagement, WithdrawalError, WithdrawalManagement},
};

pub struct WithdrawalApi<B, T> {
    db: B,
    transfers: T,
    treasury_user_id: i64,
    policy: PayoutPolicy,
}

impl<B, T: TransferProvider> Debug for WithdrawalApi<B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WithdrawalApi ({}, treasury: #{})", self.transfers.provider_name(), self.treasury_user_id)
    }
}

impl<B, T> WithdrawalApi<B, T> {
    pub fn new(db: B, transfers: T, treasury_user_id: i64, policy: PayoutPolicy) -> Self {
        Self { db, transfers, treasury_user_id, policy }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, T> WithdrawalApi<B, T>
where
    B: WithdrawalManagement + OrderManagement,
    T: TransferProvider,
{
    /// Requests a withdrawal of `amount` from the user's wallet. The funds are reserved immediately, so a second
    /// request cannot spend them again while this one is open.
    pub async fn request_withdrawal(
        &self,
        kind: WithdrawalKind,
        user_id: i64,
        amount: Usd,
        method: WithdrawalMethod,
    ) -> ActionResult<Withdrawal> {
        if !amount.is_positive() {
            return ActionResult::failure(INVALID_AMOUNT, format!("Withdrawal amount must be positive. Got {amount}"));
        }
        if amount < self.policy.min_withdrawal {
            return WithdrawalError::BelowMinimum { amount, minimum: self.policy.min_withdrawal }.into();
        }
        let user = match self.db.fetch_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return WithdrawalError::UserNotFound(user_id).into(),
            Err(e) => return WithdrawalError::DatabaseError(e.to_string()).into(),
        };
        if user.stripe_account_id.is_none() {
            return WithdrawalError::NoPayoutAccount(user_id).into();
        }
        let request = NewWithdrawal { user_id, kind, amount, method };
        match self.db.create_withdrawal(request, self.treasury_user_id).await {
            Ok(withdrawal) => ActionResult::ok(withdrawal),
            Err(e) => {
                debug!("🏧️ {kind} withdrawal of {amount} for user #{user_id} refused: {e}");
                e.into()
            },
        }
    }

    /// Pays out a withdrawal through the transfer provider.
    ///
    /// A withdrawal that is already COMPLETED or REJECTED is returned as it is. If the provider declines the transfer,
    /// the withdrawal is rejected with the provider's message and the reserved funds go back to the wallet. If the
    /// provider cannot be reached, the withdrawal stays PROCESSING and approving it again retries the same transfer.
    pub async fn approve_withdrawal(&self, kind: WithdrawalKind, id: i64) -> ActionResult<Withdrawal> {
        let withdrawal = match self.db.fetch_withdrawal(id).await {
            Ok(Some(w)) if w.kind == kind => w,
            Ok(_) => return ActionResult::failure(NOT_FOUND, format!("There is no {kind} withdrawal #{id}")),
            Err(e) => return e.into(),
        };
        if withdrawal.status.is_terminal() {
            debug!("🏧️ Withdrawal #{id} is already {}. Nothing to do.", withdrawal.status);
            return ActionResult::ok(withdrawal);
        }
        let destination = match self.db.fetch_user(withdrawal.user_id).await {
            Ok(Some(user)) => user.stripe_account_id,
            Ok(None) => None,
            Err(e) => return WithdrawalError::DatabaseError(e.to_string()).into(),
        };
        let Some(destination) = destination else {
            let reason = format!("User #{} has no payout account configured", withdrawal.user_id);
            if withdrawal.status == WithdrawalStatus::Processing {
                // An earlier attempt may still land, so the reservation stays put
                return ActionResult::failure_with(NO_PAYOUT_ACCOUNT, reason, withdrawal);
            }
            return match self.db.reject_withdrawal(id, &reason, self.treasury_user_id, Utc::now()).await {
                Ok(w) => ActionResult::failure_with(NO_PAYOUT_ACCOUNT, reason, w),
                Err(e) => e.into(),
            };
        };
        let withdrawal = match self.db.mark_withdrawal_processing(id, Utc::now()).await {
            Ok(w) => w,
            Err(e) => return e.into(),
        };
        let request = TransferRequest {
            amount_cents: withdrawal.amount.cents(),
            currency: USD_CURRENCY_CODE_LOWER.to_string(),
            destination,
            idempotency_key: references::withdrawal(kind, id),
            description: Some(format!("{kind} withdrawal #{id}")),
        };
        match self.transfers.create_transfer(request).await {
            Ok(receipt) => {
                match self.db.complete_withdrawal(id, &receipt, self.treasury_user_id, Utc::now()).await {
                    Ok(w) => ActionResult::ok(w),
                    Err(e) => {
                        error!(
                            "🏧️ Transfer {} for withdrawal #{id} went through but the withdrawal could not be settled. \
                             Approving it again will retry the settlement. {e}",
                            receipt.transfer_id
                        );
                        e.into()
                    },
                }
            },
            Err(TransferError::Declined(message)) => {
                let reason = format!("The transfer was declined: {message}");
                warn!("🏧️ Transfer for withdrawal #{id} was declined: {message}");
                match self.db.fail_withdrawal(id, &reason, self.treasury_user_id, Utc::now()).await {
                    Ok(w) => ActionResult::failure_with(TRANSFER_FAILED, reason, w),
                    Err(e) => e.into(),
                }
            },
            Err(e @ TransferError::Unavailable(_)) => {
                warn!("🏧️ Transfer for withdrawal #{id} is still PROCESSING and can be approved again. {e}");
                let message = format!("{e}. Approve the withdrawal again to retry.");
                ActionResult::failure_with(TRANSFER_PENDING, message, withdrawal)
            },
        }
    }

    /// Rejects a PENDING withdrawal and returns its reserved funds to the wallet. A PROCESSING withdrawal is refused
    /// with INVALID_STATE, since its transfer may still go through.
    pub async fn reject_withdrawal(&self, kind: WithdrawalKind, id: i64, reason: &str) -> ActionResult<Withdrawal> {
        match self.db.fetch_withdrawal(id).await {
            Ok(Some(w)) if w.kind == kind => {},
            Ok(_) => return ActionResult::failure(NOT_FOUND, format!("There is no {kind} withdrawal #{id}")),
            Err(e) => return e.into(),
        }
        match self.db.reject_withdrawal(id, reason, self.treasury_user_id, Utc::now()).await {
            Ok(w) => ActionResult::ok(w),
            Err(e) => e.into(),
        }
    }

    pub async fn withdrawals_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalError> {
        self.db.fetch_withdrawals_for_user(user_id).await
    }
}
