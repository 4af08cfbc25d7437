use chrono::{DateTime, Utc};
use log::*;
use serde_json::json;
use sqlx::SqliteConnection;

use super::{ledger, transactions, wallets};
use crate::{
    db_types::{
        LedgerEntryType,
        NewWalletTransaction,
        NewWithdrawal,
        TransactionStatus,
        TransactionType,
        Withdrawal,
        WithdrawalStatus,
    },
    ledger_api::transfer::TransferReceipt,
    references,
    traits::{DoubleEntryRequest, Party, WithdrawalError},
};

/// Stores a new withdrawal request and reserves its funds by moving them from the wallet to the treasury.
///
/// The available balance is the smaller of the cached balance and the journal balance, so a cache that has drifted
/// upwards can never be withdrawn.
pub async fn create_withdrawal(
    request: NewWithdrawal,
    treasury_user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, WithdrawalError> {
    if !request.amount.is_positive() {
        return Err(WithdrawalError::InvalidAmount(request.amount));
    }
    let wallet = wallets::fetch_or_create_wallet(request.user_id, conn).await?;
    let ledger_balance = wallets::ledger_balance(wallet.id, conn).await?;
    let available = wallet.balance.min(ledger_balance);
    if available < request.amount {
        debug!(
            "🏧️ User #{} asked to withdraw {} but only {available} is available",
            request.user_id, request.amount
        );
        return Err(WithdrawalError::InsufficientBalance { available, requested: request.amount });
    }
    let withdrawal: Withdrawal = sqlx::query_as(
        r#"INSERT INTO withdrawals (wallet_id, user_id, kind, amount, method) VALUES (?, ?, ?, ?, ?) RETURNING *"#,
    )
    .bind(wallet.id)
    .bind(request.user_id)
    .bind(request.kind)
    .bind(request.amount)
    .bind(request.method)
    .fetch_one(&mut *conn)
    .await?;
    let reserve = DoubleEntryRequest::new(
        Party::Wallet(wallet.id),
        Party::User(treasury_user_id),
        request.amount,
        LedgerEntryType::WalletWithdrawal,
        references::withdrawal_reserve(request.kind, withdrawal.id),
    )
    .with_description(format!("Funds reserved for withdrawal #{}", withdrawal.id));
    ledger::create_double_entry(&reserve, conn).await?;
    info!("🏧️ Withdrawal #{} of {} requested by user #{}", withdrawal.id, withdrawal.amount, withdrawal.user_id);
    Ok(withdrawal)
}

pub async fn fetch_withdrawal(id: i64, conn: &mut SqliteConnection) -> Result<Option<Withdrawal>, sqlx::Error> {
    let withdrawal = sqlx::query_as("SELECT * FROM withdrawals WHERE id = ?").bind(id).fetch_optional(conn).await?;
    Ok(withdrawal)
}

pub async fn fetch_withdrawals_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Withdrawal>, sqlx::Error> {
    let withdrawals = sqlx::query_as("SELECT * FROM withdrawals WHERE user_id = ? ORDER BY id")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(withdrawals)
}

pub async fn mark_processing(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, WithdrawalError> {
    let claimed: Option<Withdrawal> = sqlx::query_as(
        r#"UPDATE withdrawals SET status = 'PROCESSING', updated_at = ?
        WHERE id = ? AND status IN ('PENDING', 'PROCESSING') RETURNING *"#,
    )
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match claimed {
        Some(w) => Ok(w),
        None => {
            let current = fetch_withdrawal(id, conn).await?.ok_or(WithdrawalError::WithdrawalNotFound(id))?;
            Err(WithdrawalError::InvalidState { id, status: current.status })
        },
    }
}

/// Moves the withdrawal into `status` if it is PENDING, or PROCESSING when `close_processing` is set. Otherwise
/// returns the row as it is.
async fn close_withdrawal(
    id: i64,
    status: WithdrawalStatus,
    close_processing: bool,
    account_info: String,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Result<Withdrawal, Withdrawal>, WithdrawalError> {
    let closed: Option<Withdrawal> = sqlx::query_as(
        r#"UPDATE withdrawals SET status = ?, processed_at = ?, account_info = ?, updated_at = ?
        WHERE id = ? AND (status = 'PENDING' OR (? AND status = 'PROCESSING')) RETURNING *"#,
    )
    .bind(status)
    .bind(now)
    .bind(account_info)
    .bind(now)
    .bind(id)
    .bind(close_processing)
    .fetch_optional(&mut *conn)
    .await?;
    match closed {
        Some(w) => Ok(Ok(w)),
        None => {
            let current = fetch_withdrawal(id, conn).await?.ok_or(WithdrawalError::WithdrawalNotFound(id))?;
            Ok(Err(current))
        },
    }
}

/// Settles a withdrawal whose external transfer went through: the reserved funds leave the treasury for the external
/// account, and the payout is recorded in the user's history.
pub async fn complete_withdrawal(
    id: i64,
    receipt: &TransferReceipt,
    treasury_user_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, WithdrawalError> {
    let account_info = json!({
        "provider": receipt.provider,
        "transfer_id": receipt.transfer_id,
        "destination": receipt.destination,
    });
    let closed = close_withdrawal(id, WithdrawalStatus::Completed, true, account_info.to_string(), now, conn).await?;
    let withdrawal = match closed {
        Ok(w) => w,
        Err(w) if w.status == WithdrawalStatus::Completed => return Ok(w),
        Err(w) => return Err(WithdrawalError::InvalidState { id, status: w.status }),
    };
    let reference = references::withdrawal(withdrawal.kind, id);
    if transactions::fetch_by_reference(&reference, conn).await?.is_some() {
        warn!("🏧️ Withdrawal #{id} already had a settlement transaction. Not settling it again.");
        return Ok(withdrawal);
    }
    let settlement = DoubleEntryRequest::new(
        Party::User(treasury_user_id),
        Party::External(Some(withdrawal.user_id)),
        withdrawal.amount,
        withdrawal.kind.payout_entry_type(),
        reference.as_str(),
    )
    .with_description(format!("Withdrawal #{id} paid out via {} ({})", receipt.provider, receipt.transfer_id));
    ledger::create_double_entry(&settlement, conn).await?;
    let tx = NewWalletTransaction {
        wallet_id: withdrawal.wallet_id,
        order_id: None,
        user_id: Some(withdrawal.user_id),
        amount: withdrawal.amount,
        tx_type: withdrawal.kind.payout_transaction_type(),
        status: TransactionStatus::Success,
        reference,
        description: Some(format!("Withdrawal to {}", receipt.destination)),
    };
    transactions::idempotent_insert(tx, conn).await?;
    info!("🏧️ Withdrawal #{id} of {} completed. Transfer {}", withdrawal.amount, receipt.transfer_id);
    Ok(withdrawal)
}

/// Rejects the withdrawal and returns the reserved funds to the wallet.
///
/// A PROCESSING withdrawal may already have a transfer in flight, so it is only closed when `after_declined_transfer`
/// is set, i.e. the provider has refused that transfer for good.
pub async fn reject_withdrawal(
    id: i64,
    reason: &str,
    after_declined_transfer: bool,
    treasury_user_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, WithdrawalError> {
    let account_info = json!({ "rejected": true, "reason": reason });
    let status = WithdrawalStatus::Rejected;
    let closed = close_withdrawal(id, status, after_declined_transfer, account_info.to_string(), now, conn).await?;
    let withdrawal = match closed {
        Ok(w) => w,
        Err(w) if w.status == WithdrawalStatus::Rejected => return Ok(w),
        Err(w) => return Err(WithdrawalError::InvalidState { id, status: w.status }),
    };
    let reserve = format!("{}-debit", references::withdrawal_reserve(withdrawal.kind, id));
    if ledger::fetch_entry(&reserve, conn).await?.is_none() {
        warn!("🏧️ Withdrawal #{id} had no reservation. Nothing to return to the wallet.");
        return Ok(withdrawal);
    }
    let reference = references::withdrawal_reversal(withdrawal.kind, id);
    let reversal = DoubleEntryRequest::new(
        Party::User(treasury_user_id),
        Party::Wallet(withdrawal.wallet_id),
        withdrawal.amount,
        LedgerEntryType::Refund,
        reference.as_str(),
    )
    .with_description(format!("Withdrawal #{id} rejected: {reason}"));
    ledger::create_double_entry(&reversal, conn).await?;
    let tx = NewWalletTransaction {
        wallet_id: withdrawal.wallet_id,
        order_id: None,
        user_id: Some(withdrawal.user_id),
        amount: withdrawal.amount,
        tx_type: TransactionType::Refund,
        status: TransactionStatus::Success,
        reference,
        description: Some(format!("Withdrawal #{id} rejected. Funds returned.")),
    };
    transactions::idempotent_insert(tx, conn).await?;
    warn!(
        "🏧️ Withdrawal #{id} rejected and {} returned to wallet #{}: {reason}",
        withdrawal.amount, withdrawal.wallet_id
    );
    Ok(withdrawal)
}
