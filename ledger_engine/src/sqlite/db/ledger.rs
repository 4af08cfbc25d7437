use log::*;
use sqlx::SqliteConnection;

use super::wallets;
use crate::{
    db_types::{EntryDirection, LedgerEntry, NewLedgerEntry, Usd, Wallet},
    traits::{DoubleEntryRequest, DoubleEntryResult, InsertResult, LedgerError, Party},
};

/// Creates the entry unless one with the same reference already exists.
///
/// A concurrent writer can win the race between the lookup and the insert; the unique constraint on `reference`
/// catches that, and the existing row is returned as `AlreadyExists`.
pub async fn idempotent_insert(
    entry: NewLedgerEntry,
    conn: &mut SqliteConnection,
) -> Result<InsertResult<LedgerEntry>, LedgerError> {
    if let Some(existing) = fetch_entry(&entry.reference, conn).await? {
        trace!("🗃️ Ledger entry {} already exists", entry.reference);
        return Ok(InsertResult::AlreadyExists(existing));
    }
    let reference = entry.reference.clone();
    let result = sqlx::query_as(
        r#"
            INSERT INTO ledger_entries
                (order_id, user_id, wallet_id, entry_type, direction, amount, reference, description)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *;
        "#,
    )
    .bind(entry.order_id)
    .bind(entry.user_id)
    .bind(entry.wallet_id)
    .bind(entry.entry_type)
    .bind(entry.direction)
    .bind(entry.amount)
    .bind(entry.reference)
    .bind(entry.description)
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(created) => Ok(InsertResult::Inserted(created)),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            debug!("🗃️ Lost the race to insert ledger entry {reference}");
            let existing = fetch_entry(&reference, conn).await?.ok_or(LedgerError::MissingEntry(reference))?;
            Ok(InsertResult::AlreadyExists(existing))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_entry(reference: &str, conn: &mut SqliteConnection) -> Result<Option<LedgerEntry>, sqlx::Error> {
    let entry = sqlx::query_as("SELECT * FROM ledger_entries WHERE reference = ?")
        .bind(reference)
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}

pub async fn fetch_entries_for_wallet(
    wallet_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM ledger_entries WHERE wallet_id = ? ORDER BY id")
        .bind(wallet_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

pub async fn fetch_entries_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM ledger_entries WHERE order_id = ? ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

struct ResolvedParty {
    wallet: Option<Wallet>,
    user_id: Option<i64>,
}

async fn resolve(party: Party, conn: &mut SqliteConnection) -> Result<ResolvedParty, LedgerError> {
    match party {
        Party::Wallet(id) => {
            let wallet =
                wallets::fetch_wallet(id, conn).await?.ok_or_else(|| LedgerError::WalletNotFound(party.to_string()))?;
            Ok(ResolvedParty { user_id: Some(wallet.user_id), wallet: Some(wallet) })
        },
        Party::User(user_id) => {
            let wallet = wallets::fetch_or_create_wallet(user_id, conn).await?;
            Ok(ResolvedParty { wallet: Some(wallet), user_id: Some(user_id) })
        },
        Party::External(user_id) => Ok(ResolvedParty { wallet: None, user_id }),
    }
}

/// Writes a balanced debit/credit pair and applies it to the cached wallet balances.
///
/// Each balance change is gated on its entry having been created by this call, so re-running a request with the same
/// reference changes nothing. The balance check on the source wallet is skipped when the debit already exists for the
/// same reason: the money has already left.
///
/// Call this inside a transaction. If anything fails, the caller must roll back.
pub async fn create_double_entry(
    request: &DoubleEntryRequest,
    conn: &mut SqliteConnection,
) -> Result<DoubleEntryResult, LedgerError> {
    let amount = request.amount;
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let from = resolve(request.from, conn).await?;
    let to = resolve(request.to, conn).await?;
    let debit_ref = request.debit_reference();
    let credit_ref = request.credit_reference();

    let already_debited = fetch_entry(&debit_ref, conn).await?.is_some();
    if let Some(wallet) = from.wallet.as_ref() {
        if !already_debited && !request.allow_negative_from_wallet && wallet.balance < amount {
            debug!("🗃️ Wallet #{} cannot cover {amount} for {}", wallet.id, request.reference);
            let (wallet_id, balance) = (wallet.id, wallet.balance);
            return Err(LedgerError::InsufficientFunds { wallet_id, balance, required: amount });
        }
    }

    let debit = NewLedgerEntry {
        order_id: request.order_id,
        user_id: from.user_id,
        wallet_id: from.wallet.as_ref().map(|w| w.id),
        entry_type: request.entry_type,
        direction: EntryDirection::Debit,
        amount,
        reference: debit_ref.clone(),
        description: request.description.clone(),
    };
    let credit = NewLedgerEntry {
        order_id: request.order_id,
        user_id: to.user_id,
        wallet_id: to.wallet.as_ref().map(|w| w.id),
        entry_type: request.entry_type,
        direction: EntryDirection::Credit,
        amount,
        reference: credit_ref.clone(),
        description: request.description.clone(),
    };
    let debit_created = idempotent_insert(debit, conn).await?.created();
    let credit_created = idempotent_insert(credit, conn).await?.created();

    if debit_created {
        if let Some(wallet) = from.wallet.as_ref() {
            wallets::adjust_balance(wallet.id, -amount, conn).await?;
        }
    }
    if credit_created {
        if let Some(wallet) = to.wallet.as_ref() {
            wallets::adjust_balance(wallet.id, amount, conn).await?;
        }
    }

    let debit = fetch_entry(&debit_ref, conn).await?.ok_or_else(|| LedgerError::MissingEntry(debit_ref.clone()))?;
    let credit = fetch_entry(&credit_ref, conn).await?.ok_or_else(|| LedgerError::MissingEntry(credit_ref.clone()))?;
    if debit.amount != credit.amount {
        error!(
            "🗃️ LEDGER IMBALANCE for {}. Debit {debit_ref} is {} but credit {credit_ref} is {}",
            request.reference, debit.amount, credit.amount
        );
        return Err(LedgerError::Imbalance {
            reference: request.reference.clone(),
            debit: debit.amount,
            credit: credit.amount,
        });
    }
    let created = debit_created || credit_created;
    if created {
        debug!("🗃️ {} {amount} {} -> {} [{}]", request.entry_type, request.from, request.to, request.reference);
    } else {
        trace!("🗃️ {} has already been applied", request.reference);
    }
    Ok(DoubleEntryResult { debit, credit, created })
}

/// Overwrites the cached balance with the journal balance and returns the repaired wallet.
pub async fn recalculate_wallet(wallet_id: i64, conn: &mut SqliteConnection) -> Result<Wallet, LedgerError> {
    let balance: Usd = wallets::ledger_balance(wallet_id, conn).await?;
    let wallet = wallets::overwrite_balance(wallet_id, balance, conn)
        .await?
        .ok_or_else(|| LedgerError::WalletNotFound(format!("wallet #{wallet_id}")))?;
    info!("🗃️ Wallet #{wallet_id} balance recalculated from the ledger: {balance}");
    Ok(wallet)
}
