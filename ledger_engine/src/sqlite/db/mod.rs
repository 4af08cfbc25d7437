//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers obtain a connection from a pool, or open a transaction and call through to the functions
//! without any other changes.
//!
//! Wallet balances are only changed from inside this module. The mutators in [`wallets`] are not visible to the rest of
//! the crate, and are only called by the ledger, payout and withdrawal flows.
//!
//! When a transaction begins by claiming a row (`UPDATE ... WHERE <expected state>`), the claim must be its first
//! statement. SQLite only waits for a competing writer if the connection has not read anything yet in the
//! transaction; a claim issued after a read fails with `SQLITE_BUSY` instead of queueing behind the other worker.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod cron_locks;
pub mod escrow;
pub mod jobs;
pub mod ledger;
pub mod orders;
pub mod payouts;
pub mod snapshots;
pub mod transactions;
pub mod users;
pub mod wallets;
pub mod withdrawals;

const SQLITE_DB_URL: &str = "sqlite://data/ledger.db";

pub fn db_url() -> String {
    let result = env::var("LEDGER_DATABASE_URL").unwrap_or_else(|_| {
        info!("LEDGER_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
