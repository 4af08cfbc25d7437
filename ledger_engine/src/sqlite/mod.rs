//! SQLite backend for the ledger engine.
//!
//! [`SqliteDatabase`] implements every backend trait. The free functions in [`db`] are the building blocks it composes
//! inside its transactions.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
