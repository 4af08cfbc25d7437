//! Ledger Engine
//!
//! The ledger engine is the financial core of the marketplace. It keeps a double-entry journal of every movement of
//! money, holds buyers' payments in escrow until their orders are delivered, releases seller and rider earnings on a
//! schedule, and handles seller and rider withdrawals to an external payout provider.
//!
//! The library is divided into three main sections:
//! 1. The data model ([`mod@db_types`]) and the backend traits ([`mod@traits`]). A storage backend implements the
//!    traits; SQLite ([`SqliteDatabase`]) is the one provided.
//! 2. The public API ([`mod@ledger_api`]). Each API struct wraps a backend and is what callers should use. The APIs
//!    take care of timing policy, commission rates and the treasury account, so the backend never needs ambient state.
//! 3. Idempotency references ([`mod@references`]). Every financial effect is keyed by one of these, so that retries
//!    and duplicate deliveries never apply the same effect twice.
pub mod db_types;
pub mod ledger_api;
pub mod references;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use ledger_api::{
    action::ActionResult,
    commission::{CommissionError, CommissionRates, CommissionSplit},
    escrow_flow_api::EscrowFlowApi,
    jobs::JobPayload,
    policy::PayoutPolicy,
    scheduler_api::{SchedulerApi, WorkerReport, WorkerResult},
    transfer::{TransferError, TransferProvider, TransferReceipt, TransferRequest},
    wallet_api::LedgerApi,
    withdrawal_api::WithdrawalApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db as sqlite_db, SqliteDatabase};
pub use traits::{
    EscrowError,
    EscrowManagement,
    InsertResult,
    JobError,
    JobManagement,
    LedgerError,
    LedgerManagement,
    OrderManagement,
    OrderManagementError,
    PayoutOutcome,
    SkipReason,
    WithdrawalError,
    WithdrawalManagement,
};
