//! # Ledger backend contracts
//!
//! The traits in this module define what a database backend must provide to run the ledger engine.
//!
//! * [`LedgerManagement`] covers wallets and the double-entry journal. Every change to a wallet's available balance
//!   goes through a balanced debit/credit pair keyed by a unique reference.
//! * [`EscrowManagement`] funds escrow when an order is paid, holds earnings once delivery is confirmed, and releases
//!   (or refunds) them.
//! * [`WithdrawalManagement`] persists the withdrawal state machine and the ledger movements that go with it.
//! * [`JobManagement`] is the deferred job queue plus the cron locks used by the scheduled workers.
//! * [`OrderManagement`] keeps the ledger's projection of the marketplace's orders, deliveries and disputes current.
//!
//! Backends own the transaction boundary: each trait method is atomic.
mod escrow_management;
mod job_management;
mod ledger_management;
mod order_management;
mod withdrawal_management;

mod data_objects;

pub use data_objects::{
    DoubleEntryRequest,
    DoubleEntryResult,
    FundingResult,
    InsertResult,
    Party,
    PayoutContext,
    PayoutOutcome,
    PayoutSummary,
    PendingResult,
    RiderPayout,
    SellerPayout,
    SkipReason,
    WalletAudit,
};
pub use escrow_management::{EscrowError, EscrowManagement};
pub use job_management::{JobError, JobManagement};
pub use ledger_management::{LedgerError, LedgerManagement};
pub use order_management::{OrderManagement, OrderManagementError};
pub use withdrawal_management::{WithdrawalError, WithdrawalManagement};
