//! # Ledger engine public API
//!
//! The `ledger_api` module exposes the programmatic API of the ledger engine. As with the backend traits, it is
//! modular, so clients pick the parts they need.
//!
//! * [`wallet_api`] reads wallets and the journal, records ad-hoc double-entry movements and repairs drifted balances.
//! * [`escrow_flow_api`] is the entry point for the payment and delivery collaborators: it funds escrow, moves earnings
//!   to pending and exposes the release engine.
//! * [`withdrawal_api`] implements the seller and rider withdrawal actions on top of a [`transfer::TransferProvider`].
//! * [`scheduler_api`] holds the periodic workers.
//!
//! The other submodules are support types: commission rates, timing policy, typed job payloads and action results.
//!
//! # API usage
//!
//! Every API is built from a backend that implements the traits it needs.
//!
//! ```rust,ignore
//! use ledger_engine::{CommissionRates, EscrowFlowApi, PayoutPolicy, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let rates = CommissionRates::new(dec!(0.10), dec!(0.15))?;
//! let api = EscrowFlowApi::new(db, treasury_user_id, rates, PayoutPolicy::default());
//! api.fund_escrow_for_order(order_id, "pi_3Ox...").await?;
//! ```

pub mod action;
pub mod commission;
pub mod escrow_flow_api;
pub mod jobs;
pub mod policy;
pub mod scheduler_api;
pub mod transfer;
pub mod wallet_api;
pub mod withdrawal_api;
