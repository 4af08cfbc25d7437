use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{EscrowEntry, LedgerEntry, LedgerEntryType, Usd},
    ledger_api::commission::CommissionRates,
};

/// The result of an idempotent insert keyed by a unique reference.
///
/// Dependent side effects (wallet balance changes, for instance) must only be applied for `Inserted` records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult<T> {
    Inserted(T),
    AlreadyExists(T),
}

impl<T> InsertResult<T> {
    pub fn created(&self) -> bool {
        matches!(self, InsertResult::Inserted(_))
    }

    pub fn record(&self) -> &T {
        match self {
            InsertResult::Inserted(r) | InsertResult::AlreadyExists(r) => r,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            InsertResult::Inserted(r) | InsertResult::AlreadyExists(r) => r,
        }
    }
}

/// One side of a double-entry movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    /// A specific wallet.
    Wallet(i64),
    /// The wallet belonging to this user. The wallet is created if it does not exist yet.
    User(i64),
    /// Money entering or leaving the platform (card funds, external bank transfers). No wallet is touched, but the
    /// entry is still attributed to the user, if there is one.
    External(Option<i64>),
}

impl Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Party::Wallet(id) => write!(f, "wallet #{id}"),
            Party::User(id) => write!(f, "user #{id}"),
            Party::External(Some(id)) => write!(f, "external (user #{id})"),
            Party::External(None) => write!(f, "external"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DoubleEntryRequest {
    pub from: Party,
    pub to: Party,
    pub amount: Usd,
    pub entry_type: LedgerEntryType,
    /// The base idempotency key. The entries are written at `<reference>-debit` and `<reference>-credit`.
    pub reference: String,
    pub order_id: Option<i64>,
    pub description: Option<String>,
    /// Skip the balance sufficiency check on the source wallet.
    pub allow_negative_from_wallet: bool,
}

impl DoubleEntryRequest {
    pub fn new<S: Into<String>>(
        from: Party,
        to: Party,
        amount: Usd,
        entry_type: LedgerEntryType,
        reference: S,
    ) -> Self {
        Self {
            from,
            to,
            amount,
            entry_type,
            reference: reference.into(),
            order_id: None,
            description: None,
            allow_negative_from_wallet: false,
        }
    }

    pub fn for_order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn allow_negative(mut self) -> Self {
        self.allow_negative_from_wallet = true;
        self
    }

    pub fn debit_reference(&self) -> String {
        format!("{}-debit", self.reference)
    }

    pub fn credit_reference(&self) -> String {
        format!("{}-credit", self.reference)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoubleEntryResult {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
    /// True if either entry was written by this call. False means the whole movement had already been applied.
    pub created: bool,
}

/// Everything the escrow flows need besides the database.
#[derive(Debug, Clone, Copy)]
pub struct PayoutContext {
    /// The platform escrow (treasury) user. Funds are held in this user's wallet.
    pub treasury_user_id: i64,
    pub rates: CommissionRates,
    pub now: DateTime<Utc>,
    /// Release even if the order has an open dispute. Reserved for operator tooling.
    pub ignore_disputes: bool,
}

/// Reasons a release or refund did not happen. These are expected outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    OrderNotFound,
    GroupNotFound,
    DeliveryNotFound,
    NotPaid,
    NotDelivered,
    AlreadyReleased,
    AlreadyPaid,
    ActiveDispute,
    NoRiderAssigned,
    DeliveryNotConfirmed,
    NotEligible,
}

impl SkipReason {
    /// Skips that may clear up on their own (a dispute gets resolved, a delivery gets confirmed). Jobs hitting one of
    /// these are retried later; anything else resolves the job.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SkipReason::ActiveDispute |
                SkipReason::NotDelivered |
                SkipReason::DeliveryNotConfirmed |
                SkipReason::NoRiderAssigned
        )
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::OrderNotFound => "order not found",
            SkipReason::GroupNotFound => "seller group not found",
            SkipReason::DeliveryNotFound => "delivery not found",
            SkipReason::NotPaid => "order is not paid",
            SkipReason::NotDelivered => "order is not delivered",
            SkipReason::AlreadyReleased => "payout already released",
            SkipReason::AlreadyPaid => "payout transaction already exists",
            SkipReason::ActiveDispute => "order has an active dispute",
            SkipReason::NoRiderAssigned => "no rider assigned",
            SkipReason::DeliveryNotConfirmed => "delivery not confirmed",
            SkipReason::NotEligible => "not eligible",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerPayout {
    pub seller_id: i64,
    pub amount: Usd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiderPayout {
    pub rider_id: i64,
    pub amount: Usd,
}

/// What a successful release or refund moved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSummary {
    pub order_id: i64,
    pub sellers: Vec<SellerPayout>,
    pub rider: Option<RiderPayout>,
    /// Commission retained by the platform for the released groups.
    pub commission: Usd,
    /// Amount refunded to the buyer (hub timeouts only).
    pub refunded: Usd,
}

impl PayoutSummary {
    pub fn new(order_id: i64) -> Self {
        Self { order_id, ..Default::default() }
    }

    pub fn total_paid(&self) -> Usd {
        self.sellers.iter().map(|s| s.amount).sum::<Usd>() + self.rider.map(|r| r.amount).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutOutcome {
    Released(PayoutSummary),
    Skipped(SkipReason),
}

impl PayoutOutcome {
    pub fn is_released(&self) -> bool {
        matches!(self, PayoutOutcome::Released(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            PayoutOutcome::Skipped(r) => Some(*r),
            PayoutOutcome::Released(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingResult {
    pub order_id: i64,
    pub amount: Usd,
    /// False when the escrow deposit had already been recorded by an earlier call.
    pub created: bool,
    pub escrow_entries: Vec<EscrowEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingResult {
    pub order_id: i64,
    /// Seller earnings moved from PENDING to HELD by this call.
    pub seller_earnings_held: Usd,
    /// The rider earning created by this call, if any.
    pub rider_earning_held: Option<Usd>,
    pub release_at: DateTime<Utc>,
    /// False if the release job was already queued.
    pub job_created: bool,
}

/// The cached wallet figures next to what the ledger says they should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAudit {
    pub wallet_id: i64,
    pub cached_balance: Usd,
    pub ledger_balance: Usd,
    pub cached_pending: Usd,
    pub held_earnings: Usd,
}

impl WalletAudit {
    pub fn is_consistent(&self) -> bool {
        self.cached_balance == self.ledger_balance && self.cached_pending == self.held_earnings
    }
}
