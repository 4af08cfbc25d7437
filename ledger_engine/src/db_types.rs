//! Data types shared by the database backends and the public API.
//!
//! Status and type columns are stored as `SCREAMING_SNAKE_CASE` text, both in the database and in JSON, so the
//! same string shows up in SQL queries, API payloads and logs.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
pub use ledger_common::Usd;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Declares a text-backed enum with matching sqlx, serde, `Display` and `FromStr` representations.
macro_rules! db_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                #[sqlx(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------        Users          ---------------------------------------------------------
db_enum!(
    UserRole {
        Buyer => "BUYER",
        Seller => "SELLER",
        Rider => "RIDER",
        /// The platform itself. The treasury (system escrow) account belongs to a platform user.
        Platform => "PLATFORM",
        Admin => "ADMIN",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub role: UserRole,
    /// The external payout destination (a Connect account id) for sellers and riders.
    pub stripe_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub role: UserRole,
    pub stripe_account_id: Option<String>,
}

impl NewUser {
    pub fn new<S: Into<String>>(name: S, role: UserRole) -> Self {
        Self { name: name.into(), role, stripe_account_id: None }
    }

    pub fn with_stripe_account<S: Into<String>>(mut self, account_id: S) -> Self {
        self.stripe_account_id = Some(account_id.into());
        self
    }
}

//--------------------------------------        Wallet         ---------------------------------------------------------
/// One wallet per user. The money fields are cached projections; see [`crate::LedgerApi`] for the repair path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: i64,
    pub user_id: i64,
    /// Available funds. Always equal to the sum of CREDIT minus DEBIT ledger entries for this wallet.
    pub balance: Usd,
    /// Earnings held in escrow awaiting release. Equal to the sum of this user's HELD earning escrow rows.
    pub pending: Usd,
    pub total_earnings: Usd,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     Ledger entries    ---------------------------------------------------------
db_enum!(
    LedgerEntryType {
        EscrowDeposit => "ESCROW_DEPOSIT",
        EscrowRelease => "ESCROW_RELEASE",
        SellerPayout => "SELLER_PAYOUT",
        RiderPayout => "RIDER_PAYOUT",
        Refund => "REFUND",
        PlatformFee => "PLATFORM_FEE",
        WalletTopup => "WALLET_TOPUP",
        WalletWithdrawal => "WALLET_WITHDRAWAL",
    }
);

db_enum!(
    EntryDirection {
        Credit => "CREDIT",
        Debit => "DEBIT",
    }
);

/// One side of a financial movement. Append-only: rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub order_id: Option<i64>,
    pub user_id: Option<i64>,
    pub wallet_id: Option<i64>,
    pub entry_type: LedgerEntryType,
    pub direction: EntryDirection,
    pub amount: Usd,
    pub reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub order_id: Option<i64>,
    pub user_id: Option<i64>,
    pub wallet_id: Option<i64>,
    pub entry_type: LedgerEntryType,
    pub direction: EntryDirection,
    pub amount: Usd,
    pub reference: String,
    pub description: Option<String>,
}

//--------------------------------------     Escrow ledger     ---------------------------------------------------------
db_enum!(
    EscrowRole {
        Buyer => "BUYER",
        Seller => "SELLER",
        Rider => "RIDER",
        Platform => "PLATFORM",
    }
);

db_enum!(
    EscrowEntryType {
        Fund => "FUND",
        SellerEarning => "SELLER_EARNING",
        RiderEarning => "RIDER_EARNING",
        PlatformCommission => "PLATFORM_COMMISSION",
        Release => "RELEASE",
        Refund => "REFUND",
    }
);

db_enum!(
    /// Escrow rows only ever move forward: `PENDING -> HELD -> RELEASED | CANCELLED`.
    EscrowStatus {
        Pending => "PENDING",
        Held => "HELD",
        Released => "RELEASED",
        Cancelled => "CANCELLED",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EscrowEntry {
    pub id: i64,
    pub order_id: i64,
    pub seller_group_id: Option<i64>,
    pub user_id: Option<i64>,
    pub role: EscrowRole,
    pub entry_type: EscrowEntryType,
    pub amount: Usd,
    /// The part of the hold already consumed. Every flow today releases or cancels a hold whole, so this stays at
    /// zero; balances, snapshots and payouts all read the hold through [`EscrowEntry::remaining`].
    pub withdrawn_amount: Usd,
    pub status: EscrowStatus,
    pub reference: String,
    /// JSON audit trail describing the context that created or last moved the row.
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscrowEntry {
    pub fn metadata_json(&self) -> Option<Value> {
        self.metadata.as_deref().and_then(|m| serde_json::from_str(m).ok())
    }

    pub fn remaining(&self) -> Usd {
        self.amount - self.withdrawn_amount
    }
}

#[derive(Debug, Clone)]
pub struct NewEscrowEntry {
    pub order_id: i64,
    pub seller_group_id: Option<i64>,
    pub user_id: Option<i64>,
    pub role: EscrowRole,
    pub entry_type: EscrowEntryType,
    pub amount: Usd,
    pub status: EscrowStatus,
    pub reference: String,
    pub metadata: Option<Value>,
}

//--------------------------------------  Wallet transactions  ---------------------------------------------------------
db_enum!(
    TransactionType {
        Deposit => "DEPOSIT",
        Withdrawal => "WITHDRAWAL",
        Earning => "EARNING",
        Refund => "REFUND",
        OrderPayment => "ORDER_PAYMENT",
        SellerPayout => "SELLER_PAYOUT",
        RiderPayout => "RIDER_PAYOUT",
    }
);

impl TransactionType {
    /// Transaction types that record money leaving escrow for a seller or rider on behalf of an order.
    pub fn payout_types() -> [TransactionType; 3] {
        [TransactionType::SellerPayout, TransactionType::Earning, TransactionType::RiderPayout]
    }
}

db_enum!(
    TransactionStatus {
        Success => "SUCCESS",
        Pending => "PENDING",
        Failed => "FAILED",
    }
);

/// The user-facing history record of a wallet movement. Not authoritative for balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WalletTransaction {
    pub id: i64,
    pub wallet_id: i64,
    pub order_id: Option<i64>,
    pub user_id: Option<i64>,
    pub amount: Usd,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWalletTransaction {
    pub wallet_id: i64,
    pub order_id: Option<i64>,
    pub user_id: Option<i64>,
    pub amount: Usd,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub reference: String,
    pub description: Option<String>,
}

//--------------------------------------      Withdrawals      ---------------------------------------------------------
db_enum!(
    WithdrawalKind {
        Seller => "SELLER",
        Rider => "RIDER",
    }
);

impl WithdrawalKind {
    /// The lower-case prefix used in withdrawal idempotency keys, e.g. `rider-withdrawal-12`.
    pub fn prefix(&self) -> &'static str {
        match self {
            WithdrawalKind::Seller => "seller",
            WithdrawalKind::Rider => "rider",
        }
    }

    pub fn payout_entry_type(&self) -> LedgerEntryType {
        match self {
            WithdrawalKind::Seller => LedgerEntryType::SellerPayout,
            WithdrawalKind::Rider => LedgerEntryType::RiderPayout,
        }
    }

    pub fn payout_transaction_type(&self) -> TransactionType {
        match self {
            WithdrawalKind::Seller => TransactionType::SellerPayout,
            WithdrawalKind::Rider => TransactionType::RiderPayout,
        }
    }
}

db_enum!(
    WithdrawalMethod {
        StripeConnect => "STRIPE_CONNECT",
        StripeTreasury => "STRIPE_TREASURY",
    }
);

db_enum!(
    WithdrawalStatus {
        Pending => "PENDING",
        Processing => "PROCESSING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Completed => "COMPLETED",
    }
);

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Completed | WithdrawalStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub id: i64,
    pub wallet_id: i64,
    pub user_id: i64,
    pub kind: WithdrawalKind,
    pub amount: Usd,
    pub method: WithdrawalMethod,
    pub status: WithdrawalStatus,
    pub processed_at: Option<DateTime<Utc>>,
    /// JSON. Destination and transfer id once completed, or the rejection reason.
    pub account_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn account_info_json(&self) -> Option<Value> {
        self.account_info.as_deref().and_then(|m| serde_json::from_str(m).ok())
    }
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub user_id: i64,
    pub kind: WithdrawalKind,
    pub amount: Usd,
    pub method: WithdrawalMethod,
}

//--------------------------------------     Jobs and locks    ---------------------------------------------------------
db_enum!(
    JobStatus {
        Pending => "PENDING",
        Processing => "PROCESSING",
        /// The job ran and did its work.
        Completed => "COMPLETED",
        Failed => "FAILED",
        /// The job was resolved without doing any work, e.g. the payout had already been released.
        Done => "DONE",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: i64,
    pub job_type: String,
    pub payload: String,
    pub status: JobStatus,
    pub attempts: i64,
    pub max_retries: i64,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub dedupe_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CronLock {
    pub name: String,
    pub locked_at: DateTime<Utc>,
}

//--------------------------------------        Orders         ---------------------------------------------------------
db_enum!(
    OrderStatusType {
        Pending => "PENDING",
        Paid => "PAID",
        Processing => "PROCESSING",
        Shipped => "SHIPPED",
        Delivered => "DELIVERED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub buyer_id: i64,
    pub status: OrderStatusType,
    pub is_paid: bool,
    /// The amount the buyer owes (or paid): seller group subtotals plus the delivery fee, less any refunds.
    pub total_amount: Usd,
    pub delivery_fee: Usd,
    pub payout_released: bool,
    pub payment_reference: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: i64,
    pub delivery_fee: Usd,
    pub seller_groups: Vec<NewSellerGroup>,
}

impl NewOrder {
    pub fn new(buyer_id: i64, delivery_fee: Usd) -> Self {
        Self { buyer_id, delivery_fee, seller_groups: vec![] }
    }

    pub fn with_group(mut self, group: NewSellerGroup) -> Self {
        self.seller_groups.push(group);
        self
    }

    pub fn total_amount(&self) -> Usd {
        self.seller_groups.iter().map(|g| g.subtotal).sum::<Usd>() + self.delivery_fee
    }
}

db_enum!(
    StoreType {
        General => "GENERAL",
        Food => "FOOD",
    }
);

db_enum!(
    GroupStatus {
        Pending => "PENDING",
        Shipped => "SHIPPED",
        AtHub => "AT_HUB",
        Delivered => "DELIVERED",
        Cancelled => "CANCELLED",
    }
);

db_enum!(
    PayoutStatus {
        Pending => "PENDING",
        /// Claimed by a worker. Only ever observed inside the claiming transaction, or after a crash.
        Processing => "PROCESSING",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SellerGroup {
    pub id: i64,
    pub order_id: i64,
    pub seller_id: i64,
    pub store_type: StoreType,
    pub subtotal: Usd,
    pub status: GroupStatus,
    pub payout_status: PayoutStatus,
    pub expected_at_hub: Option<DateTime<Utc>>,
    pub arrived_at_hub: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub payout_released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSellerGroup {
    pub seller_id: i64,
    pub store_type: StoreType,
    pub subtotal: Usd,
    pub expected_at_hub: Option<DateTime<Utc>>,
}

impl NewSellerGroup {
    pub fn new(seller_id: i64, store_type: StoreType, subtotal: Usd) -> Self {
        Self { seller_id, store_type, subtotal, expected_at_hub: None }
    }

    pub fn expected_at_hub(mut self, at: DateTime<Utc>) -> Self {
        self.expected_at_hub = Some(at);
        self
    }
}

db_enum!(
    DeliveryStatus {
        Pending => "PENDING",
        Assigned => "ASSIGNED",
        PickedUp => "PICKED_UP",
        Delivered => "DELIVERED",
        Failed => "FAILED",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Delivery {
    pub id: i64,
    pub order_id: i64,
    pub rider_id: Option<i64>,
    pub status: DeliveryStatus,
    pub delivery_fee: Usd,
    pub rider_payout_status: PayoutStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

db_enum!(
    DisputeStatus {
        Open => "OPEN",
        UnderReview => "UNDER_REVIEW",
        Resolved => "RESOLVED",
        Rejected => "REJECTED",
    }
);

impl DisputeStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, DisputeStatus::Open | DisputeStatus::UnderReview)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Dispute {
    pub id: i64,
    pub order_id: i64,
    pub status: DisputeStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    Escrow snapshot    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EscrowSnapshot {
    pub id: i64,
    pub snapshot_date: NaiveDate,
    pub total_pending: Usd,
    pub total_held: Usd,
    pub total_released: Usd,
    pub total_cancelled: Usd,
    pub held_count: i64,
    pub treasury_balance: Usd,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn enums_round_trip_through_text() {
        assert_eq!(LedgerEntryType::WalletWithdrawal.to_string(), "WALLET_WITHDRAWAL");
        assert_eq!("UNDER_REVIEW".parse::<DisputeStatus>().unwrap(), DisputeStatus::UnderReview);
        assert!("under_review".parse::<DisputeStatus>().is_err());
        let json = serde_json::to_string(&EscrowStatus::Held).unwrap();
        assert_eq!(json, "\"HELD\"");
    }

    #[test]
    fn new_order_total_includes_delivery_fee() {
        let order = NewOrder::new(1, Usd::from_dollars(5))
            .with_group(NewSellerGroup::new(2, StoreType::General, Usd::from_dollars(50)))
            .with_group(NewSellerGroup::new(3, StoreType::Food, Usd::from_cents(1999)));
        assert_eq!(order.total_amount(), Usd::from_cents(7499));
    }

    #[test]
    fn terminal_states() {
        assert!(WithdrawalStatus::Completed.is_terminal());
        assert!(WithdrawalStatus::Rejected.is_terminal());
        assert!(!WithdrawalStatus::Processing.is_terminal());
        assert!(DisputeStatus::Open.is_active());
        assert!(!DisputeStatus::Resolved.is_active());
    }
}
