//! The seam between the withdrawal workflow and whatever actually moves money off the platform.
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransferError {
    #[error("The transfer was declined: {0}")]
    Declined(String),
    #[error("Could not reach the transfer provider: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// The amount in minor units (cents).
    pub amount_cents: i64,
    pub currency: String,
    /// The provider-side account receiving the funds.
    pub destination: String,
    /// Retrying with the same key must never create a second transfer.
    pub idempotency_key: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub provider: String,
    pub transfer_id: String,
    pub destination: String,
}

#[allow(async_fn_in_trait)]
pub trait TransferProvider {
    fn provider_name(&self) -> &str;

    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError>;
}
