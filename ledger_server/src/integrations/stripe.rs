//! Sends approved withdrawals to Stripe Connect as transfers from the platform balance.
use ledger_engine::{TransferError, TransferProvider, TransferReceipt, TransferRequest};
use log::*;
use stripe_tools::{NewTransfer, StripeApi, StripeApiError};

pub const STRIPE_PROVIDER: &str = "stripe";

#[derive(Clone)]
pub struct StripeTransfers {
    api: StripeApi,
}

impl StripeTransfers {
    pub fn new(api: StripeApi) -> Self {
        Self { api }
    }
}

impl TransferProvider for StripeTransfers {
    fn provider_name(&self) -> &str {
        STRIPE_PROVIDER
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        let transfer = new_transfer(&request);
        let result = self.api.create_transfer(&transfer, &request.idempotency_key).await;
        match result {
            Ok(transfer) => Ok(TransferReceipt {
                provider: STRIPE_PROVIDER.to_string(),
                transfer_id: transfer.id,
                destination: transfer.destination,
            }),
            Err(e) => {
                warn!("🏧️ Stripe transfer {} failed. {e}", request.idempotency_key);
                Err(to_transfer_error(e))
            },
        }
    }
}

fn new_transfer(request: &TransferRequest) -> NewTransfer {
    let transfer = NewTransfer::new(request.amount_cents, request.currency.as_str(), request.destination.as_str())
        .with_transfer_group(request.idempotency_key.as_str());
    match &request.description {
        Some(description) => transfer.with_description(description.as_str()),
        None => transfer,
    }
}

fn to_transfer_error(e: StripeApiError) -> TransferError {
    if e.is_rejection() {
        TransferError::Declined(e.to_string())
    } else {
        TransferError::Unavailable(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn request() -> TransferRequest {
        TransferRequest {
            amount_cents: 2_500,
            currency: "usd".into(),
            destination: "acct_general".into(),
            idempotency_key: "seller-withdrawal-7".into(),
            description: Some("SELLER withdrawal #7".into()),
        }
    }

    #[test]
    fn transfers_are_grouped_by_withdrawal() {
        let transfer = new_transfer(&request());
        assert_eq!(transfer.amount, 2_500);
        assert_eq!(transfer.destination, "acct_general");
        assert_eq!(transfer.transfer_group.as_deref(), Some("seller-withdrawal-7"));
        assert_eq!(transfer.description.as_deref(), Some("SELLER withdrawal #7"));
    }

    #[test]
    fn only_final_refusals_are_declines() {
        let declined = to_transfer_error(StripeApiError::QueryError { status: 400, message: "No such account".into() });
        assert!(matches!(declined, TransferError::Declined(m) if m.contains("No such account")));
        let throttled = to_transfer_error(StripeApiError::QueryError { status: 429, message: "Slow down".into() });
        assert!(matches!(throttled, TransferError::Unavailable(_)));
        let in_flight = to_transfer_error(StripeApiError::QueryError { status: 409, message: "Key in use".into() });
        assert!(matches!(in_flight, TransferError::Unavailable(_)));
        let down = to_transfer_error(StripeApiError::RestRequestError("connection refused".into()));
        assert!(matches!(down, TransferError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_stripe_is_unavailable() {
        let config = stripe_tools::StripeConfig::new("sk_test_123", "http://127.0.0.1:9");
        let transfers = StripeTransfers::new(StripeApi::new(config).unwrap());
        let err = transfers.create_transfer(request()).await.unwrap_err();
        assert!(matches!(err, TransferError::Unavailable(_)), "{err:?}");
    }
}
