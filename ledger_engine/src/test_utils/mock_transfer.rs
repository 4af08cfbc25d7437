use std::sync::{Arc, Mutex};

use crate::ledger_api::transfer::{TransferError, TransferProvider, TransferReceipt, TransferRequest};

/// A transfer provider that records every request. It either succeeds, declines everything, or is unreachable for a
/// fixed number of calls before it starts succeeding.
#[derive(Debug, Clone, Default)]
pub struct MockTransferProvider {
    decline_with: Option<String>,
    outage: Arc<Mutex<Option<(String, usize)>>>,
    requests: Arc<Mutex<Vec<TransferRequest>>>,
}

impl MockTransferProvider {
    pub fn declining<S: Into<String>>(message: S) -> Self {
        Self { decline_with: Some(message.into()), ..Default::default() }
    }

    /// The first `calls` transfers fail with [`TransferError::Unavailable`].
    pub fn unavailable_for<S: Into<String>>(calls: usize, message: S) -> Self {
        Self { outage: Arc::new(Mutex::new(Some((message.into(), calls)))), ..Default::default() }
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn take_outage(&self) -> Option<String> {
        let mut outage = self.outage.lock().ok()?;
        match outage.as_mut() {
            Some((message, left)) if *left > 0 => {
                *left -= 1;
                Some(message.clone())
            },
            _ => None,
        }
    }
}

impl TransferProvider for MockTransferProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        let destination = request.destination.clone();
        let transfer_id = format!("tr_{}", request.idempotency_key);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(message) = self.take_outage() {
            return Err(TransferError::Unavailable(message));
        }
        match &self.decline_with {
            Some(message) => Err(TransferError::Declined(message.clone())),
            None => Ok(TransferReceipt { provider: "mock".into(), transfer_id, destination }),
        }
    }
}
