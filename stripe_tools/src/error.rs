use thiserror::Error;

#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    /// Stripe answered, and refused. `message` is Stripe's own explanation where it gave one.
    #[error("Stripe returned {status}. {message}")]
    QueryError { status: u16, message: String },
}

impl StripeApiError {
    /// True when Stripe saw the request and refused it for good. Throttling (429) and a concurrent request holding
    /// the same idempotency key (409) are not refusals: the same request may still succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, StripeApiError::QueryError { status, .. } if *status < 500 && !matches!(*status, 409 | 429))
    }
}
