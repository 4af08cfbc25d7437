use ledger_common::Secret;
use log::*;

pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    /// Scheme and host of the Stripe API. Overridden in tests to point at a local mock.
    pub api_base: String,
}

impl StripeConfig {
    pub fn new<S: Into<String>>(secret_key: S, api_base: S) -> Self {
        Self { secret_key: Secret::new(secret_key.into()), api_base: api_base.into() }
    }

    pub fn new_from_env_or_default() -> Self {
        let secret_key = Secret::new(std::env::var("LEDGER_STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("LEDGER_STRIPE_SECRET_KEY not set. Every withdrawal transfer will be refused by Stripe.");
            String::default()
        }));
        let api_base = std::env::var("LEDGER_STRIPE_API_BASE").unwrap_or_else(|_| {
            debug!("LEDGER_STRIPE_API_BASE not set, using {DEFAULT_STRIPE_API_BASE}");
            DEFAULT_STRIPE_API_BASE.to_string()
        });
        Self { secret_key, api_base }
    }

    pub fn is_configured(&self) -> bool {
        !self.secret_key.is_empty()
    }
}
