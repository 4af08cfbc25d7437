use serde::{Deserialize, Serialize};

/// The form body of `POST /v1/transfers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTransfer {
    /// Amount in cents.
    pub amount: i64,
    pub currency: String,
    /// The connected account (`acct_...`) receiving the funds.
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_group: Option<String>,
}

impl NewTransfer {
    pub fn new<S: Into<String>>(amount: i64, currency: S, destination: S) -> Self {
        Self {
            amount,
            currency: currency.into(),
            destination: destination.into(),
            description: None,
            transfer_group: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_transfer_group<S: Into<String>>(mut self, group: S) -> Self {
        self.transfer_group = Some(group.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Transfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    /// Unix timestamp
    pub created: i64,
    #[serde(default)]
    pub reversed: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transfer_group: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeErrorResponse {
    pub error: StripeErrorBody,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeErrorBody {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StripeErrorResponse {
    /// Stripe's message, falling back to the error code and then to the raw body.
    pub fn describe(body: &str) -> String {
        match serde_json::from_str::<StripeErrorResponse>(body) {
            Ok(StripeErrorResponse { error }) => error.message.or(error.code).unwrap_or_else(|| body.to_string()),
            Err(_) => body.to_string(),
        }
    }
}
