mod api;
mod config;
mod error;

mod data_objects;

pub use api::StripeApi;
pub use config::StripeConfig;
pub use data_objects::{NewTransfer, StripeErrorBody, StripeErrorResponse, Transfer};
pub use error::StripeApiError;
