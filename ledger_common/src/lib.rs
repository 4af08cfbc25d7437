mod usd;

pub mod helpers;
pub mod op;
mod secret;

pub use secret::Secret;
pub use usd::{Usd, UsdConversionError, USD_CURRENCY_CODE, USD_CURRENCY_CODE_LOWER};
