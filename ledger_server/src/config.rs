use std::{env, fmt::Display, str::FromStr};

use chrono::Duration;
use ledger_common::{helpers::parse_optional, Secret, Usd};
use ledger_engine::{CommissionRates, PayoutPolicy};
use log::*;
use rust_decimal::Decimal;
use stripe_tools::StripeConfig;

use crate::errors::ServerError;

const DEFAULT_LEDGER_HOST: &str = "127.0.0.1";
const DEFAULT_LEDGER_PORT: u16 = 8460;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/ledger.db";
const DEFAULT_TREASURY_USER_ID: i64 = 1;
const DEFAULT_RELEASE_DELAY_HOURS: i64 = 24;
const DEFAULT_HUB_TIMEOUT_HOURS: i64 = 48;
const DEFAULT_BATCH_SIZE: i64 = 20;
const DEFAULT_MIN_WITHDRAWAL_DOLLARS: i64 = 10;
const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Callers of the `/cron` routes must present this in the `x-cron-secret` header. When it is empty, every cron
    /// request is refused.
    pub cron_secret: Secret<String>,
    /// Callers of the `/withdrawals` routes must present this in the `x-admin-secret` header.
    pub admin_secret: Secret<String>,
    /// The user that owns the platform escrow wallet.
    pub treasury_user_id: i64,
    /// The platform's cut of general store subtotals.
    pub commission_general: Decimal,
    /// The platform's cut of food store subtotals.
    pub commission_food: Decimal,
    pub policy: PayoutPolicy,
    /// How often the in-process scheduler runs every worker. `None` disables it, in which case an external cron
    /// should call the `/cron` routes instead.
    pub scheduler_interval: Option<std::time::Duration>,
    pub stripe_config: StripeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LEDGER_HOST.to_string(),
            port: DEFAULT_LEDGER_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            cron_secret: Secret::default(),
            admin_secret: Secret::default(),
            treasury_user_id: DEFAULT_TREASURY_USER_ID,
            commission_general: default_commission_general(),
            commission_food: default_commission_food(),
            policy: PayoutPolicy::default(),
            scheduler_interval: Some(std::time::Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECS)),
            stripe_config: StripeConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("LEDGER_HOST").ok().unwrap_or_else(|| DEFAULT_LEDGER_HOST.into());
        let port = env_or_default("LEDGER_PORT", DEFAULT_LEDGER_PORT);
        let database_url = env::var("LEDGER_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ LEDGER_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let cron_secret = secret_from_env("LEDGER_CRON_SECRET");
        let admin_secret = secret_from_env("LEDGER_ADMIN_SECRET");
        let treasury_user_id = env_or_default("LEDGER_TREASURY_USER_ID", DEFAULT_TREASURY_USER_ID);
        let commission_general = env_or_default("LEDGER_COMMISSION_GENERAL", default_commission_general());
        let commission_food = env_or_default("LEDGER_COMMISSION_FOOD", default_commission_food());
        let policy = configure_policy();
        let interval = env_or_default("LEDGER_SCHEDULER_INTERVAL_SECS", DEFAULT_SCHEDULER_INTERVAL_SECS);
        let scheduler_interval = (interval > 0).then(|| std::time::Duration::from_secs(interval));
        if scheduler_interval.is_none() {
            info!("🪛️ The in-process scheduler is disabled. Drive the workers through the /cron routes.");
        }
        let stripe_config = StripeConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            cron_secret,
            admin_secret,
            treasury_user_id,
            commission_general,
            commission_food,
            policy,
            scheduler_interval,
            stripe_config,
        }
    }

    /// Validates the configured rates. Both must lie in `[0, 1)`.
    pub fn commission_rates(&self) -> Result<CommissionRates, ServerError> {
        let rates = CommissionRates::new(self.commission_general, self.commission_food)
            .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
        info!("🪛️ Commission rates: general {}, food {}", self.commission_general, self.commission_food);
        Ok(rates)
    }
}

fn default_commission_general() -> Decimal {
    Decimal::new(10, 2)
}

fn default_commission_food() -> Decimal {
    Decimal::new(15, 2)
}

/// Reads `name` from the environment, falling back to `default` (and saying so) when it is missing or unparseable.
fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match parse_optional::<T>(env::var(name).ok()) {
        Ok(Some(v)) => v,
        Ok(None) => {
            info!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Err(e) => {
            error!("🪛️ Invalid configuration value for {name}. {e} Using the default, {default}, instead.");
            default
        },
    }
}

fn secret_from_env(name: &str) -> Secret<String> {
    let value = env::var(name).ok().unwrap_or_default();
    if value.trim().is_empty() {
        warn!("🚨️ {name} is not set. Requests that need it will be refused.");
    }
    Secret::new(value.trim().to_string())
}

fn configure_policy() -> PayoutPolicy {
    let release_delay = env_or_default("LEDGER_RELEASE_DELAY_HOURS", DEFAULT_RELEASE_DELAY_HOURS);
    let hub_timeout = env_or_default("LEDGER_HUB_TIMEOUT_HOURS", DEFAULT_HUB_TIMEOUT_HOURS);
    let batch_size = env_or_default("LEDGER_BATCH_SIZE", DEFAULT_BATCH_SIZE);
    let default_min = Usd::from_dollars(DEFAULT_MIN_WITHDRAWAL_DOLLARS);
    let min_withdrawal = match parse_optional::<Usd>(env::var("LEDGER_MIN_WITHDRAWAL").ok()) {
        Ok(Some(min)) if !min.cents().is_negative() => min,
        Ok(None) => default_min,
        Ok(Some(min)) => {
            error!("🪛️ LEDGER_MIN_WITHDRAWAL cannot be negative ({min}). Using {default_min} instead.");
            default_min
        },
        Err(e) => {
            error!("🪛️ Invalid configuration value for LEDGER_MIN_WITHDRAWAL. {e} Using {default_min} instead.");
            default_min
        },
    };
    PayoutPolicy::default()
        .with_release_delay(Duration::hours(release_delay.max(0)))
        .with_hub_timeout(Duration::hours(hub_timeout.max(0)))
        .with_batch_size(batch_size)
        .with_min_withdrawal(min_withdrawal)
}

//-------------------------------------------------  AccessSecrets  ----------------------------------------------------
/// The subset of the configuration the request guards need.
#[derive(Clone, Debug, Default)]
pub struct AccessSecrets {
    pub cron: Secret<String>,
    pub admin: Secret<String>,
}

impl AccessSecrets {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { cron: config.cron_secret.clone(), admin: config.admin_secret.clone() }
    }
}

#[cfg(test)]
mod test {
    use ledger_engine::db_types::StoreType;

    use super::*;

    #[test]
    fn default_configuration() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8460);
        assert_eq!(config.treasury_user_id, 1);
        let rates = config.commission_rates().unwrap();
        assert_eq!(rates.rate_for(StoreType::General), Decimal::new(10, 2));
        assert_eq!(rates.rate_for(StoreType::Food), Decimal::new(15, 2));
        assert_eq!(config.policy.release_delay, Duration::hours(24));
        assert_eq!(config.policy.min_withdrawal, Usd::from_dollars(10));
        assert!(config.cron_secret.is_empty());
    }

    #[test]
    fn out_of_range_commission_is_a_configuration_error() {
        let config = ServerConfig { commission_food: Decimal::ONE, ..Default::default() };
        assert!(matches!(config.commission_rates(), Err(ServerError::ConfigurationError(_))));
    }
}
