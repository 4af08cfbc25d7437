use std::{fmt::Display, str::FromStr};

use ledger_engine::db_types::{WithdrawalKind, WithdrawalMethod};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

/// The body of `POST /withdrawals/{kind}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalParams {
    pub user_id: i64,
    /// In dollars, either as a JSON number or a string, e.g. `25` or `"25.50"`.
    pub amount: Decimal,
    #[serde(default = "default_method")]
    pub method: WithdrawalMethod,
}

fn default_method() -> WithdrawalMethod {
    WithdrawalMethod::StripeConnect
}

/// The body of `POST /withdrawals/{kind}/{id}/reject`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionParams {
    pub reason: String,
}

/// The `{kind}` path segment of the withdrawal routes: `seller` or `rider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindParam(pub WithdrawalKind);

impl FromStr for KindParam {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "seller" => Ok(Self(WithdrawalKind::Seller)),
            "rider" => Ok(Self(WithdrawalKind::Rider)),
            _ => Err(ServerError::InvalidRequestPath(format!("{s} is not a withdrawal kind. Use seller or rider."))),
        }
    }
}

/// The workers that can be triggered through `POST /cron/{job}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronJob {
    EscrowPayouts,
    SellerGroups,
    RiderPayouts,
    HubTimeouts,
    FinalizeDelivered,
    EscrowSnapshot,
    All,
}

impl CronJob {
    pub fn as_str(&self) -> &'static str {
        match self {
            CronJob::EscrowPayouts => "escrow-payouts",
            CronJob::SellerGroups => "seller-groups",
            CronJob::RiderPayouts => "rider-payouts",
            CronJob::HubTimeouts => "hub-timeouts",
            CronJob::FinalizeDelivered => "finalize-delivered",
            CronJob::EscrowSnapshot => "escrow-snapshot",
            CronJob::All => "all",
        }
    }
}

impl Display for CronJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CronJob {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "escrow-payouts" => Ok(CronJob::EscrowPayouts),
            "seller-groups" => Ok(CronJob::SellerGroups),
            "rider-payouts" => Ok(CronJob::RiderPayouts),
            "hub-timeouts" => Ok(CronJob::HubTimeouts),
            "finalize-delivered" => Ok(CronJob::FinalizeDelivered),
            "escrow-snapshot" => Ok(CronJob::EscrowSnapshot),
            "all" => Ok(CronJob::All),
            _ => Err(ServerError::NoRecordFound(format!("There is no cron job called {s}"))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn withdrawal_params_accept_numbers_and_strings() {
        let params: WithdrawalParams = serde_json::from_str(r#"{"user_id": 4, "amount": 25}"#).unwrap();
        assert_eq!(params.amount, Decimal::new(25, 0));
        assert_eq!(params.method, WithdrawalMethod::StripeConnect);
        let params: WithdrawalParams =
            serde_json::from_str(r#"{"user_id": 4, "amount": "25.50", "method": "STRIPE_TREASURY"}"#).unwrap();
        assert_eq!(params.amount, Decimal::new(2550, 2));
        assert_eq!(params.method, WithdrawalMethod::StripeTreasury);
    }

    #[test]
    fn kinds() {
        assert_eq!("seller".parse::<KindParam>().unwrap().0, WithdrawalKind::Seller);
        assert_eq!("Rider".parse::<KindParam>().unwrap().0, WithdrawalKind::Rider);
        assert!("buyer".parse::<KindParam>().is_err());
    }

    #[test]
    fn cron_jobs() {
        for job in ["escrow-payouts", "seller-groups", "rider-payouts", "hub-timeouts", "finalize-delivered", "all"] {
            assert_eq!(job.parse::<CronJob>().unwrap().as_str(), job);
        }
        assert!("escrow_payouts".parse::<CronJob>().is_err());
    }
}
