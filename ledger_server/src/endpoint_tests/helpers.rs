use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use ledger_common::Secret;
use ledger_engine::{
    db_types::{LedgerEntryType, Usd},
    test_utils::{
        fixtures::{escrow_api, seed_marketplace, Marketplace},
        mock_transfer::MockTransferProvider,
        prepare_env::{prepare_test_env, random_db_path},
    },
    traits::{DoubleEntryRequest, LedgerManagement, Party},
    PayoutPolicy,
    SchedulerApi,
    SqliteDatabase,
    WithdrawalApi,
};
use log::debug;
use serde_json::Value;

use crate::{config::AccessSecrets, server::configure_routes};

pub const CRON_SECRET: &str = "cron-s3cret";
pub const ADMIN_SECRET: &str = "admin-s3cret";

pub struct TestSystem {
    pub db: SqliteDatabase,
    pub market: Marketplace,
    pub transfers: MockTransferProvider,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_transfers(MockTransferProvider::default()).await
    }

    pub async fn with_transfers(transfers: MockTransferProvider) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let market = seed_marketplace(&db).await;
        Self { db, market, transfers }
    }

    /// Puts `amount` into the user's wallet from outside the platform.
    pub async fn credit(&self, user_id: i64, amount: Usd) {
        let reference = format!("topup-{user_id}-{}", amount.cents());
        let request = DoubleEntryRequest::new(
            Party::External(Some(user_id)),
            Party::User(user_id),
            amount,
            LedgerEntryType::WalletTopup,
            reference,
        );
        self.db.create_double_entry(request).await.expect("Error crediting wallet");
    }

    pub async fn balance(&self, user_id: i64) -> Usd {
        self.db.fetch_or_create_wallet(user_id).await.expect("Error fetching wallet").balance
    }

    /// Sends the request to an app wired the way the server wires it, and returns the status and the body.
    pub async fn send(&self, req: TestRequest) -> (StatusCode, String) {
        let secrets =
            AccessSecrets { cron: Secret::new(CRON_SECRET.to_string()), admin: Secret::new(ADMIN_SECRET.to_string()) };
        let scheduler = SchedulerApi::new(escrow_api(&self.db, &self.market));
        let withdrawals =
            WithdrawalApi::new(self.db.clone(), self.transfers.clone(), self.market.treasury, PayoutPolicy::default());
        let app = App::new()
            .app_data(web::Data::new(secrets))
            .app_data(web::Data::new(scheduler))
            .app_data(web::Data::new(withdrawals))
            .configure(configure_routes::<MockTransferProvider>);
        let service = test::init_service(app).await;
        debug!("Making request");
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let body = test::read_body(res).await;
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn send_json(&self, req: TestRequest) -> (StatusCode, Value) {
        let (status, body) = self.send(req).await;
        let json = serde_json::from_str(&body).unwrap_or_else(|e| panic!("Body is not JSON ({e}): {body}"));
        (status, json)
    }
}
