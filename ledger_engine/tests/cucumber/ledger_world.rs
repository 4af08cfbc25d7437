use std::collections::HashMap;

use chrono::{DateTime, Utc};
use cucumber::World;
use ledger_engine::{
    db_types::{Order, Withdrawal},
    ledger_api::{action::ActionResult, policy::PayoutPolicy},
    test_utils::{
        fixtures::{escrow_api, seed_marketplace, Marketplace},
        mock_transfer::MockTransferProvider,
        prepare_env::{prepare_test_env, random_db_path},
    },
    EscrowFlowApi,
    SchedulerApi,
    SqliteDatabase,
    WithdrawalApi,
};
use log::*;
use tokio::time::sleep;

#[derive(Default, Debug, World)]
pub struct LedgerWorld {
    pub system: Option<MarketplaceSystem>,
}

#[derive(Debug)]
pub struct MarketplaceSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub market: Marketplace,
    pub escrow: EscrowFlowApi<SqliteDatabase>,
    pub scheduler: SchedulerApi<SqliteDatabase>,
    pub transfers: MockTransferProvider,
    pub orders: HashMap<String, Order>,
    pub delivered_at: HashMap<String, DateTime<Utc>>,
    pub last_withdrawal: Option<ActionResult<Withdrawal>>,
}

impl LedgerWorld {
    pub fn system(&self) -> &MarketplaceSystem {
        self.system.as_ref().expect("Marketplace not initialised")
    }

    pub fn system_mut(&mut self) -> &mut MarketplaceSystem {
        self.system.as_mut().expect("Marketplace not initialised")
    }
}

impl MarketplaceSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        sleep(std::time::Duration::from_millis(50)).await;
        let market = seed_marketplace(&db).await;
        let escrow = escrow_api(&db, &market);
        let scheduler = SchedulerApi::new(escrow.clone());
        Self {
            db_path: url,
            db,
            market,
            escrow,
            scheduler,
            transfers: MockTransferProvider::default(),
            orders: HashMap::new(),
            delivered_at: HashMap::new(),
            last_withdrawal: None,
        }
    }

    pub fn withdrawals(&self) -> WithdrawalApi<SqliteDatabase, MockTransferProvider> {
        WithdrawalApi::new(self.db.clone(), self.transfers.clone(), self.market.treasury, PayoutPolicy::default())
    }

    /// Maps the participant names used in the feature files to user ids.
    pub fn user_id(&self, who: &str) -> i64 {
        match who {
            "treasury" => self.market.treasury,
            "buyer" => self.market.buyer,
            "general-seller" => self.market.general_seller,
            "food-seller" => self.market.food_seller,
            "rider" => self.market.rider,
            _ => panic!("Unknown participant: {who}"),
        }
    }

    pub fn order(&self, name: &str) -> &Order {
        self.orders.get(name).unwrap_or_else(|| panic!("Order {name} has not been placed"))
    }
}
