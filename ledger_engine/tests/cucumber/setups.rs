use cucumber::given;
use ledger_engine::{
    db_types::{LedgerEntryType, Usd},
    test_utils::mock_transfer::MockTransferProvider,
    traits::{DoubleEntryRequest, Party},
    LedgerManagement,
};

use crate::cucumber::{ledger_world::MarketplaceSystem, LedgerWorld};

#[given("a fresh marketplace")]
async fn fresh_marketplace(world: &mut LedgerWorld) {
    let system = MarketplaceSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "the {word} wallet holds ${int}")]
async fn wallet_holds(world: &mut LedgerWorld, who: String, dollars: i64) {
    let system = world.system();
    let user_id = system.user_id(&who);
    let request = DoubleEntryRequest::new(
        Party::External(Some(user_id)),
        Party::User(user_id),
        Usd::from_dollars(dollars),
        LedgerEntryType::WalletTopup,
        format!("topup-{who}"),
    );
    system.db.create_double_entry(request).await.expect("Error topping up wallet");
}

#[given(expr = "the transfer provider declines with {string}")]
async fn transfers_decline(world: &mut LedgerWorld, message: String) {
    world.system_mut().transfers = MockTransferProvider::declining(message);
}

#[given(expr = "the transfer provider is unreachable for {int} attempt(s)")]
async fn transfers_unreachable(world: &mut LedgerWorld, attempts: usize) {
    world.system_mut().transfers = MockTransferProvider::unavailable_for(attempts, "connection refused");
}
