use chrono::{Duration, Utc};
use cucumber::{then, when};
use ledger_engine::{
    db_types::{StoreType, Usd, WithdrawalKind, WithdrawalMethod, WithdrawalStatus},
    test_utils::fixtures::create_order,
    LedgerApi,
    LedgerManagement,
    OrderManagement,
};

use crate::cucumber::LedgerWorld;

fn usd(dollars: f64) -> Usd {
    Usd::from((dollars * 100.0).round() as i64)
}

#[when(expr = "order {word} is placed from the {word} seller for ${int} with a ${int} delivery fee")]
async fn place_order(world: &mut LedgerWorld, name: String, store: String, subtotal: i64, fee: i64) {
    let system = world.system();
    let (seller, store_type) = match store.as_str() {
        "general" => (system.market.general_seller, StoreType::General),
        "food" => (system.market.food_seller, StoreType::Food),
        _ => panic!("Unknown store type: {store}"),
    };
    let groups = [(seller, store_type, Usd::from_dollars(subtotal))];
    let order = create_order(&system.db, &system.market, &groups, Usd::from_dollars(fee)).await;
    world.system_mut().orders.insert(name, order);
}

#[when(expr = "order {word} is paid with reference {word}")]
async fn pay_order(world: &mut LedgerWorld, name: String, reference: String) {
    let system = world.system();
    let order_id = system.order(&name).id;
    system.escrow.fund_escrow_for_order(order_id, &reference).await.expect("Error funding escrow");
}

#[when(expr = "order {word} is delivered")]
async fn deliver_order(world: &mut LedgerWorld, name: String) {
    let delivered_at = Utc::now();
    let system = world.system();
    let order_id = system.order(&name).id;
    system.escrow.move_order_earnings_to_pending(order_id, delivered_at).await.expect("Error confirming delivery");
    world.system_mut().delivered_at.insert(name, delivered_at);
}

#[when(expr = "order {word} is disputed")]
async fn dispute_order(world: &mut LedgerWorld, name: String) {
    let system = world.system();
    let order_id = system.order(&name).id;
    system.db.open_dispute(order_id, Some("Opened in test".into())).await.expect("Error opening dispute");
}

#[when(expr = "the disputes on order {word} are resolved")]
async fn resolve_disputes(world: &mut LedgerWorld, name: String) {
    let system = world.system();
    let order_id = system.order(&name).id;
    // Resolve every dispute on the order
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM disputes WHERE order_id = ?")
        .bind(order_id)
        .fetch_all(system.db.pool())
        .await
        .expect("Error fetching disputes");
    for id in ids {
        system.db.resolve_dispute(id).await.expect("Error resolving dispute");
    }
}

#[when(expr = "the scheduler runs {int} hour(s) after order {word} was delivered")]
async fn run_scheduler(world: &mut LedgerWorld, hours: i64, name: String) {
    let system = world.system();
    let delivered_at = *system.delivered_at.get(&name).expect("Order has not been delivered");
    let reports = system.scheduler.run_all(delivered_at + Duration::hours(hours)).await;
    assert!(reports.iter().all(|r| r.result.failed == 0), "A worker failed: {reports:?}");
}

#[when(expr = "the {word} requests a withdrawal of ${int}")]
async fn request_withdrawal(world: &mut LedgerWorld, who: String, dollars: i64) {
    let system = world.system();
    let kind = if who == "rider" { WithdrawalKind::Rider } else { WithdrawalKind::Seller };
    let user_id = system.user_id(&who);
    let result = system
        .withdrawals()
        .request_withdrawal(kind, user_id, Usd::from_dollars(dollars), WithdrawalMethod::StripeConnect)
        .await;
    world.system_mut().last_withdrawal = Some(result);
}

#[when("the withdrawal is approved")]
async fn approve_withdrawal(world: &mut LedgerWorld) {
    let system = world.system();
    let withdrawal = system
        .last_withdrawal
        .as_ref()
        .and_then(|r| r.data.clone())
        .expect("No withdrawal has been requested");
    let result = system.withdrawals().approve_withdrawal(withdrawal.kind, withdrawal.id).await;
    world.system_mut().last_withdrawal = Some(result);
}

#[then(expr = "the {word} wallet balance is ${float}")]
async fn check_balance(world: &mut LedgerWorld, who: String, dollars: f64) {
    let system = world.system();
    let wallet = system.db.fetch_or_create_wallet(system.user_id(&who)).await.expect("Error fetching wallet");
    assert_eq!(wallet.balance, usd(dollars), "Balance of {who} is incorrect");
}

#[then(expr = "the {word} wallet pending is ${float}")]
async fn check_pending(world: &mut LedgerWorld, who: String, dollars: f64) {
    let system = world.system();
    let wallet = system.db.fetch_or_create_wallet(system.user_id(&who)).await.expect("Error fetching wallet");
    assert_eq!(wallet.pending, usd(dollars), "Pending amount of {who} is incorrect");
}

#[then(expr = "the {word} wallet agrees with the ledger")]
async fn check_audit(world: &mut LedgerWorld, who: String) {
    let system = world.system();
    let api = LedgerApi::new(system.db.clone());
    let wallet = api.wallet_for_user(system.user_id(&who)).await.expect("Error fetching wallet");
    let audit = api.audit(wallet.id).await.expect("Error auditing wallet");
    assert!(audit.is_consistent(), "Wallet of {who} has drifted: {audit:?}");
}

#[then(expr = "order {word} has {int} ledger entries")]
async fn check_ledger_entries(world: &mut LedgerWorld, name: String, count: usize) {
    let system = world.system();
    let order_id = system.order(&name).id;
    let entries = system.db.fetch_ledger_entries_for_order(order_id).await.expect("Error fetching entries");
    assert_eq!(entries.len(), count, "Unexpected ledger entries: {entries:?}");
}

#[then(expr = "the withdrawal fails with code {word}")]
async fn check_withdrawal_code(world: &mut LedgerWorld, code: String) {
    let result = world.system().last_withdrawal.as_ref().expect("No withdrawal result");
    assert!(!result.success, "Withdrawal succeeded: {result:?}");
    assert_eq!(result.code(), Some(code.as_str()));
}

#[then(expr = "the withdrawal is {word}")]
async fn check_withdrawal_status(world: &mut LedgerWorld, status: String) {
    let result = world.system().last_withdrawal.as_ref().expect("No withdrawal result");
    let withdrawal = result.data.as_ref().expect("The result carries no withdrawal");
    let expected = status.parse::<WithdrawalStatus>().expect("Not a withdrawal status");
    assert_eq!(withdrawal.status, expected);
}
