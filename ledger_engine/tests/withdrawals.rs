use ledger_engine::{
    db_types::{
        LedgerEntryType,
        NewUser,
        TransactionType,
        Usd,
        UserRole,
        WithdrawalKind,
        WithdrawalMethod,
        WithdrawalStatus,
    },
    ledger_api::{
        action::{
            BELOW_MINIMUM,
            INSUFFICIENT_BALANCE,
            INVALID_AMOUNT,
            INVALID_STATE,
            NOT_FOUND,
            NO_PAYOUT_ACCOUNT,
            TRANSFER_FAILED,
            TRANSFER_PENDING,
        },
        policy::PayoutPolicy,
    },
    test_utils::{
        fixtures::{seed_marketplace, Marketplace},
        mock_transfer::MockTransferProvider,
        prepare_env::{prepare_test_env, random_db_path},
    },
    traits::{DoubleEntryRequest, Party},
    LedgerManagement,
    OrderManagement,
    SqliteDatabase,
    WithdrawalApi,
    WithdrawalManagement,
};

async fn setup() -> (SqliteDatabase, Marketplace) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let market = seed_marketplace(&db).await;
    (db, market)
}

async fn credit(db: &SqliteDatabase, user_id: i64, amount: Usd, reference: &str) {
    let request = DoubleEntryRequest::new(
        Party::External(Some(user_id)),
        Party::User(user_id),
        amount,
        LedgerEntryType::WalletTopup,
        reference,
    );
    db.create_double_entry(request).await.expect("Error crediting wallet");
}

fn api(
    db: &SqliteDatabase,
    market: &Marketplace,
    transfers: MockTransferProvider,
) -> WithdrawalApi<SqliteDatabase, MockTransferProvider> {
    WithdrawalApi::new(db.clone(), transfers, market.treasury, PayoutPolicy::default())
}

async fn balance(db: &SqliteDatabase, user_id: i64) -> Usd {
    db.fetch_or_create_wallet(user_id).await.unwrap().balance
}

#[tokio::test]
async fn withdrawing_more_than_the_balance_is_refused() {
    let (db, m) = setup().await;
    credit(&db, m.general_seller, Usd::from_dollars(15), "topup-seller").await;
    let api = api(&db, &m, MockTransferProvider::default());

    let method = WithdrawalMethod::StripeConnect;
    let result = api.request_withdrawal(WithdrawalKind::Seller, m.general_seller, Usd::from_dollars(20), method).await;
    assert!(!result.success);
    assert_eq!(result.code(), Some(INSUFFICIENT_BALANCE));
    assert!(result.data.is_none());
    assert!(api.withdrawals_for_user(m.general_seller).await.unwrap().is_empty());
    assert_eq!(balance(&db, m.general_seller).await, Usd::from_dollars(15));
    let wallet = db.fetch_or_create_wallet(m.general_seller).await.unwrap();
    let entries = db.fetch_ledger_entries_for_wallet(wallet.id).await.unwrap();
    assert!(entries.iter().all(|e| e.entry_type != LedgerEntryType::WalletWithdrawal), "{entries:?}");
}

#[tokio::test]
async fn invalid_requests_are_rejected_with_codes() {
    let (db, m) = setup().await;
    credit(&db, m.rider, Usd::from_dollars(50), "topup-rider").await;
    let no_account = db.create_user(NewUser::new("Carol", UserRole::Rider)).await.unwrap().id;
    credit(&db, no_account, Usd::from_dollars(50), "topup-carol").await;
    let api = api(&db, &m, MockTransferProvider::default());
    let method = WithdrawalMethod::StripeConnect;

    let zero = api.request_withdrawal(WithdrawalKind::Rider, m.rider, Usd::default(), method).await;
    assert_eq!(zero.code(), Some(INVALID_AMOUNT));
    let small = api.request_withdrawal(WithdrawalKind::Rider, m.rider, Usd::from(999), method).await;
    assert_eq!(small.code(), Some(BELOW_MINIMUM));
    let missing = api.request_withdrawal(WithdrawalKind::Rider, 9_999, Usd::from_dollars(10), method).await;
    assert_eq!(missing.code(), Some(NOT_FOUND));
    let unconfigured = api.request_withdrawal(WithdrawalKind::Rider, no_account, Usd::from_dollars(10), method).await;
    assert_eq!(unconfigured.code(), Some(NO_PAYOUT_ACCOUNT));
    assert_eq!(balance(&db, m.rider).await, Usd::from_dollars(50));
}

#[tokio::test]
async fn a_request_reserves_funds_against_a_second_request() {
    let (db, m) = setup().await;
    credit(&db, m.rider, Usd::from_dollars(30), "topup-rider").await;
    let api = api(&db, &m, MockTransferProvider::default());
    let method = WithdrawalMethod::StripeConnect;

    let first = api.request_withdrawal(WithdrawalKind::Rider, m.rider, Usd::from_dollars(20), method).await;
    assert!(first.success, "{first:?}");
    let withdrawal = first.data.unwrap();
    assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
    assert_eq!(balance(&db, m.rider).await, Usd::from_dollars(10));

    let second = api.request_withdrawal(WithdrawalKind::Rider, m.rider, Usd::from_dollars(20), method).await;
    assert_eq!(second.code(), Some(INSUFFICIENT_BALANCE));
    assert_eq!(api.withdrawals_for_user(m.rider).await.unwrap().len(), 1);
}

#[tokio::test]
async fn approval_pays_out_once() {
    let (db, m) = setup().await;
    credit(&db, m.general_seller, Usd::from_dollars(40), "topup-seller").await;
    let transfers = MockTransferProvider::default();
    let api = api(&db, &m, transfers.clone());
    let method = WithdrawalMethod::StripeConnect;
    let withdrawal = api
        .request_withdrawal(WithdrawalKind::Seller, m.general_seller, Usd::from_dollars(25), method)
        .await
        .data
        .unwrap();

    let approved = api.approve_withdrawal(WithdrawalKind::Seller, withdrawal.id).await;
    assert!(approved.success, "{approved:?}");
    let approved = approved.data.unwrap();
    assert_eq!(approved.status, WithdrawalStatus::Completed);
    assert!(approved.processed_at.is_some());
    let info = approved.account_info_json().unwrap();
    assert_eq!(info["transfer_id"], format!("tr_seller-withdrawal-{}", withdrawal.id));

    let again = api.approve_withdrawal(WithdrawalKind::Seller, withdrawal.id).await;
    assert!(again.success);
    assert_eq!(transfers.requests().len(), 1);
    let request = &transfers.requests()[0];
    assert_eq!(request.amount_cents, 2_500);
    assert_eq!(request.currency, "usd");
    assert_eq!(request.destination, "acct_general");

    assert_eq!(balance(&db, m.general_seller).await, Usd::from_dollars(15));
    assert_eq!(balance(&db, m.treasury).await, Usd::default());
    let wallet = db.fetch_or_create_wallet(m.general_seller).await.unwrap();
    let payouts = db
        .fetch_transactions_for_wallet(wallet.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.tx_type == TransactionType::SellerPayout)
        .count();
    assert_eq!(payouts, 1);
}

#[tokio::test]
async fn approving_with_the_wrong_kind_is_not_found() {
    let (db, m) = setup().await;
    credit(&db, m.rider, Usd::from_dollars(40), "topup-rider").await;
    let api = api(&db, &m, MockTransferProvider::default());
    let method = WithdrawalMethod::StripeConnect;
    let withdrawal =
        api.request_withdrawal(WithdrawalKind::Rider, m.rider, Usd::from_dollars(12), method).await.data.unwrap();
    let result = api.approve_withdrawal(WithdrawalKind::Seller, withdrawal.id).await;
    assert_eq!(result.code(), Some(NOT_FOUND));
    let result = api.approve_withdrawal(WithdrawalKind::Rider, 9_999).await;
    assert_eq!(result.code(), Some(NOT_FOUND));
}

#[tokio::test]
async fn a_declined_transfer_rejects_and_returns_the_funds() {
    let (db, m) = setup().await;
    credit(&db, m.rider, Usd::from_dollars(35), "topup-rider").await;
    let transfers = MockTransferProvider::declining("insufficient platform balance");
    let api = api(&db, &m, transfers.clone());
    let method = WithdrawalMethod::StripeConnect;
    let withdrawal =
        api.request_withdrawal(WithdrawalKind::Rider, m.rider, Usd::from_dollars(30), method).await.data.unwrap();
    assert_eq!(balance(&db, m.rider).await, Usd::from_dollars(5));

    let result = api.approve_withdrawal(WithdrawalKind::Rider, withdrawal.id).await;
    assert!(!result.success);
    assert_eq!(result.code(), Some(TRANSFER_FAILED));
    assert!(result.message.as_deref().unwrap_or_default().contains("insufficient platform balance"));
    let rejected = result.data.unwrap();
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    let info = rejected.account_info_json().unwrap();
    assert!(info["reason"].as_str().unwrap().contains("insufficient platform balance"));

    assert_eq!(balance(&db, m.rider).await, Usd::from_dollars(35));
    let wallet = db.fetch_or_create_wallet(m.rider).await.unwrap();
    let txs = db.fetch_transactions_for_wallet(wallet.id).await.unwrap();
    assert!(txs.iter().all(|t| t.tx_type != TransactionType::RiderPayout), "{txs:?}");
    assert!(txs.iter().any(|t| t.tx_type == TransactionType::Refund));

    // A rejected withdrawal stays rejected
    let again = api.approve_withdrawal(WithdrawalKind::Rider, withdrawal.id).await;
    assert!(again.success);
    assert_eq!(again.data.unwrap().status, WithdrawalStatus::Rejected);
    assert_eq!(transfers.requests().len(), 1);
    assert_eq!(balance(&db, m.rider).await, Usd::from_dollars(35));
}

#[tokio::test]
async fn approval_without_a_payout_account_rejects() {
    let (db, m) = setup().await;
    credit(&db, m.food_seller, Usd::from_dollars(20), "topup-food").await;
    let transfers = MockTransferProvider::default();
    let api = api(&db, &m, transfers.clone());
    let method = WithdrawalMethod::StripeConnect;
    let withdrawal = api
        .request_withdrawal(WithdrawalKind::Seller, m.food_seller, Usd::from_dollars(20), method)
        .await
        .data
        .unwrap();
    db.set_payout_account(m.food_seller, None).await.unwrap();

    let result = api.approve_withdrawal(WithdrawalKind::Seller, withdrawal.id).await;
    assert_eq!(result.code(), Some(NO_PAYOUT_ACCOUNT));
    assert_eq!(result.data.unwrap().status, WithdrawalStatus::Rejected);
    assert!(transfers.requests().is_empty());
    assert_eq!(balance(&db, m.food_seller).await, Usd::from_dollars(20));
}

#[tokio::test]
async fn manual_rejection_returns_the_funds_once() {
    let (db, m) = setup().await;
    credit(&db, m.rider, Usd::from_dollars(25), "topup-rider").await;
    let api = api(&db, &m, MockTransferProvider::default());
    let method = WithdrawalMethod::StripeConnect;
    let withdrawal =
        api.request_withdrawal(WithdrawalKind::Rider, m.rider, Usd::from_dollars(25), method).await.data.unwrap();
    assert_eq!(balance(&db, m.rider).await, Usd::default());

    let first = api.reject_withdrawal(WithdrawalKind::Rider, withdrawal.id, "Requested by support").await;
    assert!(first.success);
    let second = api.reject_withdrawal(WithdrawalKind::Rider, withdrawal.id, "Requested by support").await;
    assert!(second.success);
    assert_eq!(balance(&db, m.rider).await, Usd::from_dollars(25));
    let stored = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, WithdrawalStatus::Rejected);
}

#[tokio::test]
async fn an_unreachable_provider_leaves_the_withdrawal_processing() {
    let (db, m) = setup().await;
    credit(&db, m.general_seller, Usd::from_dollars(60), "topup-seller").await;
    let transfers = MockTransferProvider::unavailable_for(2, "connection reset");
    let api = api(&db, &m, transfers.clone());
    let method = WithdrawalMethod::StripeConnect;
    let withdrawal = api
        .request_withdrawal(WithdrawalKind::Seller, m.general_seller, Usd::from_dollars(45), method)
        .await
        .data
        .unwrap();

    for _ in 0..2 {
        let result = api.approve_withdrawal(WithdrawalKind::Seller, withdrawal.id).await;
        assert!(!result.success);
        assert_eq!(result.code(), Some(TRANSFER_PENDING));
        assert!(result.message.as_deref().unwrap_or_default().contains("connection reset"));
        assert_eq!(result.data.unwrap().status, WithdrawalStatus::Processing);
        // The reservation is not handed back while the transfer may still land
        assert_eq!(balance(&db, m.general_seller).await, Usd::from_dollars(15));
    }

    let settled = api.approve_withdrawal(WithdrawalKind::Seller, withdrawal.id).await;
    assert!(settled.success, "{settled:?}");
    assert_eq!(settled.data.unwrap().status, WithdrawalStatus::Completed);

    let requests = transfers.requests();
    assert_eq!(requests.len(), 3);
    let key = format!("seller-withdrawal-{}", withdrawal.id);
    assert!(requests.iter().all(|r| r.idempotency_key == key), "{requests:?}");

    assert_eq!(balance(&db, m.general_seller).await, Usd::from_dollars(15));
    assert_eq!(balance(&db, m.treasury).await, Usd::default());
    let wallet = db.fetch_or_create_wallet(m.general_seller).await.unwrap();
    let txs = db.fetch_transactions_for_wallet(wallet.id).await.unwrap();
    assert!(txs.iter().all(|t| t.tx_type != TransactionType::Refund), "{txs:?}");
    assert_eq!(txs.iter().filter(|t| t.tx_type == TransactionType::SellerPayout).count(), 1);
}

#[tokio::test]
async fn a_withdrawal_in_flight_cannot_be_rejected_by_hand() {
    let (db, m) = setup().await;
    credit(&db, m.rider, Usd::from_dollars(30), "topup-rider").await;
    let transfers = MockTransferProvider::unavailable_for(1, "timed out");
    let api = api(&db, &m, transfers.clone());
    let method = WithdrawalMethod::StripeConnect;
    let withdrawal =
        api.request_withdrawal(WithdrawalKind::Rider, m.rider, Usd::from_dollars(30), method).await.data.unwrap();
    let pending = api.approve_withdrawal(WithdrawalKind::Rider, withdrawal.id).await;
    assert_eq!(pending.code(), Some(TRANSFER_PENDING));

    let rejected = api.reject_withdrawal(WithdrawalKind::Rider, withdrawal.id, "Changed my mind").await;
    assert!(!rejected.success);
    assert_eq!(rejected.code(), Some(INVALID_STATE));
    let stored = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, WithdrawalStatus::Processing);
    assert_eq!(balance(&db, m.rider).await, Usd::default());

    // Dropping the payout account does not release funds that may already be on their way
    db.set_payout_account(m.rider, None).await.unwrap();
    let result = api.approve_withdrawal(WithdrawalKind::Rider, withdrawal.id).await;
    assert_eq!(result.code(), Some(NO_PAYOUT_ACCOUNT));
    assert_eq!(result.data.unwrap().status, WithdrawalStatus::Processing);
    assert_eq!(balance(&db, m.rider).await, Usd::default());

    db.set_payout_account(m.rider, Some("acct_rider".into())).await.unwrap();
    let settled = api.approve_withdrawal(WithdrawalKind::Rider, withdrawal.id).await;
    assert_eq!(settled.data.unwrap().status, WithdrawalStatus::Completed);
    assert_eq!(transfers.requests().len(), 2);
    assert_eq!(balance(&db, m.rider).await, Usd::default());
    let wallet = db.fetch_or_create_wallet(m.rider).await.unwrap();
    let txs = db.fetch_transactions_for_wallet(wallet.id).await.unwrap();
    assert!(txs.iter().all(|t| t.tx_type != TransactionType::Refund), "{txs:?}");
}
