use ledger_engine::{
    db_types::{EntryDirection, LedgerEntryType, NewUser, Usd, UserRole},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{DoubleEntryRequest, Party},
    LedgerApi,
    LedgerError,
    LedgerManagement,
    OrderManagement,
    SqliteDatabase,
};

async fn setup() -> (SqliteDatabase, i64, i64) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let alice = db.create_user(NewUser::new("Alice", UserRole::Seller)).await.unwrap().id;
    let bob = db.create_user(NewUser::new("Bob", UserRole::Rider)).await.unwrap().id;
    (db, alice, bob)
}

fn top_up(user_id: i64, cents: i64, reference: &str) -> DoubleEntryRequest {
    DoubleEntryRequest::new(
        Party::External(Some(user_id)),
        Party::User(user_id),
        Usd::from(cents),
        LedgerEntryType::WalletTopup,
        reference,
    )
}

#[tokio::test]
async fn double_entry_writes_a_balanced_pair() {
    let (db, alice, bob) = setup().await;
    db.create_double_entry(top_up(alice, 5_000, "topup-1")).await.unwrap();
    let request = DoubleEntryRequest::new(
        Party::User(alice),
        Party::User(bob),
        Usd::from(1_250),
        LedgerEntryType::EscrowRelease,
        "move-1",
    );
    let result = db.create_double_entry(request).await.unwrap();
    assert!(result.created);
    assert_eq!(result.debit.reference, "move-1-debit");
    assert_eq!(result.credit.reference, "move-1-credit");
    assert_eq!(result.debit.direction, EntryDirection::Debit);
    assert_eq!(result.credit.direction, EntryDirection::Credit);
    assert_eq!(result.debit.amount, result.credit.amount);

    let alice_wallet = db.fetch_wallet_for_user(alice).await.unwrap().unwrap();
    let bob_wallet = db.fetch_wallet_for_user(bob).await.unwrap().unwrap();
    assert_eq!(alice_wallet.balance, Usd::from(3_750));
    assert_eq!(bob_wallet.balance, Usd::from(1_250));
}

#[tokio::test]
async fn replaying_a_reference_changes_nothing() {
    let (db, alice, _) = setup().await;
    let first = db.create_double_entry(top_up(alice, 2_000, "topup-replay")).await.unwrap();
    let second = db.create_double_entry(top_up(alice, 2_000, "topup-replay")).await.unwrap();
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.debit.id, second.debit.id);
    let wallet = db.fetch_wallet_for_user(alice).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Usd::from(2_000));
    assert_eq!(db.fetch_ledger_entries_for_wallet(wallet.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn overdraft_is_refused_before_anything_is_written() {
    let (db, alice, bob) = setup().await;
    db.create_double_entry(top_up(alice, 1_000, "topup-small")).await.unwrap();
    let request = DoubleEntryRequest::new(
        Party::User(alice),
        Party::User(bob),
        Usd::from(1_001),
        LedgerEntryType::EscrowRelease,
        "too-much",
    );
    let err = db.create_double_entry(request).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { required, .. } if required == Usd::from(1_001)));
    assert!(db.fetch_ledger_entry("too-much-debit").await.unwrap().is_none());
    assert!(db.fetch_ledger_entry("too-much-credit").await.unwrap().is_none());
    let wallet = db.fetch_wallet_for_user(alice).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Usd::from(1_000));
}

#[tokio::test]
async fn allow_negative_skips_the_balance_check() {
    let (db, alice, bob) = setup().await;
    let fee = LedgerEntryType::PlatformFee;
    let request =
        DoubleEntryRequest::new(Party::User(alice), Party::User(bob), Usd::from(300), fee, "fee-1").allow_negative();
    db.create_double_entry(request).await.unwrap();
    let wallet = db.fetch_wallet_for_user(alice).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Usd::from(-300));
}

#[tokio::test]
async fn zero_and_negative_amounts_are_rejected() {
    let (db, alice, _) = setup().await;
    let err = db.create_double_entry(top_up(alice, 0, "zero")).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));
    let err = db.create_double_entry(top_up(alice, -5, "negative")).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));
}

#[tokio::test]
async fn cached_balance_matches_the_journal_and_can_be_repaired() {
    let (db, alice, bob) = setup().await;
    db.create_double_entry(top_up(alice, 10_000, "topup-a")).await.unwrap();
    db.create_double_entry(top_up(bob, 700, "topup-b")).await.unwrap();
    let request =
        DoubleEntryRequest::new(Party::User(alice), Party::User(bob), Usd::from(2_500), LedgerEntryType::Refund, "r-1");
    db.create_double_entry(request).await.unwrap();

    let api = LedgerApi::new(db.clone());
    let wallet = api.wallet_for_user(alice).await.unwrap();
    let audit = api.audit(wallet.id).await.unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.ledger_balance, Usd::from(7_500));

    // Simulate drift in the cache
    sqlx::query("UPDATE wallets SET balance = 1 WHERE id = ?").bind(wallet.id).execute(db.pool()).await.unwrap();
    let audit = api.audit(wallet.id).await.unwrap();
    assert!(!audit.is_consistent());
    let repaired = api.repair(wallet.id).await.unwrap();
    assert_eq!(repaired.balance, Usd::from(7_500));
    assert!(api.audit(wallet.id).await.unwrap().is_consistent());
}

#[tokio::test]
async fn ledger_entries_cannot_be_changed() {
    let (db, alice, _) = setup().await;
    db.create_double_entry(top_up(alice, 1_000, "immutable")).await.unwrap();
    let update = sqlx::query("UPDATE ledger_entries SET amount = 1 WHERE reference = 'immutable-credit'")
        .execute(db.pool())
        .await;
    assert!(update.is_err());
    let delete =
        sqlx::query("DELETE FROM ledger_entries WHERE reference = 'immutable-credit'").execute(db.pool()).await;
    assert!(delete.is_err());
}
