use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// Loads `.env.test`, starts logging and leaves a fresh, fully migrated ledger database at `url`.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    reset_database(url).await;
    let db = SqliteDatabase::new_with_url(url, 1).await.expect("Error connecting to the test database");
    db.migrate().await.expect("Error migrating the test database");
    db.pool().close().await;
    debug!("🗃️ Test database ready at {url}");
}

/// A throwaway database file in the system temp directory.
pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/ledger_test_{}.db", dir.display(), rand::random::<u64>())
}

async fn reset_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        Sqlite::drop_database(url).await.expect("Error dropping stale test database");
    }
    Sqlite::create_database(url).await.expect("Error creating test database");
}
