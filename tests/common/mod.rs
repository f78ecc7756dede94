//! Common test utilities

use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

/// API key seeded for tests
pub const TEST_API_KEY: &str = "test_key_123";

/// Handle to the shared test database. Holds a lock so tests that truncate
/// the shared database run one at a time.
pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

fn db_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Setup test database when one is configured. Returns None (and the caller
/// skips) when DATABASE_URL is not set, so the suite runs without Postgres.
pub async fn try_setup_test_db() -> Option<TestDb> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping integration test");
            return None;
        }
    };

    let guard = db_lock().lock().await;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to apply migrations");

    // Clean up DB for fresh state
    sqlx::query(
        "TRUNCATE TABLE audit_logs, transactions, loan_interest, loan_customers, \
         loans, order_items, orders, products, customers, api_keys CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    // Seed test API key; the hash must match what the auth middleware computes
    let mut hasher = Sha256::new();
    hasher.update(TEST_API_KEY.as_bytes());
    let key_hash = hex::encode(hasher.finalize());

    sqlx::query(
        r#"
        INSERT INTO api_keys (id, name, key_hash, permissions, is_active)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (key_hash) DO NOTHING
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind("Test Key")
    .bind(&key_hash)
    .bind(vec!["admin".to_string()])
    .bind(true)
    .execute(&pool)
    .await
    .expect("Failed to seed API key");

    Some(TestDb {
        pool,
        _guard: guard,
    })
}
