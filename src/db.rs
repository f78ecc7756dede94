//! Database module
//!
//! Startup checks against the raw-SQL schema in migrations/.

use sqlx::PgPool;

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec![
        "api_keys",
        "customers",
        "loans",
        "loan_customers",
        "loan_interest",
        "transactions",
        "products",
        "orders",
        "order_items",
        "audit_logs",
    ];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    // loan_number / account_number come from database sequences
    for sequence in ["loan_number_seq", "account_number_seq"] {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.sequences
                WHERE sequence_schema = 'public' AND sequence_name = $1
            )
            "#,
        )
        .bind(sequence)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required sequence '{}' does not exist", sequence);
            return Ok(false);
        }
    }

    Ok(true)
}
