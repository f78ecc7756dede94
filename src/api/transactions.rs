//! Transaction endpoints
//!
//! Posting runs the ledger engine; reads return immutable transaction
//! records. There is no update or delete: a posted transaction is a fact.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{DomainError, OperationContext};
use crate::error::AppError;
use crate::handlers::{PostTransactionCommand, PostTransactionHandler};

use super::middleware::AuthenticatedApiKey;
use super::pagination::{Page, PageQuery};

#[derive(Debug, Deserialize)]
pub struct PostTransactionRequest {
    pub loan_id: Uuid,
    pub transaction_amount: Decimal,
    #[serde(default)]
    pub transaction_description: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
    #[serde(default = "default_status")]
    pub transaction_status: String,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
}

fn default_status() -> String {
    "Posted".to_string()
}

#[derive(Debug, Serialize)]
pub struct PostTransactionResponse {
    pub transaction_id: Uuid,
    pub loan_id: Uuid,
    pub loan_number: i64,
    pub debited_customer_id: Uuid,
    pub transaction_amount: Decimal,
    pub transaction_date: DateTime<Utc>,
    pub transaction_status: String,
    pub interest_amt: Decimal,
    pub principal_amt: Decimal,
    pub loan_balance: Decimal,
    pub next_payment_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub loan_number: i64,
    pub customer_id: Option<Uuid>,
    pub transaction_amount: Decimal,
    pub transaction_description: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub transaction_status: String,
    pub created_at: DateTime<Utc>,
}

pub(super) type TransactionRow = (
    Uuid,
    Uuid,
    i64,
    Option<Uuid>,
    Decimal,
    Option<String>,
    DateTime<Utc>,
    String,
    DateTime<Utc>,
);

impl From<TransactionRow> for TransactionResponse {
    fn from(row: TransactionRow) -> Self {
        let (
            id,
            loan_id,
            loan_number,
            customer_id,
            transaction_amount,
            transaction_description,
            transaction_date,
            transaction_status,
            created_at,
        ) = row;
        Self {
            id,
            loan_id,
            loan_number,
            customer_id,
            transaction_amount,
            transaction_description,
            transaction_date,
            transaction_status,
            created_at,
        }
    }
}

pub(super) const TRANSACTION_COLUMNS: &str = "id, loan_id, loan_number, customer_id, \
     transaction_amount, transaction_description, \
     transaction_date, transaction_status, created_at";

pub fn router() -> Router<PgPool> {
    Router::new()
        .route("/transactions", post(post_transaction))
        .route("/transactions", get(list_transactions))
        .route("/transactions/:transaction_id", get(get_transaction))
}

/// Post a payment against a loan
async fn post_transaction(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Json(request): Json<PostTransactionRequest>,
) -> Result<(StatusCode, Json<PostTransactionResponse>), AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    let handler = PostTransactionHandler::new(pool);

    let mut command = PostTransactionCommand::new(
        request.loan_id,
        request.transaction_amount,
        request.transaction_status,
    );
    if let Some(customer_id) = request.customer_id {
        command = command.with_customer(customer_id);
    }
    if let Some(description) = request.transaction_description {
        command = command.with_description(description);
    }
    if let Some(date) = request.transaction_date {
        command = command.with_date(date);
    }

    let result = handler.execute(command, &context).await?;

    Ok((
        StatusCode::CREATED,
        Json(PostTransactionResponse {
            transaction_id: result.transaction_id,
            loan_id: result.loan_id,
            loan_number: result.loan_number,
            debited_customer_id: result.debited_customer_id,
            transaction_amount: result.transaction_amount,
            transaction_date: result.transaction_date,
            transaction_status: result.transaction_status,
            interest_amt: result.interest_amt,
            principal_amt: result.principal_amt,
            loan_balance: result.loan_balance,
            next_payment_date: result.next_payment_date,
        }),
    ))
}

/// Get transaction by ID
async fn get_transaction(
    State(pool): State<PgPool>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    let row: Option<TransactionRow> = sqlx::query_as(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
    ))
    .bind(transaction_id)
    .fetch_optional(&pool)
    .await?;

    let row = row.ok_or_else(|| {
        AppError::Domain(DomainError::TransactionNotFound(transaction_id.to_string()))
    })?;

    Ok(Json(row.into()))
}

/// List transactions, most recent first
async fn list_transactions(
    State(pool): State<PgPool>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<TransactionResponse>>, AppError> {
    let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
        FROM transactions
        ORDER BY transaction_date DESC
        LIMIT $1 OFFSET $2
        "#
    ))
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(&pool)
        .await?;

    let results = rows.into_iter().map(TransactionResponse::from).collect();
    Ok(Json(Page::new(results, &query, total)))
}
