//! Customer account endpoints
//!
//! Account opening and CRUD. Account numbers come from a database sequence.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogService};
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::domain::DomainError;

use super::middleware::AuthenticatedApiKey;
use super::pagination::{Page, PageQuery};

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub account_name: String,
    pub account_type: String,
    #[serde(default)]
    pub account_balance: Option<Decimal>,
    #[serde(default)]
    pub account_open_date: Option<NaiveDate>,
    #[serde(default)]
    pub offset_account: bool,
    #[serde(default)]
    pub is_preferred_debit: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_status: Option<String>,
    #[serde(default)]
    pub offset_account: Option<bool>,
    #[serde(default)]
    pub is_preferred_debit: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub account_number: i64,
    pub account_name: String,
    pub account_type: String,
    pub account_status: String,
    pub account_balance: Decimal,
    pub account_open_date: Option<NaiveDate>,
    pub offset_account: bool,
    pub is_preferred_debit: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

type CustomerRow = (
    Uuid,
    i64,
    String,
    String,
    String,
    Decimal,
    Option<NaiveDate>,
    bool,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

impl From<CustomerRow> for CustomerResponse {
    fn from(row: CustomerRow) -> Self {
        let (
            id,
            account_number,
            account_name,
            account_type,
            account_status,
            account_balance,
            account_open_date,
            offset_account,
            is_preferred_debit,
            created_at,
            updated_at,
        ) = row;
        Self {
            id,
            account_number,
            account_name,
            account_type,
            account_status,
            account_balance,
            account_open_date,
            offset_account,
            is_preferred_debit,
            created_at,
            updated_at,
        }
    }
}

const CUSTOMER_COLUMNS: &str = "id, account_number, account_name, account_type, account_status, \
     account_balance, account_open_date, offset_account, is_preferred_debit, \
     created_at, updated_at";

pub fn router() -> Router<PgPool> {
    Router::new()
        .route("/customers", post(create_customer))
        .route("/customers", get(list_customers))
        .route("/customers/:customer_id", get(get_customer))
        .route("/customers/:customer_id", patch(update_customer))
        .route("/customers/:customer_id", delete(delete_customer))
}

/// Open a new customer account
async fn create_customer(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerResponse>), AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    if request.account_name.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "account_name must not be empty".to_string(),
        ));
    }

    let customer_id = Uuid::new_v4();
    let row: CustomerRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO customers (
            id, account_number, account_name, account_type, account_status,
            account_balance, account_open_date, offset_account, is_preferred_debit
        )
        VALUES ($1, nextval('account_number_seq'), $2, $3, 'Open', $4, $5, $6, $7)
        RETURNING {CUSTOMER_COLUMNS}
        "#
    ))
    .bind(customer_id)
    .bind(&request.account_name)
    .bind(&request.account_type)
    .bind(request.account_balance.unwrap_or(Decimal::ZERO))
    .bind(request.account_open_date)
    .bind(request.offset_account)
    .bind(request.is_preferred_debit)
    .fetch_one(&pool)
    .await?;

    let audit = AuditLogService::new(pool);
    audit
        .log_best_effort(
            AuditAction::CustomerCreated,
            "Customer",
            customer_id,
            Some(serde_json::json!({ "account_name": request.account_name })),
            &context,
        )
        .await;

    Ok((StatusCode::CREATED, Json(row.into())))
}

/// Get customer by ID
async fn get_customer(
    State(pool): State<PgPool>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<CustomerResponse>, AppError> {
    let row: Option<CustomerRow> = sqlx::query_as(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
    ))
    .bind(customer_id)
    .fetch_optional(&pool)
    .await?;

    let row = row.ok_or_else(|| {
        AppError::Domain(DomainError::CustomerNotFound(customer_id.to_string()))
    })?;

    Ok(Json(row.into()))
}

/// List customers, newest first
async fn list_customers(
    State(pool): State<PgPool>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<CustomerResponse>>, AppError> {
    let rows: Vec<CustomerRow> = sqlx::query_as(&format!(
        r#"
        SELECT {CUSTOMER_COLUMNS}
        FROM customers
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#
    ))
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(&pool)
        .await?;

    let results = rows.into_iter().map(CustomerResponse::from).collect();
    Ok(Json(Page::new(results, &query, total)))
}

/// Update customer fields
async fn update_customer(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<UpdateCustomerRequest>,
) -> Result<Json<CustomerResponse>, AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    let row: Option<CustomerRow> = sqlx::query_as(&format!(
        r#"
        UPDATE customers
        SET account_name = COALESCE($2, account_name),
            account_status = COALESCE($3, account_status),
            offset_account = COALESCE($4, offset_account),
            is_preferred_debit = COALESCE($5, is_preferred_debit),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {CUSTOMER_COLUMNS}
        "#
    ))
    .bind(customer_id)
    .bind(&request.account_name)
    .bind(&request.account_status)
    .bind(request.offset_account)
    .bind(request.is_preferred_debit)
    .fetch_optional(&pool)
    .await?;

    let row = row.ok_or_else(|| {
        AppError::Domain(DomainError::CustomerNotFound(customer_id.to_string()))
    })?;

    let audit = AuditLogService::new(pool);
    audit
        .log_best_effort(
            AuditAction::CustomerUpdated,
            "Customer",
            customer_id,
            None,
            &context,
        )
        .await;

    Ok(Json(row.into()))
}

/// Delete a customer account
async fn delete_customer(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(customer_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    let deleted = sqlx::query("DELETE FROM customers WHERE id = $1")
        .bind(customer_id)
        .execute(&pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::Domain(DomainError::CustomerNotFound(
            customer_id.to_string(),
        )));
    }

    let audit = AuditLogService::new(pool);
    audit
        .log_best_effort(
            AuditAction::CustomerDeleted,
            "Customer",
            customer_id,
            None,
            &context,
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_customer_request_defaults() {
        let json = r#"{
            "account_name": "Savings - A. Jones",
            "account_type": "Savings"
        }"#;

        let request: CreateCustomerRequest = serde_json::from_str(json).unwrap();
        assert!(request.account_balance.is_none());
        assert!(!request.offset_account);
        assert!(!request.is_preferred_debit);
    }
}
