//! Loan endpoints
//!
//! Origination goes through the loan handler; reads return the amortization
//! position. Get-by-id attaches the loan's transactions as a derived field.

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
use crate::domain::{DomainError, LoanStatus, OperationContext};
use crate::error::AppError;
use crate::handlers::{CreateLoanCommand, CreateLoanHandler};

use super::middleware::AuthenticatedApiKey;
use super::pagination::{Page, PageQuery};
use super::transactions::{TransactionResponse, TransactionRow, TRANSACTION_COLUMNS};

#[derive(Debug, Deserialize)]
pub struct CreateLoanRequest {
    pub loan_amount: Decimal,
    pub interest_rate: Decimal,
    /// Duration in years
    pub loan_duration: u32,
    #[serde(default = "default_payment_frequency")]
    pub payment_frequency: u32,
    pub loan_type: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub offset_account: bool,
    #[serde(default)]
    pub customer_ids: Vec<Uuid>,
}

fn default_payment_frequency() -> u32 {
    12
}

#[derive(Debug, Serialize)]
pub struct CreateLoanResponse {
    pub loan_id: Uuid,
    pub loan_number: i64,
    pub loan_balance: Decimal,
    pub emi: Decimal,
    pub next_payment_date: NaiveDate,
    pub offset_amt: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLoanRequest {
    #[serde(default)]
    pub loan_type: Option<String>,
    #[serde(default)]
    pub loan_status: Option<LoanStatus>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LoanResponse {
    pub id: Uuid,
    pub loan_number: i64,
    pub loan_amount: Decimal,
    pub loan_balance: Decimal,
    pub interest_rate: Decimal,
    pub principal_amt: Decimal,
    pub interest_amt: Decimal,
    pub total_interest_paid: Decimal,
    pub emi: Decimal,
    pub loan_duration: i32,
    pub payment_frequency: i32,
    pub loan_type: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_payment_date: NaiveDate,
    pub loan_status: String,
    pub offset_account: bool,
    pub offset_amt: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Loan with its posted transactions and interest history attached
#[derive(Debug, Serialize)]
pub struct LoanDetailResponse {
    #[serde(flatten)]
    pub loan: LoanResponse,
    pub transactions: Vec<TransactionResponse>,
    pub interest_paid: Vec<InterestEntry>,
}

/// One period's interest charge, appended at each posting
#[derive(Debug, Serialize)]
pub struct InterestEntry {
    pub payment_date: DateTime<Utc>,
    pub interest_charged: Decimal,
}

const LOAN_COLUMNS: &str = "id, loan_number, loan_amount, loan_balance, interest_rate, \
     principal_amt, interest_amt, total_interest_paid, emi, \
     loan_duration, payment_frequency, loan_type, \
     start_date, end_date, next_payment_date, \
     loan_status, offset_account, offset_amt, created_at, updated_at";

pub fn router() -> Router<PgPool> {
    Router::new()
        .route("/loans", post(create_loan))
        .route("/loans", get(list_loans))
        .route("/loans/:loan_id", get(get_loan))
        .route("/loans/:loan_id", patch(update_loan))
        .route("/loans/:loan_id", delete(delete_loan))
        .route("/loans/number/:loan_number", get(get_loan_by_number))
}

/// Originate a new loan
async fn create_loan(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Json(request): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<CreateLoanResponse>), AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    let handler = CreateLoanHandler::new(pool);

    let command = CreateLoanCommand {
        loan_amount: request.loan_amount,
        interest_rate: request.interest_rate,
        loan_duration: request.loan_duration,
        payment_frequency: request.payment_frequency,
        loan_type: request.loan_type,
        loan_status: LoanStatus::New,
        start_date: request.start_date,
        end_date: request.end_date,
        offset_account: request.offset_account,
        customer_ids: request.customer_ids,
    };

    let result = handler.execute(command, &context).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateLoanResponse {
            loan_id: result.loan_id,
            loan_number: result.loan_number,
            loan_balance: result.loan_balance,
            emi: result.emi,
            next_payment_date: result.next_payment_date,
            offset_amt: result.offset_amt,
        }),
    ))
}

/// Get loan by ID, with its transaction history
async fn get_loan(
    State(pool): State<PgPool>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<LoanDetailResponse>, AppError> {
    let row: Option<LoanResponse> =
        sqlx::query_as(&format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1"))
            .bind(loan_id)
            .fetch_optional(&pool)
            .await?;

    let row =
        row.ok_or_else(|| AppError::Domain(DomainError::LoanNotFound(loan_id.to_string())))?;

    let transactions: Vec<TransactionRow> = sqlx::query_as(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
        FROM transactions
        WHERE loan_id = $1
        ORDER BY transaction_date DESC
        "#
    ))
    .bind(loan_id)
    .fetch_all(&pool)
    .await?;

    let interest: Vec<(DateTime<Utc>, Decimal)> = sqlx::query_as(
        "SELECT payment_date, interest_charged FROM loan_interest \
         WHERE loan_id = $1 ORDER BY payment_date",
    )
    .bind(loan_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(LoanDetailResponse {
        loan: row,
        transactions: transactions
            .into_iter()
            .map(TransactionResponse::from)
            .collect(),
        interest_paid: interest
            .into_iter()
            .map(|(payment_date, interest_charged)| InterestEntry {
                payment_date,
                interest_charged,
            })
            .collect(),
    }))
}

/// Get loan by its human-facing loan number
async fn get_loan_by_number(
    State(pool): State<PgPool>,
    Path(loan_number): Path<i64>,
) -> Result<Json<LoanResponse>, AppError> {
    let row: Option<LoanResponse> = sqlx::query_as(&format!(
        "SELECT {LOAN_COLUMNS} FROM loans WHERE loan_number = $1"
    ))
    .bind(loan_number)
    .fetch_optional(&pool)
    .await?;

    let row = row
        .ok_or_else(|| AppError::Domain(DomainError::LoanNotFound(loan_number.to_string())))?;

    Ok(Json(row))
}

/// List loans, newest first
async fn list_loans(
    State(pool): State<PgPool>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<LoanResponse>>, AppError> {
    let rows: Vec<LoanResponse> = sqlx::query_as(&format!(
        r#"
        SELECT {LOAN_COLUMNS}
        FROM loans
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#
    ))
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans")
        .fetch_one(&pool)
        .await?;

    Ok(Json(Page::new(rows, &query, total)))
}

/// Update non-ledger loan fields. The amortization position only moves
/// through transaction posting.
async fn update_loan(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(loan_id): Path<Uuid>,
    Json(request): Json<UpdateLoanRequest>,
) -> Result<Json<LoanResponse>, AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    let row: Option<LoanResponse> = sqlx::query_as(&format!(
        r#"
        UPDATE loans
        SET loan_type = COALESCE($2, loan_type),
            loan_status = COALESCE($3, loan_status),
            end_date = COALESCE($4, end_date),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {LOAN_COLUMNS}
        "#
    ))
    .bind(loan_id)
    .bind(&request.loan_type)
    .bind(request.loan_status.map(|s| s.as_str().to_string()))
    .bind(request.end_date)
    .fetch_optional(&pool)
    .await?;

    let row =
        row.ok_or_else(|| AppError::Domain(DomainError::LoanNotFound(loan_id.to_string())))?;

    let audit = AuditLogService::new(pool);
    audit
        .log_best_effort(AuditAction::LoanUpdated, "Loan", loan_id, None, &context)
        .await;

    Ok(Json(row))
}

/// Delete a loan and its dependent records
async fn delete_loan(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(loan_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    let deleted = sqlx::query("DELETE FROM loans WHERE id = $1")
        .bind(loan_id)
        .execute(&pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::Domain(DomainError::LoanNotFound(
            loan_id.to_string(),
        )));
    }

    let audit = AuditLogService::new(pool);
    audit
        .log_best_effort(AuditAction::LoanDeleted, "Loan", loan_id, None, &context)
        .await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_loan_request_deserialize() {
        let json = r#"{
            "loan_amount": "250000.00",
            "interest_rate": "5.75",
            "loan_duration": 30,
            "loan_type": "Home",
            "start_date": "2024-01-15",
            "customer_ids": ["550e8400-e29b-41d4-a716-446655440000"]
        }"#;

        let request: CreateLoanRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.payment_frequency, 12);
        assert!(!request.offset_account);
        assert_eq!(request.customer_ids.len(), 1);
    }

    #[test]
    fn test_update_loan_request_all_optional() {
        let request: UpdateLoanRequest = serde_json::from_str("{}").unwrap();
        assert!(request.loan_type.is_none());
        assert!(request.loan_status.is_none());
        assert!(request.end_date.is_none());
    }
}
