//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<crate::domain::AmountError> for AppError {
    fn from(err: crate::domain::AmountError) -> Self {
        AppError::Domain(crate::domain::DomainError::InvalidAmount(err.to_string()))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),

            // 403 Forbidden
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::LoanNotFound(id) => {
                        (StatusCode::NOT_FOUND, "loan_not_found", Some(id.clone()))
                    }
                    DomainError::CustomerNotFound(id) => {
                        (StatusCode::NOT_FOUND, "customer_not_found", Some(id.clone()))
                    }
                    DomainError::OrderNotFound(id) => {
                        (StatusCode::NOT_FOUND, "order_not_found", Some(id.clone()))
                    }
                    DomainError::ProductNotFound(id) => {
                        (StatusCode::NOT_FOUND, "product_not_found", Some(id.clone()))
                    }
                    DomainError::TransactionNotFound(id) => (
                        StatusCode::NOT_FOUND,
                        "transaction_not_found",
                        Some(id.clone()),
                    ),
                    DomainError::NoDebitAccount => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "no_debit_account",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                    DomainError::InvalidLoanTerms(msg) => (
                        StatusCode::BAD_REQUEST,
                        "invalid_loan_terms",
                        Some(msg.clone()),
                    ),
                    DomainError::BalanceBelowZero { .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "balance_below_zero",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::OrderAlreadyDelivered => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "order_already_delivered",
                        None,
                    ),
                    DomainError::InvalidStatusTransition { .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "invalid_status_transition",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::BusinessRuleViolation(msg) => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "business_rule_violation",
                        Some(msg.clone()),
                    ),
                }
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
