//! Audit Log Service
//!
//! Records every state-changing operation with its actor and resource, for
//! compliance review. Writes are best-effort: an audit failure is logged but
//! never fails the business operation it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::OperationContext;

/// Audit log entry as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub request_user_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    CustomerCreated,
    CustomerUpdated,
    CustomerDeleted,
    LoanCreated,
    LoanUpdated,
    LoanDeleted,
    TransactionPosted,
    ProductCreated,
    OrderCreated,
    OrderStatusChanged,
    OrderDeleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CustomerCreated => "customer.created",
            AuditAction::CustomerUpdated => "customer.updated",
            AuditAction::CustomerDeleted => "customer.deleted",
            AuditAction::LoanCreated => "loan.created",
            AuditAction::LoanUpdated => "loan.updated",
            AuditAction::LoanDeleted => "loan.deleted",
            AuditAction::TransactionPosted => "transaction.posted",
            AuditAction::ProductCreated => "product.created",
            AuditAction::OrderCreated => "order.created",
            AuditAction::OrderStatusChanged => "order.status_changed",
            AuditAction::OrderDeleted => "order.deleted",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit Log Service
#[derive(Debug, Clone)]
pub struct AuditLogService {
    pool: PgPool,
}

impl AuditLogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write an audit log entry
    pub async fn log(
        &self,
        action: AuditAction,
        resource_type: &str,
        resource_id: Uuid,
        detail: Option<serde_json::Value>,
        context: &OperationContext,
    ) -> Result<Uuid, AuditLogError> {
        let id = Uuid::new_v4();

        let result: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO audit_logs (
                id, api_key_id, request_user_id, correlation_id,
                action, resource_type, resource_id, detail
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(context.api_key_id)
        .bind(context.request_user_id)
        .bind(context.correlation_id)
        .bind(action.as_str())
        .bind(resource_type)
        .bind(resource_id)
        .bind(&detail)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            audit_id = %result.0,
            action = %action,
            "Audit log entry created"
        );

        Ok(result.0)
    }

    /// Write an audit entry, logging (not propagating) any failure.
    pub async fn log_best_effort(
        &self,
        action: AuditAction,
        resource_type: &str,
        resource_id: Uuid,
        detail: Option<serde_json::Value>,
        context: &OperationContext,
    ) {
        if let Err(e) = self
            .log(action, resource_type, resource_id, detail, context)
            .await
        {
            tracing::error!(error = %e, action = %action, "Failed to write audit log entry");
        }
    }

    /// Get recent audit logs
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let entries: Vec<(
            Uuid,
            Option<Uuid>,
            Option<Uuid>,
            Option<Uuid>,
            String,
            Option<String>,
            Option<Uuid>,
            Option<serde_json::Value>,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"
            SELECT id, api_key_id, request_user_id, correlation_id,
                   action, resource_type, resource_id, detail, created_at
            FROM audit_logs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries
            .into_iter()
            .map(
                |(
                    id,
                    api_key_id,
                    request_user_id,
                    correlation_id,
                    action,
                    resource_type,
                    resource_id,
                    detail,
                    created_at,
                )| AuditLogEntry {
                    id,
                    api_key_id,
                    request_user_id,
                    correlation_id,
                    action,
                    resource_type,
                    resource_id,
                    detail,
                    created_at,
                },
            )
            .collect())
    }
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::LoanCreated.as_str(), "loan.created");
        assert_eq!(AuditAction::TransactionPosted.as_str(), "transaction.posted");
        assert_eq!(
            AuditAction::OrderStatusChanged.as_str(),
            "order.status_changed"
        );
    }
}
