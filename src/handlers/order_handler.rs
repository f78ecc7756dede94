//! Order status handler
//!
//! Moves an order through its lifecycle. Delivered is terminal; shipping
//! decrements product stock per order line, inside the same transaction as
//! the status update.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogService};
use crate::domain::{DomainError, OperationContext, OrderStatus};
use crate::error::AppError;

use super::{UpdateOrderStatusCommand, UpdateOrderStatusResult};

/// Handler for order status transitions
pub struct UpdateOrderStatusHandler {
    audit: AuditLogService,
    pool: PgPool,
}

impl UpdateOrderStatusHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            audit: AuditLogService::new(pool.clone()),
            pool,
        }
    }

    /// Execute the status update command
    pub async fn execute(
        &self,
        command: UpdateOrderStatusCommand,
        context: &OperationContext,
    ) -> Result<UpdateOrderStatusResult, AppError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT order_status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(command.order_id)
                .fetch_optional(&mut *tx)
                .await?;

        let (status_str,) = row.ok_or_else(|| {
            AppError::Domain(DomainError::OrderNotFound(command.order_id.to_string()))
        })?;

        let current = OrderStatus::parse(&status_str).ok_or_else(|| {
            AppError::Internal(format!("Order {} has unknown status {status_str}", command.order_id))
        })?;

        if current.is_terminal() {
            return Err(AppError::Domain(DomainError::OrderAlreadyDelivered));
        }

        if !current.can_transition_to(command.status) {
            return Err(AppError::Domain(DomainError::InvalidStatusTransition {
                from: current.to_string(),
                to: command.status.to_string(),
            }));
        }

        // Shipping consumes inventory, one decrement per order line
        if command.status == OrderStatus::Shipped {
            let lines: Vec<(Uuid, i32)> =
                sqlx::query_as("SELECT product_id, quantity FROM order_items WHERE order_id = $1")
                    .bind(command.order_id)
                    .fetch_all(&mut *tx)
                    .await?;

            for (product_id, quantity) in lines {
                let updated = sqlx::query(
                    "UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(product_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 0 {
                    return Err(AppError::Domain(DomainError::ProductNotFound(
                        product_id.to_string(),
                    )));
                }
            }
        }

        let delivered_at: Option<DateTime<Utc>> = if command.status == OrderStatus::Delivered {
            Some(Utc::now())
        } else {
            None
        };

        sqlx::query(
            r#"
            UPDATE orders
            SET order_status = $2,
                delivered_at = COALESCE($3, delivered_at),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(command.order_id)
        .bind(command.status.as_str())
        .bind(delivered_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.audit
            .log_best_effort(
                AuditAction::OrderStatusChanged,
                "Order",
                command.order_id,
                Some(serde_json::json!({
                    "from": current.as_str(),
                    "to": command.status.as_str(),
                })),
                context,
            )
            .await;

        tracing::info!(
            order_id = %command.order_id,
            from = %current,
            to = %command.status,
            "Order status updated"
        );

        Ok(UpdateOrderStatusResult {
            order_id: command.order_id,
            status: command.status,
            delivered_at,
        })
    }
}
