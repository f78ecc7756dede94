//! Order and product endpoints
//!
//! Order creation snapshots product prices into order lines and totals them.
//! Status moves through the lifecycle handler; shipping consumes stock.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogService};
use crate::domain::{DomainError, OperationContext, OrderStatus};
use crate::error::AppError;
use crate::handlers::{UpdateOrderStatusCommand, UpdateOrderStatusHandler};

use super::middleware::AuthenticatedApiKey;
use super::pagination::{Page, PageQuery};

// =========================================================================
// Products
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

type ProductRow = (
    Uuid,
    String,
    Decimal,
    i32,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

impl From<ProductRow> for ProductResponse {
    fn from(row: ProductRow) -> Self {
        let (id, name, price, stock, description, created_at, updated_at) = row;
        Self {
            id,
            name,
            price,
            stock,
            description,
            created_at,
            updated_at,
        }
    }
}

// =========================================================================
// Orders
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub order_status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_status: String,
    pub total_price: Decimal,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

type OrderRow = (
    Uuid,
    String,
    Decimal,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const ORDER_COLUMNS: &str =
    "id, order_status, total_price, delivered_at, created_at, updated_at";

pub fn router() -> Router<PgPool> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:product_id", get(get_product))
        .route("/orders", post(create_order))
        .route("/orders", get(list_orders))
        .route("/orders/:order_id", get(get_order))
        .route("/orders/:order_id/status", patch(update_order_status))
        .route("/orders/:order_id", delete(delete_order))
}

/// Create a product
async fn create_product(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    if request.name.trim().is_empty() {
        return Err(AppError::InvalidRequest("name must not be empty".to_string()));
    }
    if request.price < Decimal::ZERO {
        return Err(AppError::InvalidRequest(
            "price must not be negative".to_string(),
        ));
    }
    if request.stock < 0 {
        return Err(AppError::InvalidRequest(
            "stock must not be negative".to_string(),
        ));
    }

    let product_id = Uuid::new_v4();
    let row: ProductRow = sqlx::query_as(
        r#"
        INSERT INTO products (id, name, price, stock, description)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, price, stock, description, created_at, updated_at
        "#,
    )
    .bind(product_id)
    .bind(&request.name)
    .bind(request.price)
    .bind(request.stock)
    .bind(&request.description)
    .fetch_one(&pool)
    .await?;

    let audit = AuditLogService::new(pool);
    audit
        .log_best_effort(
            AuditAction::ProductCreated,
            "Product",
            product_id,
            Some(serde_json::json!({ "name": request.name })),
            &context,
        )
        .await;

    Ok((StatusCode::CREATED, Json(row.into())))
}

/// Get product by ID
async fn get_product(
    State(pool): State<PgPool>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ProductResponse>, AppError> {
    let row: Option<ProductRow> = sqlx::query_as(
        "SELECT id, name, price, stock, description, created_at, updated_at \
         FROM products WHERE id = $1",
    )
    .bind(product_id)
    .fetch_optional(&pool)
    .await?;

    let row = row.ok_or_else(|| {
        AppError::Domain(DomainError::ProductNotFound(product_id.to_string()))
    })?;

    Ok(Json(row.into()))
}

/// Create an order from product lines. Prices are snapshotted from the
/// product catalog at order time.
async fn create_order(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    if request.items.is_empty() {
        return Err(AppError::InvalidRequest(
            "order must contain at least one item".to_string(),
        ));
    }
    if request.items.iter().any(|item| item.quantity <= 0) {
        return Err(AppError::InvalidRequest(
            "item quantity must be positive".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let mut items = Vec::with_capacity(request.items.len());
    let mut total_price = Decimal::ZERO;
    for item in &request.items {
        let price: Option<Decimal> =
            sqlx::query_scalar("SELECT price FROM products WHERE id = $1")
                .bind(item.product_id)
                .fetch_optional(&mut *tx)
                .await?;

        let price = price.ok_or_else(|| {
            AppError::Domain(DomainError::ProductNotFound(item.product_id.to_string()))
        })?;

        total_price += price * Decimal::from(item.quantity);
        items.push(OrderItemResponse {
            product_id: item.product_id,
            quantity: item.quantity,
            price,
        });
    }

    let order_id = Uuid::new_v4();
    let (created_at, updated_at): (DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO orders (id, order_status, total_price)
        VALUES ($1, $2, $3)
        RETURNING created_at, updated_at
        "#,
    )
    .bind(order_id)
    .bind(OrderStatus::New.as_str())
    .bind(total_price)
    .fetch_one(&mut *tx)
    .await?;

    for item in &items {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let audit = AuditLogService::new(pool);
    audit
        .log_best_effort(
            AuditAction::OrderCreated,
            "Order",
            order_id,
            Some(serde_json::json!({ "total_price": total_price })),
            &context,
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            id: order_id,
            order_status: OrderStatus::New.as_str().to_string(),
            total_price,
            delivered_at: None,
            created_at,
            updated_at,
            items,
        }),
    ))
}

/// Get order by ID with its lines
async fn get_order(
    State(pool): State<PgPool>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let row: Option<OrderRow> =
        sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id)
            .fetch_optional(&pool)
            .await?;

    let (id, order_status, total_price, delivered_at, created_at, updated_at) =
        row.ok_or_else(|| AppError::Domain(DomainError::OrderNotFound(order_id.to_string())))?;

    let items = fetch_order_items(&pool, order_id).await?;

    Ok(Json(OrderResponse {
        id,
        order_status,
        total_price,
        delivered_at,
        created_at,
        updated_at,
        items,
    }))
}

/// List orders, newest first
async fn list_orders(
    State(pool): State<PgPool>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<OrderResponse>>, AppError> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        r#"
        SELECT {ORDER_COLUMNS}
        FROM orders
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#
    ))
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for (id, order_status, total_price, delivered_at, created_at, updated_at) in rows {
        let items = fetch_order_items(&pool, id).await?;
        results.push(OrderResponse {
            id,
            order_status,
            total_price,
            delivered_at,
            created_at,
            updated_at,
            items,
        });
    }

    Ok(Json(Page::new(results, &query, total)))
}

async fn fetch_order_items(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<Vec<OrderItemResponse>, AppError> {
    let rows: Vec<(Uuid, i32, Decimal)> = sqlx::query_as(
        "SELECT product_id, quantity, price FROM order_items WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(product_id, quantity, price)| OrderItemResponse {
            product_id,
            quantity,
            price,
        })
        .collect())
}

/// Move an order through its lifecycle
async fn update_order_status(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    let handler = UpdateOrderStatusHandler::new(pool.clone());
    let command = UpdateOrderStatusCommand {
        order_id,
        status: request.order_status,
    };
    handler.execute(command, &context).await?;

    get_order(State(pool), Path(order_id)).await
}

/// Delete an order and its lines
async fn delete_order(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(order_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !api_key.has_permission("manage") {
        return Err(AppError::Forbidden("manage permission required".to_string()));
    }

    let deleted = sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(order_id)
        .execute(&pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::Domain(DomainError::OrderNotFound(
            order_id.to_string(),
        )));
    }

    let audit = AuditLogService::new(pool);
    audit
        .log_best_effort(AuditAction::OrderDeleted, "Order", order_id, None, &context)
        .await;

    Ok(StatusCode::NO_CONTENT)
}
