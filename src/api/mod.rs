//! API module
//!
//! HTTP surface: per-domain routers, auth middleware, and pagination.

pub mod customers;
pub mod loans;
pub mod middleware;
pub mod orders;
pub mod pagination;
pub mod transactions;

use axum::Router;
use sqlx::PgPool;

/// Assemble the API router from the per-domain routers
pub fn create_router() -> Router<PgPool> {
    Router::new()
        .merge(customers::router())
        .merge(loans::router())
        .merge(transactions::router())
        .merge(orders::router())
}
