//! API integration tests
//!
//! Exercise the full stack against Postgres: auth middleware, loan
//! origination, transaction posting, and the order lifecycle. Tests skip
//! when DATABASE_URL is not set.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    middleware, Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::util::ServiceExt;
use uuid::Uuid;

use lending_api::api;

mod common;

fn test_app(pool: PgPool) -> Router {
    api::create_router()
        .layer(middleware::from_fn_with_state(
            pool.clone(),
            api::middleware::auth_middleware,
        ))
        .with_state(pool)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-API-Key", common::TEST_API_KEY);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = builder
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn decimal_field(value: &Value, field: &str) -> Decimal {
    value[field]
        .as_str()
        .unwrap_or_else(|| panic!("missing field {field} in {value}"))
        .parse()
        .unwrap()
}

async fn create_customer(app: &Router, balance: &str, preferred: bool, offset: bool) -> Uuid {
    let (status, body) = send(
        app,
        "POST",
        "/customers",
        Some(json!({
            "account_name": "Test Account",
            "account_type": "Savings",
            "account_balance": balance,
            "offset_account": offset,
            "is_preferred_debit": preferred
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "customer creation failed: {body}");
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn create_loan(app: &Router, customer_ids: &[Uuid], offset_account: bool) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/loans",
        Some(json!({
            "loan_amount": "1000.00",
            "interest_rate": "12",
            "loan_duration": 1,
            "loan_type": "Personal",
            "start_date": "2024-01-01",
            "offset_account": offset_account,
            "customer_ids": customer_ids
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "loan creation failed: {body}");
    body
}

#[tokio::test]
async fn test_auth_rejects_missing_and_bad_keys() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    let request = Request::builder()
        .method("GET")
        .uri("/loans")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("GET")
        .uri("/loans")
        .header("X-API-Key", "not_a_real_key")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_loan_posting_e2e() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    let customer_id = create_customer(&app, "5000.00", true, false).await;
    let loan = create_loan(&app, &[customer_id], false).await;
    let loan_id = loan["loan_id"].as_str().unwrap();

    assert_eq!(decimal_field(&loan, "loan_balance"), dec!(1000));
    assert_eq!(loan["next_payment_date"].as_str().unwrap(), "2024-02-01");
    assert_eq!(decimal_field(&loan, "emi"), dec!(88.85));

    // February 2024 has 29 days: interest = 1000 * 0.12 * 29 / 365 = 9.53
    let (status, posted) = send(
        &app,
        "POST",
        "/transactions",
        Some(json!({
            "loan_id": loan_id,
            "transaction_amount": "100.00"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "posting failed: {posted}");
    assert_eq!(decimal_field(&posted, "interest_amt"), dec!(9.53));
    assert_eq!(decimal_field(&posted, "principal_amt"), dec!(90.47));
    assert_eq!(decimal_field(&posted, "loan_balance"), dec!(909.53));
    assert_eq!(posted["next_payment_date"].as_str().unwrap(), "2024-03-01");
    assert_eq!(
        posted["debited_customer_id"].as_str().unwrap(),
        customer_id.to_string()
    );

    // Payment debited in full from the preferred-debit account
    let (status, customer) =
        send(&app, "GET", &format!("/customers/{customer_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal_field(&customer, "account_balance"), dec!(4900));

    // Loan detail carries the transaction history
    let (status, detail) = send(&app, "GET", &format!("/loans/{loan_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal_field(&detail, "loan_balance"), dec!(909.53));
    assert_eq!(detail["transactions"].as_array().unwrap().len(), 1);
    let interest = detail["interest_paid"].as_array().unwrap();
    assert_eq!(interest.len(), 1);
    assert_eq!(decimal_field(&interest[0], "interest_charged"), dec!(9.53));
}

#[tokio::test]
async fn test_posting_is_not_idempotent() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    let customer_id = create_customer(&app, "5000.00", true, false).await;
    let loan = create_loan(&app, &[customer_id], false).await;
    let loan_id = loan["loan_id"].as_str().unwrap();

    let payload = json!({
        "loan_id": loan_id,
        "transaction_amount": "100.00"
    });

    let (status, first) = send(&app, "POST", "/transactions", Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, second) = send(&app, "POST", "/transactions", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);

    // Same request twice means two distinct transactions and two debits
    assert_ne!(first["transaction_id"], second["transaction_id"]);
    assert_eq!(decimal_field(&first, "loan_balance"), dec!(909.53));

    // Second posting sees March 2024 (31 days): 909.53 * 0.12 * 31 / 365 = 9.27
    assert_eq!(decimal_field(&second, "interest_amt"), dec!(9.27));
    assert_eq!(decimal_field(&second, "loan_balance"), dec!(818.80));

    let (status, customer) =
        send(&app, "GET", &format!("/customers/{customer_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal_field(&customer, "account_balance"), dec!(4800));
}

#[tokio::test]
async fn test_offset_balance_reduces_interest() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    // Offset balance covers the whole loan, so no interest accrues
    let customer_id = create_customer(&app, "2000.00", true, true).await;
    let loan = create_loan(&app, &[customer_id], true).await;
    let loan_id = loan["loan_id"].as_str().unwrap();

    assert_eq!(decimal_field(&loan, "offset_amt"), dec!(2000));

    let (status, posted) = send(
        &app,
        "POST",
        "/transactions",
        Some(json!({
            "loan_id": loan_id,
            "transaction_amount": "100.00"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "posting failed: {posted}");
    assert_eq!(decimal_field(&posted, "interest_amt"), dec!(0));
    assert_eq!(decimal_field(&posted, "principal_amt"), dec!(100));
    assert_eq!(decimal_field(&posted, "loan_balance"), dec!(900));
}

#[tokio::test]
async fn test_posting_without_debit_account_fails() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    // Linked customer is not flagged preferred-debit
    let customer_id = create_customer(&app, "5000.00", false, false).await;
    let loan = create_loan(&app, &[customer_id], false).await;
    let loan_id = loan["loan_id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/transactions",
        Some(json!({
            "loan_id": loan_id,
            "transaction_amount": "100.00"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"].as_str().unwrap(), "no_debit_account");

    // Nothing was written
    let (_, detail) = send(&app, "GET", &format!("/loans/{loan_id}"), None).await;
    assert_eq!(decimal_field(&detail, "loan_balance"), dec!(1000));
    assert!(detail["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_overpayment_is_rejected() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    let customer_id = create_customer(&app, "5000.00", true, false).await;
    let loan = create_loan(&app, &[customer_id], false).await;
    let loan_id = loan["loan_id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/transactions",
        Some(json!({
            "loan_id": loan_id,
            "transaction_amount": "2000.00"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"].as_str().unwrap(), "balance_below_zero");
}

#[tokio::test]
async fn test_concurrent_postings_serialize() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    let customer_id = create_customer(&app, "5000.00", true, false).await;
    let loan = create_loan(&app, &[customer_id], false).await;
    let loan_id = loan["loan_id"].as_str().unwrap().to_string();

    let payload = json!({
        "loan_id": loan_id,
        "transaction_amount": "100.00"
    });

    let (first, second) = tokio::join!(
        send(&app, "POST", "/transactions", Some(payload.clone())),
        send(&app, "POST", "/transactions", Some(payload))
    );
    assert_eq!(first.0, StatusCode::CREATED, "first posting: {}", first.1);
    assert_eq!(second.0, StatusCode::CREATED, "second posting: {}", second.1);

    // Row locks force the two postings to serialize: one sees February,
    // the other March, and no update is lost
    let (status, detail) = send(&app, "GET", &format!("/loans/{loan_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal_field(&detail, "loan_balance"), dec!(818.80));
    assert_eq!(decimal_field(&detail, "total_interest_paid"), dec!(18.80));
    assert_eq!(detail["transactions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_order_lifecycle_and_stock() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    let (status, product) = send(
        &app,
        "POST",
        "/products",
        Some(json!({
            "name": "Widget",
            "price": "19.99",
            "stock": 5
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = product["id"].as_str().unwrap().to_string();

    let (status, order) = send(
        &app,
        "POST",
        "/orders",
        Some(json!({
            "items": [{ "product_id": product_id, "quantity": 2 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = order["id"].as_str().unwrap().to_string();
    assert_eq!(order["order_status"].as_str().unwrap(), "New");
    assert_eq!(decimal_field(&order, "total_price"), dec!(39.98));

    // Shipping decrements stock per order line
    let (status, shipped) = send(
        &app,
        "PATCH",
        &format!("/orders/{order_id}/status"),
        Some(json!({ "order_status": "Shipped" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "ship failed: {shipped}");
    assert_eq!(shipped["order_status"].as_str().unwrap(), "Shipped");

    let (_, product) = send(&app, "GET", &format!("/products/{product_id}"), None).await;
    assert_eq!(product["stock"].as_i64().unwrap(), 3);

    let (status, delivered) = send(
        &app,
        "PATCH",
        &format!("/orders/{order_id}/status"),
        Some(json!({ "order_status": "Delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(delivered["delivered_at"].is_string());
}

#[tokio::test]
async fn test_delivered_order_is_terminal() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    let (status, order) = send(&app, "POST", "/orders", Some(json!({
        "items": []
    })))
    .await;
    // Empty orders are invalid; build a real one
    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected: {order}");

    let (_, product) = send(
        &app,
        "POST",
        "/products",
        Some(json!({ "name": "Widget", "price": "5.00", "stock": 10 })),
    )
    .await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let (_, order) = send(
        &app,
        "POST",
        "/orders",
        Some(json!({ "items": [{ "product_id": product_id, "quantity": 1 }] })),
    )
    .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/orders/{order_id}/status"),
        Some(json!({ "order_status": "Delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Any further update, including re-delivery, is rejected
    for target in ["Shipped", "Delivered", "New"] {
        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/orders/{order_id}/status"),
            Some(json!({ "order_status": target })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{target}: {body}");
        assert_eq!(
            body["error_code"].as_str().unwrap(),
            "order_already_delivered"
        );
    }
}

#[tokio::test]
async fn test_pagination_envelope() {
    let Some(db) = common::try_setup_test_db().await else {
        return;
    };
    let app = test_app(db.pool.clone());

    for _ in 0..12 {
        create_customer(&app, "0", false, false).await;
    }

    let (status, page) = send(&app, "GET", "/customers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["results"].as_array().unwrap().len(), 10);
    assert_eq!(page["page"].as_i64().unwrap(), 1);
    assert_eq!(page["limit"].as_i64().unwrap(), 10);
    assert_eq!(page["total_pages"].as_i64().unwrap(), 2);
    assert_eq!(page["total_results"].as_i64().unwrap(), 12);

    let (status, page) = send(&app, "GET", "/customers?page=2&limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["results"].as_array().unwrap().len(), 2);
    assert_eq!(page["page"].as_i64().unwrap(), 2);
}
