mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use common::{FakeProcessor, OWNER, seeded_repositories};
use orderflow::application::webhook::signature_header;
use orderflow::bootstrap::Pipeline;
use orderflow::interfaces::http::{OWNER_HEADER, router};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "whsec_api";

/// The pipeline owns the queue receivers and must outlive the router.
async fn app(balance: Decimal) -> (Router, Pipeline) {
    let (repos, _) = seeded_repositories(balance).await;
    let pipeline = Pipeline::new(
        repos,
        Arc::new(FakeProcessor::default()),
        SECRET.into(),
        Duration::from_secs(300),
    );
    (router(pipeline.state.clone()), pipeline)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, owner: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header(OWNER_HEADER, owner);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, owner: &str) -> Request<Body> {
    Request::get(uri)
        .header(OWNER_HEADER, owner)
        .body(Body::empty())
        .unwrap()
}

fn money(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

fn order_body(quantity: u32) -> Value {
    json!({ "service_id": "followers", "link": "https://instagram.com/x", "quantity": quantity })
}

#[tokio::test]
async fn test_missing_owner_is_unauthorized() {
    let (app, _pipeline) = app(Decimal::from(50)).await;
    let (status, body) = call(&app, post_json("/orders", None, order_body(1000))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn test_place_and_list_orders() {
    let (app, _pipeline) = app(Decimal::from(50)).await;

    let (status, body) = call(&app, post_json("/orders", Some(OWNER), order_body(1000))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["status"], "pending");
    assert_eq!(money(&body["order"]["charge"]), dec!(2.50));

    let (status, body) = call(&app, get("/orders?page=1&limit=10&status=pending", OWNER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orders"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"], json!({ "page": 1, "limit": 10, "total": 1, "pages": 1 }));

    let (status, _) = call(&app, get("/orders?status=bogus", OWNER)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_insufficient_funds_body() {
    let (app, _pipeline) = app(Decimal::from(5)).await;
    let (status, body) = call(&app, post_json("/orders", Some(OWNER), order_body(3000))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Insufficient balance");
    assert_eq!(money(&body["required"]), dec!(7.50));
    assert_eq!(money(&body["available"]), dec!(5));
}

#[tokio::test]
async fn test_order_errors_map_to_status_codes() {
    let (app, _pipeline) = app(Decimal::from(50)).await;

    let (status, _) = call(&app, post_json("/orders", Some(OWNER), order_body(1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = json!({ "service_id": "nope", "link": "l", "quantity": 100 });
    let (status, _) = call(&app, post_json("/orders", Some(OWNER), unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let malformed = json!({ "service_id": "followers" });
    let (status, body) = call(&app, post_json("/orders", Some(OWNER), malformed)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_deposit_then_signed_webhook_credits_wallet() {
    let (app, _pipeline) = app(Decimal::ZERO).await;

    let deposit = json!({ "amount": 20, "currency": "USD", "payment_method": "stripe" });
    let (status, receipt) = call(&app, post_json("/deposits", Some(OWNER), deposit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "pending");
    assert_eq!(receipt["client_secret"], "pi_test_1_secret");

    let event = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_test_1" } }
    })
    .to_string();
    let forged = Request::post("/webhooks/payment")
        .header("stripe-signature", "t=1,v1=00")
        .body(Body::from(event.clone()))
        .unwrap();
    let (status, _) = call(&app, forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let header = signature_header(event.as_bytes(), SECRET, Utc::now().timestamp()).unwrap();
    let signed = Request::post("/webhooks/payment")
        .header("stripe-signature", header)
        .body(Body::from(event))
        .unwrap();
    let (status, body) = call(&app, signed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    let (status, body) = call(&app, get("/wallet", OWNER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&body["wallet"]["balance"]), dec!(20));
}

#[tokio::test]
async fn test_deposit_out_of_range() {
    let (app, _pipeline) = app(Decimal::ZERO).await;
    let deposit = json!({ "amount": 2, "currency": "USD", "payment_method": "stripe" });
    let (status, _) = call(&app, post_json("/deposits", Some(OWNER), deposit)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wallet_open_and_get() {
    let (app, _pipeline) = app(Decimal::ZERO).await;

    let (status, _) = call(&app, get("/wallet", "newcomer")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let open = Request::post("/wallet?currency=eur")
        .header(OWNER_HEADER, "newcomer")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&app, open).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["wallet"]["currency"], "EUR");

    let again = Request::post("/wallet")
        .header(OWNER_HEADER, "newcomer")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, again).await;
    assert_eq!(status, StatusCode::OK);
}
