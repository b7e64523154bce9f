use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use orderflow::domain::catalog::{Provider, SubmissionResult};
use orderflow::domain::ports::ProviderGateway;
use orderflow::error::FulfillmentError;
use orderflow::infrastructure::http_provider::HttpProviderGateway;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

/// Minimal panel API: form POST with `key` and `action`.
async fn panel(Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("key").map(String::as_str) != Some("k") {
        return Json(json!({ "error": "Invalid API key" })).into_response();
    }
    match form.get("action").map(String::as_str) {
        Some("add") => match form.get("service").map(String::as_str) {
            Some("bad") => Json(json!({ "error": "Incorrect service ID" })).into_response(),
            Some("boom") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            Some("slow") => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({ "order": 1 })).into_response()
            }
            _ => Json(json!({ "order": 23501 })).into_response(),
        },
        Some("status") => match form.get("order").map(String::as_str) {
            Some("23501") => Json(json!({
                "charge": "0.27819",
                "start_count": "3572",
                "status": "In progress",
                "remains": "157",
                "currency": "USD"
            }))
            .into_response(),
            _ => Json(json!({ "error": "Incorrect order ID" })).into_response(),
        },
        Some("services") => Json(json!([
            { "service": 1, "name": "Followers", "type": "Default", "category": "First Category",
              "rate": "0.90", "min": "50", "max": "10000" },
            { "service": 2, "name": "Broken entry" }
        ]))
        .into_response(),
        _ => Json(json!({ "error": "Unknown action" })).into_response(),
    }
}

async fn spawn_panel() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().route("/api/v2", post(panel)))
            .await
            .unwrap();
    });
    format!("http://{addr}/api/v2")
}

fn provider(endpoint: &str, key: &str) -> Provider {
    Provider {
        id: "panel".into(),
        name: "Panel".into(),
        endpoint: endpoint.into(),
        credential: key.into(),
        last_sync: None,
    }
}

fn gateway() -> HttpProviderGateway {
    HttpProviderGateway::new(Duration::from_millis(500)).unwrap()
}

#[tokio::test]
async fn test_submit_accepted() {
    let endpoint = spawn_panel().await;
    let result = gateway()
        .submit_order(&provider(&endpoint, "k"), "101", "https://x.com/a", 1000)
        .await;
    match result {
        SubmissionResult::Accepted {
            provider_order_id,
            payload,
        } => {
            assert_eq!(provider_order_id, "23501");
            assert_eq!(payload["order"], 23501);
        }
        other => panic!("expected acceptance, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submit_failures_share_one_shape() {
    let endpoint = spawn_panel().await;
    let gateway = gateway();
    let panel = provider(&endpoint, "k");

    let vendor_error = gateway.submit_order(&panel, "bad", "l", 10).await;
    assert_eq!(
        vendor_error,
        SubmissionResult::Rejected {
            reason: "Incorrect service ID".into()
        }
    );

    let http_error = gateway.submit_order(&panel, "boom", "l", 10).await;
    assert!(matches!(http_error, SubmissionResult::Rejected { .. }));

    let timeout = gateway.submit_order(&panel, "slow", "l", 10).await;
    match timeout {
        SubmissionResult::Rejected { reason } => assert!(reason.contains("timed out")),
        other => panic!("expected rejection, got {other:?}"),
    }

    let bad_key = gateway
        .submit_order(&provider(&endpoint, "nope"), "101", "l", 10)
        .await;
    assert_eq!(
        bad_key,
        SubmissionResult::Rejected {
            reason: "Invalid API key".into()
        }
    );
}

#[tokio::test]
async fn test_unreachable_provider_is_rejected() {
    let result = gateway()
        .submit_order(&provider("http://127.0.0.1:9/api/v2", "k"), "101", "l", 10)
        .await;
    assert!(matches!(result, SubmissionResult::Rejected { .. }));
}

#[tokio::test]
async fn test_fetch_status_parses_string_counts() {
    let endpoint = spawn_panel().await;
    let report = gateway()
        .fetch_status(&provider(&endpoint, "k"), "23501")
        .await
        .unwrap();
    assert_eq!(report.status, "In progress");
    assert_eq!(report.start_count, Some(3572));
    assert_eq!(report.remains, Some(157));
    assert_eq!(report.payload["charge"], "0.27819");
}

#[tokio::test]
async fn test_fetch_status_error_is_provider_error() {
    let endpoint = spawn_panel().await;
    let result = gateway()
        .fetch_status(&provider(&endpoint, "k"), "999")
        .await;
    assert_eq!(
        result.unwrap_err(),
        FulfillmentError::ProviderError("Incorrect order ID".into())
    );
}

#[tokio::test]
async fn test_sync_catalog_skips_malformed_entries() {
    let endpoint = spawn_panel().await;
    let services = gateway()
        .sync_catalog(&provider(&endpoint, "k"))
        .await
        .unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].service, "1");
    assert_eq!(services[0].rate, dec!(0.90));
    assert_eq!(services[0].category.as_deref(), Some("First Category"));
}
