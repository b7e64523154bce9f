use super::AppState;
use crate::application::deposits::{DepositReceipt, DepositRequest};
use crate::application::orders::{ListOrders, OrderListing, PlaceOrder};
use crate::application::webhook::SIGNATURE_HEADER;
use crate::domain::notification::{Notification, Template};
use crate::error::{FulfillmentError, Result};
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

pub const OWNER_HEADER: &str = "x-owner-id";

/// The authenticated account owner of a request.
pub struct Owner(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = FulfillmentError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|owner| !owner.is_empty())
            .map(|owner| Owner(owner.to_string()))
            .ok_or(FulfillmentError::Unauthorized)
    }
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn place_order(
    State(state): State<AppState>,
    Owner(owner): Owner,
    payload: std::result::Result<Json<PlaceOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let Json(request) = payload?;
    let order = state.orders.place_order(&owner, request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "order": order }))))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Owner(owner): Owner,
    query: std::result::Result<Query<ListOrders>, QueryRejection>,
) -> Result<Json<OrderListing>> {
    let Query(query) = query?;
    Ok(Json(state.orders.list_orders(&owner, query).await?))
}

pub async fn start_deposit(
    State(state): State<AppState>,
    Owner(owner): Owner,
    payload: std::result::Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<DepositReceipt>> {
    let Json(request) = payload?;
    Ok(Json(state.deposits.start_deposit(&owner, request).await?))
}

/// Always answers 400 on failure: the processor redelivers on any non-2xx.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    match state.webhooks.handle(&body, signature).await {
        Ok(_) => Json(json!({ "received": true })).into_response(),
        Err(e) => {
            warn!(error = %e, "Payment webhook rejected");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<Value>> {
    let wallet = state.ledger.wallet(&owner).await?;
    Ok(Json(json!({ "wallet": wallet })))
}

#[derive(Debug, Deserialize)]
pub struct OpenWallet {
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

pub async fn open_wallet(
    State(state): State<AppState>,
    Owner(owner): Owner,
    query: std::result::Result<Query<OpenWallet>, QueryRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let Query(OpenWallet { currency }) = query?;
    match state.ledger.wallet(&owner).await {
        Ok(wallet) => Ok((StatusCode::OK, Json(json!({ "wallet": wallet })))),
        Err(FulfillmentError::NotFound(_)) => {
            let wallet = state.ledger.open_wallet(&owner, &currency.to_uppercase()).await?;
            state
                .notifier
                .notify(Notification::new(&owner, Template::Welcome).with("name", &owner))
                .await;
            Ok((StatusCode::CREATED, Json(json!({ "wallet": wallet }))))
        }
        Err(e) => Err(e),
    }
}
