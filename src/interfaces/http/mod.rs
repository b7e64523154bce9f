//! JSON-over-HTTP surface of the pipeline.
//!
//! Authentication happens upstream; the identity layer forwards the
//! authenticated owner in the [`OWNER_HEADER`] header.

mod error;
mod handlers;

use crate::application::deposits::DepositService;
use crate::application::ledger::Ledger;
use crate::application::notifications::NotificationDispatcher;
use crate::application::orders::OrderService;
use crate::application::webhook::WebhookHandler;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

pub use handlers::{OWNER_HEADER, Owner};

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub deposits: DepositService,
    pub webhooks: WebhookHandler,
    pub ledger: Ledger,
    pub notifier: NotificationDispatcher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/orders",
            post(handlers::place_order).get(handlers::list_orders),
        )
        .route("/deposits", post(handlers::start_deposit))
        .route("/webhooks/payment", post(handlers::payment_webhook))
        .route(
            "/wallet",
            get(handlers::get_wallet).post(handlers::open_wallet),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
