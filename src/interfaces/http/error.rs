use crate::error::FulfillmentError;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

impl FulfillmentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FulfillmentError::ValidationError(_)
            | FulfillmentError::InsufficientFunds { .. }
            | FulfillmentError::WebhookSignatureError(_) => StatusCode::BAD_REQUEST,
            FulfillmentError::Unauthorized => StatusCode::UNAUTHORIZED,
            FulfillmentError::NotFound(_) => StatusCode::NOT_FOUND,
            // Exhausted version races surface as a server error.
            FulfillmentError::Conflict(_)
            | FulfillmentError::ProviderError(_)
            | FulfillmentError::PersistenceError(_)
            | FulfillmentError::QueueError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FulfillmentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            FulfillmentError::InsufficientFunds {
                required,
                available,
            } => json!({
                "error": "Insufficient balance",
                "required": required,
                "available": available,
            }),
            _ if status.is_server_error() => {
                error!(error = %self, "Request failed");
                json!({ "error": "Internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for FulfillmentError {
    fn from(rejection: JsonRejection) -> Self {
        FulfillmentError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for FulfillmentError {
    fn from(rejection: QueryRejection) -> Self {
        FulfillmentError::ValidationError(rejection.body_text())
    }
}
