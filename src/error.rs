use rust_decimal::Decimal;
use thiserror::Error;

/// Failure taxonomy shared by every layer of the fulfillment pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FulfillmentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Persistence error: {0}")]
    PersistenceError(String),
    #[error("Webhook signature error: {0}")]
    WebhookSignatureError(String),
    /// Optimistic write lost the race too many times.
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    #[error("Queue error: {0}")]
    QueueError(String),
}

impl FulfillmentError {
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceError(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type Result<T> = std::result::Result<T, FulfillmentError>;
