use super::money::Amount;
use super::transaction::TransactionId;
use super::wallet::OwnerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// A deposit attempt tracked against the payment processor.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub transaction_id: TransactionId,
    pub provider: String,
    /// Id assigned by the processor; webhook events are keyed on it.
    pub provider_payment_id: String,
    pub amount: Amount,
    pub currency: String,
    pub status: PaymentStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of asking the processor to start collecting a deposit.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub provider_payment_id: String,
    pub client_secret: Option<String>,
}
