use super::catalog::{ProviderId, ServiceId};
use super::money::Amount;
use super::wallet::OwnerId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type OrderId = Uuid;

/// Canonical order state. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Partial,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Whether the state machine has an edge `self -> next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Partial)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (Partial, Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Partial => "partial",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vendor status vocabulary, mapped onto [`OrderStatus`].
///
/// The table is closed: anything not listed yields `None` and the caller
/// must hold the order unchanged.
pub fn map_provider_status(vendor: &str) -> Option<OrderStatus> {
    match vendor.trim() {
        "Pending" => Some(OrderStatus::Pending),
        "In progress" => Some(OrderStatus::InProgress),
        "Processing" => Some(OrderStatus::InProgress),
        "Completed" => Some(OrderStatus::Completed),
        "Partial" => Some(OrderStatus::Partial),
        "Canceled" | "Cancelled" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: OrderId,
    pub owner_id: OwnerId,
    pub service_id: ServiceId,
    pub provider_id: ProviderId,
    /// The provider's own id for the service, sent on submission.
    pub provider_service_ref: String,
    pub link: String,
    pub quantity: u32,
    pub price_per_1000: Decimal,
    /// Fixed at creation.
    pub charge: Amount,
    pub status: OrderStatus,
    pub provider_order_id: Option<String>,
    pub start_count: Option<i64>,
    pub remains: Option<i64>,
    /// Why the provider rejected the submission, once cancelled.
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Set once the reserved charge has been settled or refunded. An order
    /// out of `Pending` with this still false has its money side pending.
    #[serde(default)]
    pub hold_released: bool,
    #[serde(skip)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record of one observed order transition.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct OrderUpdate {
    pub id: Uuid,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub start_count: Option<i64>,
    pub remains: Option<i64>,
    pub provider_payload: Option<serde_json::Value>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderUpdate {
    pub fn new(order: &Order) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            status: order.status,
            start_count: order.start_count,
            remains: order.remains,
            provider_payload: None,
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.provider_payload = Some(payload);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
