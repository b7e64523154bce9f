use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type ProviderId = String;
pub type ServiceId = String;

/// An external fulfillment vendor.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub endpoint: String,
    pub credential: String,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

/// A sellable service, fulfilled by one provider.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Service {
    pub id: ServiceId,
    pub provider_id: ProviderId,
    pub provider_service_ref: String,
    pub name: String,
    pub min_quantity: u32,
    pub max_quantity: u32,
    pub price_per_1000: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Service {
    pub fn accepts_quantity(&self, quantity: u32) -> bool {
        (self.min_quantity..=self.max_quantity).contains(&quantity)
    }
}

/// One entry of a provider's remote catalog.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct RemoteService {
    pub service: String,
    pub name: String,
    pub rate: Decimal,
    pub min: u32,
    pub max: u32,
    #[serde(default)]
    pub category: Option<String>,
}

/// Normalized answer to an order submission. Timeouts, HTTP failures and
/// vendor-reported errors all land in `Rejected`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionResult {
    Accepted {
        provider_order_id: String,
        payload: serde_json::Value,
    },
    Rejected {
        reason: String,
    },
}

/// A provider's view of one order.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: String,
    pub start_count: Option<i64>,
    pub remains: Option<i64>,
    pub payload: serde_json::Value,
}
