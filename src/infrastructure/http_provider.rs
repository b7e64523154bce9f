//! HTTP adapter for panel-style fulfillment vendors.
//!
//! Every call is a form POST to the provider endpoint carrying `key` and
//! `action`. Vendors are loose with types: ids and counts arrive as numbers
//! or strings, so responses are read as `serde_json::Value` first.

use crate::domain::catalog::{Provider, RemoteService, StatusReport, SubmissionResult};
use crate::domain::ports::ProviderGateway;
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpProviderGateway {
    client: reqwest::Client,
}

impl HttpProviderGateway {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FulfillmentError::ProviderError(e.to_string()))?;
        Ok(Self { client })
    }

    async fn call(&self, provider: &Provider, params: &[(&str, &str)]) -> Result<Value> {
        let mut form = vec![("key", provider.credential.as_str())];
        form.extend_from_slice(params);

        let response = self
            .client
            .post(&provider.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FulfillmentError::ProviderError(format!("provider {} timed out", provider.id))
                } else {
                    FulfillmentError::ProviderError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FulfillmentError::ProviderError(format!(
                "provider {} answered HTTP {status}",
                provider.id
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| FulfillmentError::ProviderError(format!("unreadable response: {e}")))?;

        if let Some(error) = body.get("error") {
            return Err(FulfillmentError::ProviderError(text(error)));
        }
        Ok(body)
    }
}

/// String form of a scalar, without JSON quoting.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn count(value: Option<&Value>) -> Option<i64> {
    value.and_then(decimal).and_then(|d| d.trunc().to_i64())
}

fn remote_service(entry: &Value) -> Option<RemoteService> {
    Some(RemoteService {
        service: entry.get("service").map(text)?,
        name: entry.get("name").map(text)?,
        rate: entry.get("rate").and_then(decimal)?,
        min: count(entry.get("min")).and_then(|n| u32::try_from(n).ok())?,
        max: count(entry.get("max")).and_then(|n| u32::try_from(n).ok())?,
        category: entry.get("category").map(text),
    })
}

#[async_trait]
impl ProviderGateway for HttpProviderGateway {
    async fn submit_order(
        &self,
        provider: &Provider,
        service_ref: &str,
        link: &str,
        quantity: u32,
    ) -> SubmissionResult {
        let quantity = quantity.to_string();
        let params = [
            ("action", "add"),
            ("service", service_ref),
            ("link", link),
            ("quantity", quantity.as_str()),
        ];
        match self.call(provider, &params).await {
            Ok(body) => match body.get("order").filter(|id| !id.is_null()) {
                Some(id) => SubmissionResult::Accepted {
                    provider_order_id: text(id),
                    payload: body.clone(),
                },
                None => SubmissionResult::Rejected {
                    reason: format!("provider returned no order id: {body}"),
                },
            },
            Err(e) => {
                warn!(provider_id = %provider.id, error = %e, "Order submission failed");
                SubmissionResult::Rejected {
                    reason: match e {
                        FulfillmentError::ProviderError(reason) => reason,
                        other => other.to_string(),
                    },
                }
            }
        }
    }

    async fn fetch_status(
        &self,
        provider: &Provider,
        provider_order_id: &str,
    ) -> Result<StatusReport> {
        let body = self
            .call(provider, &[("action", "status"), ("order", provider_order_id)])
            .await?;
        let status = body
            .get("status")
            .map(text)
            .ok_or_else(|| FulfillmentError::ProviderError(format!("no status in {body}")))?;

        Ok(StatusReport {
            status,
            start_count: count(body.get("start_count")),
            remains: count(body.get("remains")),
            payload: body,
        })
    }

    async fn sync_catalog(&self, provider: &Provider) -> Result<Vec<RemoteService>> {
        let body = self.call(provider, &[("action", "services")]).await?;
        let Value::Array(entries) = body else {
            return Err(FulfillmentError::ProviderError(
                "service list is not an array".into(),
            ));
        };

        let services: Vec<RemoteService> = entries.iter().filter_map(remote_service).collect();
        if services.len() < entries.len() {
            debug!(
                provider_id = %provider.id,
                skipped = entries.len() - services.len(),
                "Skipped malformed catalog entries"
            );
        }
        Ok(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_counts_accept_numbers_and_strings() {
        assert_eq!(count(Some(&json!(150))), Some(150));
        assert_eq!(count(Some(&json!("150"))), Some(150));
        assert_eq!(count(Some(&json!("12.00"))), Some(12));
        assert_eq!(count(Some(&json!(null))), None);
        assert_eq!(count(None), None);
    }

    #[test]
    fn test_remote_service_parsing() {
        let entry = json!({
            "service": 1, "name": "Followers", "rate": "0.90",
            "min": "50", "max": 10000, "category": "Instagram"
        });
        let service = remote_service(&entry).unwrap();
        assert_eq!(service.service, "1");
        assert_eq!(service.rate, dec!(0.90));
        assert_eq!(service.min, 50);
        assert_eq!(service.max, 10000);

        assert!(remote_service(&json!({"service": 2, "name": "x"})).is_none());
    }
}
