//! Stripe payment intents via the REST API (no SDK dependency).

use crate::domain::money::Amount;
use crate::domain::payment::PaymentIntent;
use crate::domain::ports::PaymentProcessor;
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use serde_json::Value;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

pub struct StripeProcessor {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeProcessor {
    /// `api_base` is normally [`STRIPE_API_BASE`]; tests point it at a mock.
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
            api_base: api_base.into(),
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn create_intent(
        &self,
        owner_id: &str,
        amount: Amount,
        currency: &str,
    ) -> Result<PaymentIntent> {
        let minor_units = amount.minor_units().to_string();
        let currency = currency.to_lowercase();
        let resp: Value = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("amount", minor_units.as_str()),
                ("currency", currency.as_str()),
                ("metadata[owner_id]", owner_id),
                ("automatic_payment_methods[enabled]", "true"),
            ])
            .send()
            .await
            .map_err(|e| FulfillmentError::ProviderError(format!("stripe: {e}")))?
            .json()
            .await
            .map_err(|e| FulfillmentError::ProviderError(format!("stripe: {e}")))?;

        let Some(id) = resp["id"].as_str() else {
            let message = resp["error"]["message"].as_str().unwrap_or("unexpected response");
            return Err(FulfillmentError::ProviderError(format!(
                "stripe create_intent failed: {message}"
            )));
        };
        Ok(PaymentIntent {
            provider_payment_id: id.to_string(),
            client_secret: resp["client_secret"].as_str().map(String::from),
        })
    }
}
