use super::ledger::Ledger;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::Repositories;
use crate::domain::transaction::TransactionStatus;
use crate::error::{FulfillmentError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{error, info, warn};

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const EVENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_FAILED: &str = "payment_intent.payment_failed";

/// Checks a `t=<unix>,v1=<hex>` signature header: HMAC-SHA256 over
/// `"<t>.<payload>"`, compared in constant time, with `t` no further than
/// `tolerance` from `now`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.trim().strip_prefix("v1=") {
            signatures.push(v);
        }
    }
    if timestamp.is_empty() || signatures.is_empty() {
        return Err(FulfillmentError::WebhookSignatureError(
            "malformed signature header".into(),
        ));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| FulfillmentError::WebhookSignatureError("invalid timestamp".into()))?;
    if (now.timestamp() - ts).unsigned_abs() > tolerance.as_secs() {
        return Err(FulfillmentError::WebhookSignatureError(
            "timestamp outside tolerance".into(),
        ));
    }

    let verified = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        signer(secret, timestamp, payload)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });
    if verified {
        Ok(())
    } else {
        Err(FulfillmentError::WebhookSignatureError(
            "signature mismatch".into(),
        ))
    }
}

/// Builds the header value a processor would send for `payload` at `timestamp`.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let ts = timestamp.to_string();
    let mac = signer(secret, &ts, payload)?;
    Ok(format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes())))
}

fn signer(secret: &str, timestamp: &str, payload: &[u8]) -> Result<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| FulfillmentError::WebhookSignatureError(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Debug, Deserialize)]
struct EventObject {
    id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// Payment already left `pending`; redelivery.
    Duplicate,
    /// Unknown event type or payment id.
    Ignored,
}

/// Applies verified payment-processor events to payments, transactions
/// and wallets.
#[derive(Clone)]
pub struct WebhookHandler {
    repos: Repositories,
    ledger: Ledger,
    secret: String,
    tolerance: Duration,
}

impl WebhookHandler {
    pub fn new(repos: Repositories, ledger: Ledger, secret: String, tolerance: Duration) -> Self {
        Self {
            repos,
            ledger,
            secret,
            tolerance,
        }
    }

    pub async fn handle(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let header = signature.ok_or_else(|| {
            FulfillmentError::WebhookSignatureError("missing signature header".into())
        })?;
        verify_signature(body, header, &self.secret, self.tolerance, Utc::now())?;

        let event: Event = serde_json::from_slice(body)
            .map_err(|e| FulfillmentError::ValidationError(format!("invalid event: {e}")))?;
        info!(event_id = ?event.id, event_type = %event.kind, "Payment event received");

        match event.kind.as_str() {
            EVENT_SUCCEEDED => self.on_succeeded(&event.data.object.id).await,
            EVENT_FAILED => self.on_failed(&event.data.object.id).await,
            _ => Ok(WebhookOutcome::Ignored),
        }
    }

    async fn on_succeeded(&self, provider_payment_id: &str) -> Result<WebhookOutcome> {
        let payments = &self.repos.payments;
        let Some(existing) = payments.get_by_provider_id(provider_payment_id).await? else {
            warn!(provider_payment_id, "Payment event for unknown payment, acknowledged");
            return Ok(WebhookOutcome::Ignored);
        };
        if existing.status != PaymentStatus::Pending {
            self.finalize_deposit(&existing).await?;
            return Ok(WebhookOutcome::Duplicate);
        }

        // Only the delivery that wins this transition credits the wallet.
        let Some(payment) = payments
            .transition(
                provider_payment_id,
                PaymentStatus::Pending,
                PaymentStatus::Completed,
                Some(Utc::now()),
            )
            .await?
        else {
            return Ok(WebhookOutcome::Duplicate);
        };

        if let Err(e) = self.ledger.credit(&payment.owner_id, payment.amount).await {
            error!(provider_payment_id, error = %e, "Credit failed, reopening payment for redelivery");
            if let Err(revert) = payments
                .transition(
                    provider_payment_id,
                    PaymentStatus::Completed,
                    PaymentStatus::Pending,
                    None,
                )
                .await
            {
                error!(provider_payment_id, error = %revert, "Could not reopen payment");
            }
            return Err(e);
        }

        // The credit stands. A failed finalize is returned so the processor
        // redelivers, and the duplicate path finishes it.
        self.finalize_deposit(&payment).await?;

        info!(
            provider_payment_id,
            owner_id = %payment.owner_id,
            amount = %payment.amount,
            "Deposit credited"
        );
        Ok(WebhookOutcome::Applied)
    }

    async fn on_failed(&self, provider_payment_id: &str) -> Result<WebhookOutcome> {
        let payments = &self.repos.payments;
        let Some(existing) = payments.get_by_provider_id(provider_payment_id).await? else {
            warn!(provider_payment_id, "Payment event for unknown payment, acknowledged");
            return Ok(WebhookOutcome::Ignored);
        };
        if existing.status != PaymentStatus::Pending {
            self.finalize_deposit(&existing).await?;
            return Ok(WebhookOutcome::Duplicate);
        }
        let Some(payment) = payments
            .transition(
                provider_payment_id,
                PaymentStatus::Pending,
                PaymentStatus::Failed,
                None,
            )
            .await?
        else {
            return Ok(WebhookOutcome::Duplicate);
        };

        self.finalize_deposit(&payment).await?;
        info!(provider_payment_id, owner_id = %payment.owner_id, "Deposit failed");
        Ok(WebhookOutcome::Applied)
    }

    /// Moves the deposit transaction to the payment's final status. Only a
    /// pending transaction changes, so redeliveries can call this again.
    async fn finalize_deposit(&self, payment: &Payment) -> Result<()> {
        let status = match payment.status {
            PaymentStatus::Completed => TransactionStatus::Completed,
            PaymentStatus::Failed => TransactionStatus::Failed,
            PaymentStatus::Pending => return Ok(()),
        };
        let changed = self
            .repos
            .transactions
            .finalize(payment.transaction_id, status)
            .await
            .inspect_err(|e| {
                error!(
                    transaction_id = %payment.transaction_id,
                    error = %e,
                    "Could not finalize deposit transaction"
                )
            })?;
        if changed {
            info!(transaction_id = %payment.transaction_id, ?status, "Deposit transaction finalized");
        }
        Ok(())
    }
}
