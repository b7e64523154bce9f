use super::ledger::Ledger;
use crate::domain::money::Amount;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{PaymentProcessorRef, Repositories};
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus, TransactionType};
use crate::error::{FulfillmentError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

pub const MIN_DEPOSIT: Decimal = dec!(5);
pub const MAX_DEPOSIT: Decimal = dec!(10000);

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub payment_method: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositReceipt {
    pub transaction_id: TransactionId,
    pub payment_id: Uuid,
    pub client_secret: Option<String>,
    pub amount: Amount,
    pub currency: String,
    pub status: PaymentStatus,
}

/// Starts deposits: the wallet is only credited later, by the webhook.
#[derive(Clone)]
pub struct DepositService {
    repos: Repositories,
    ledger: Ledger,
    processor: PaymentProcessorRef,
}

impl DepositService {
    pub fn new(repos: Repositories, ledger: Ledger, processor: PaymentProcessorRef) -> Self {
        Self {
            repos,
            ledger,
            processor,
        }
    }

    pub async fn start_deposit(
        &self,
        owner_id: &str,
        request: DepositRequest,
    ) -> Result<DepositReceipt> {
        if !(MIN_DEPOSIT..=MAX_DEPOSIT).contains(&request.amount) {
            return Err(FulfillmentError::ValidationError(format!(
                "amount must be between {MIN_DEPOSIT} and {MAX_DEPOSIT}"
            )));
        }
        if request.payment_method != self.processor.name() {
            return Err(FulfillmentError::ValidationError(format!(
                "unsupported payment method {}",
                request.payment_method
            )));
        }
        let amount = Amount::new(request.amount)?;
        let currency = request.currency.to_uppercase();
        let wallet = self.ledger.open_wallet(owner_id, &currency).await?;

        let intent = self
            .processor
            .create_intent(owner_id, amount, &currency)
            .await?;

        let tx = Transaction::new(
            owner_id,
            wallet.id,
            TransactionType::Deposit,
            amount.value(),
            TransactionStatus::Pending,
            format!("Deposit via {}", self.processor.name()),
        )
        .with_currency(currency.clone())
        .with_reference(intent.provider_payment_id.clone(), "payment");
        let transaction_id = tx.id;
        self.repos.transactions.insert(tx).await?;

        let payment = Payment {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            transaction_id,
            provider: self.processor.name().to_string(),
            provider_payment_id: intent.provider_payment_id.clone(),
            amount,
            currency: currency.clone(),
            status: PaymentStatus::Pending,
            metadata: serde_json::json!({ "payment_intent_id": intent.provider_payment_id }),
            created_at: Utc::now(),
            completed_at: None,
        };
        let payment_id = payment.id;
        if let Err(e) = self.repos.payments.insert(payment).await {
            if let Err(cleanup) = self.repos.transactions.delete(transaction_id).await {
                error!(%transaction_id, error = %cleanup, "Could not delete orphaned deposit transaction");
            }
            return Err(e);
        }

        info!(owner_id, %amount, %currency, provider_payment_id = %intent.provider_payment_id, "Deposit started");
        Ok(DepositReceipt {
            transaction_id,
            payment_id,
            client_secret: intent.client_secret,
            amount,
            currency,
            status: PaymentStatus::Pending,
        })
    }
}
