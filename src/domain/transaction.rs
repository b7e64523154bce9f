use super::wallet::OwnerId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TransactionId = Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Order,
    Refund,
    Deposit,
}

/// `Pending` moves to `Completed` or `Failed` exactly once.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// One monetary event on a wallet.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner_id: OwnerId,
    pub wallet_id: Uuid,
    pub r#type: TransactionType,
    /// Signed: debits are negative.
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub description: String,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        owner_id: impl Into<OwnerId>,
        wallet_id: Uuid,
        r#type: TransactionType,
        amount: Decimal,
        status: TransactionStatus,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            wallet_id,
            r#type,
            amount,
            currency: "USD".to_string(),
            status,
            description: description.into(),
            reference_id: None,
            reference_type: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_reference(mut self, id: impl Into<String>, kind: impl Into<String>) -> Self {
        self.reference_id = Some(id.into());
        self.reference_type = Some(kind.into());
        self
    }
}
