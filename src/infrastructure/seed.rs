//! Start-up data for the in-memory store: providers, services and opening
//! wallet balances, read from a JSON file.

use crate::application::ledger::Ledger;
use crate::domain::catalog::{Provider, Service};
use crate::domain::money::Amount;
use crate::domain::ports::CatalogStoreRef;
use crate::domain::wallet::OwnerId;
use crate::error::{FulfillmentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub wallets: Vec<SeedWallet>,
}

#[derive(Debug, Deserialize)]
pub struct SeedWallet {
    pub owner_id: OwnerId,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub balance: Decimal,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Seed {
    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            FulfillmentError::persistence(format!("cannot read seed {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            FulfillmentError::ValidationError(format!("invalid seed {}: {e}", path.display()))
        })
    }

    pub async fn apply(self, catalog: &CatalogStoreRef, ledger: &Ledger) -> Result<()> {
        let counts = (self.providers.len(), self.services.len(), self.wallets.len());
        for provider in self.providers {
            catalog.upsert_provider(provider).await?;
        }
        for service in self.services {
            if catalog.get_provider(&service.provider_id).await?.is_none() {
                return Err(FulfillmentError::ValidationError(format!(
                    "service {} references unknown provider {}",
                    service.id, service.provider_id
                )));
            }
            catalog.upsert_service(service).await?;
        }
        for wallet in self.wallets {
            ledger.open_wallet(&wallet.owner_id, &wallet.currency).await?;
            if wallet.balance > Decimal::ZERO {
                ledger
                    .credit(&wallet.owner_id, Amount::new(wallet.balance)?)
                    .await?;
            }
        }
        info!(
            providers = counts.0,
            services = counts.1,
            wallets = counts.2,
            "Seed data loaded"
        );
        Ok(())
    }
}
