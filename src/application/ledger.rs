use crate::domain::money::Amount;
use crate::domain::ports::WalletStoreRef;
use crate::domain::wallet::{LedgerOp, Wallet};
use crate::error::{FulfillmentError, Result};
use tracing::{debug, warn};

/// How many times a ledger write is re-read and re-applied after losing a
/// version race before giving up.
const MAX_CAS_ATTEMPTS: u32 = 64;

/// Atomic balance primitives over per-owner wallets.
///
/// Each operation reads the wallet, applies the domain operation and writes
/// it back with a compare-and-swap on the wallet version, so concurrent
/// callers on one wallet are serialized without holding a lock across awaits.
#[derive(Clone)]
pub struct Ledger {
    wallets: WalletStoreRef,
}

impl Ledger {
    pub fn new(wallets: WalletStoreRef) -> Self {
        Self { wallets }
    }

    pub async fn wallet(&self, owner_id: &str) -> Result<Wallet> {
        self.wallets
            .get_by_owner(owner_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("wallet"))
    }

    /// Returns the owner's wallet, creating an empty one if needed.
    pub async fn open_wallet(&self, owner_id: &str, currency: &str) -> Result<Wallet> {
        if let Some(wallet) = self.wallets.get_by_owner(owner_id).await? {
            return Ok(wallet);
        }
        match self.wallets.insert(Wallet::new(owner_id, currency)).await {
            Ok(()) | Err(FulfillmentError::Conflict(_)) => self.wallet(owner_id).await,
            Err(e) => Err(e),
        }
    }

    pub async fn reserve(&self, owner_id: &str, amount: Amount) -> Result<Wallet> {
        self.apply(owner_id, LedgerOp::Reserve, amount).await
    }

    pub async fn release(&self, owner_id: &str, amount: Amount) -> Result<Wallet> {
        self.apply(owner_id, LedgerOp::Release, amount).await
    }

    pub async fn settle(&self, owner_id: &str, amount: Amount) -> Result<Wallet> {
        self.apply(owner_id, LedgerOp::Settle, amount).await
    }

    pub async fn refund(&self, owner_id: &str, amount: Amount) -> Result<Wallet> {
        self.apply(owner_id, LedgerOp::Refund, amount).await
    }

    pub async fn credit(&self, owner_id: &str, amount: Amount) -> Result<Wallet> {
        self.apply(owner_id, LedgerOp::Credit, amount).await
    }

    pub async fn apply(&self, owner_id: &str, op: LedgerOp, amount: Amount) -> Result<Wallet> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut wallet = self.wallet(owner_id).await?;
            wallet.apply(op, amount)?;

            if self.wallets.compare_and_swap(&wallet).await? {
                wallet.version += 1;
                debug!(
                    owner_id,
                    op = op.as_str(),
                    %amount,
                    balance = %wallet.balance,
                    frozen = %wallet.frozen_balance,
                    "Ledger operation applied"
                );
                return Ok(wallet);
            }
            debug!(owner_id, op = op.as_str(), attempt, "Wallet version conflict, retrying");
            tokio::task::yield_now().await;
        }

        warn!(owner_id, op = op.as_str(), "Ledger operation gave up after version conflicts");
        Err(FulfillmentError::Conflict(format!(
            "wallet of {owner_id} kept changing during {}",
            op.as_str()
        )))
    }
}
