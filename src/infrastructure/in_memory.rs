use crate::domain::catalog::{Provider, ProviderId, Service, ServiceId};
use crate::domain::order::{Order, OrderId, OrderStatus, OrderUpdate};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{
    CatalogStore, OrderPage, OrderStore, OrderUpdateStore, PaymentStore, Repositories,
    TransactionStore, WalletStore,
};
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::domain::wallet::{OwnerId, Wallet};
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for wallets.
///
/// Compare-and-swap is done under the write lock, which makes every ledger
/// write on a wallet linearizable.
#[derive(Default, Clone)]
pub struct InMemoryWalletStore {
    wallets: Arc<RwLock<HashMap<OwnerId, Wallet>>>,
}

impl InMemoryWalletStore {
    /// Creates a new, empty in-memory wallet store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn insert(&self, wallet: Wallet) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        if wallets.contains_key(&wallet.owner_id) {
            return Err(FulfillmentError::Conflict(format!(
                "wallet already exists for {}",
                wallet.owner_id
            )));
        }
        wallets.insert(wallet.owner_id.clone(), wallet);
        Ok(())
    }

    async fn get_by_owner(&self, owner_id: &str) -> Result<Option<Wallet>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.get(owner_id).cloned())
    }

    async fn compare_and_swap(&self, wallet: &Wallet) -> Result<bool> {
        let mut wallets = self.wallets.write().await;
        match wallets.get_mut(&wallet.owner_id) {
            Some(stored) if stored.version == wallet.version => {
                *stored = wallet.clone();
                stored.version += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(FulfillmentError::not_found(format!(
                "wallet for {}",
                wallet.owner_id
            ))),
        }
    }
}

/// A thread-safe in-memory store for orders and their audit trail.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    updates: Arc<RwLock<Vec<OrderUpdate>>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_in_flight(order: &Order) -> bool {
    matches!(order.status, OrderStatus::InProgress | OrderStatus::Partial)
        && order.provider_order_id.is_some()
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).cloned())
    }

    async fn compare_and_swap(&self, order: &Order) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(stored) if stored.version == order.version => {
                *stored = order.clone();
                stored.version += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(FulfillmentError::not_found(format!("order {}", order.id))),
        }
    }

    async fn delete(&self, id: OrderId) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.remove(&id);
        Ok(())
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
        status: Option<OrderStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<OrderPage> {
        let orders = self.orders.read().await;
        let mut matching: Vec<&Order> = orders
            .values()
            .filter(|o| o.owner_id == owner_id)
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len();
        let orders = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(OrderPage { orders, total })
    }

    async fn in_flight(&self, provider_id: &str) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut batch: Vec<Order> = orders
            .values()
            .filter(|o| o.provider_id == provider_id && is_in_flight(o))
            .cloned()
            .collect();
        batch.sort_by_key(|o| o.created_at);
        Ok(batch)
    }

    async fn providers_with_in_flight(&self) -> Result<Vec<ProviderId>> {
        let orders = self.orders.read().await;
        let providers: BTreeSet<ProviderId> = orders
            .values()
            .filter(|o| is_in_flight(o))
            .map(|o| o.provider_id.clone())
            .collect();
        Ok(providers.into_iter().collect())
    }
}

#[async_trait]
impl OrderUpdateStore for InMemoryOrderStore {
    async fn append(&self, update: OrderUpdate) -> Result<()> {
        let mut updates = self.updates.write().await;
        updates.push(update);
        Ok(())
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<OrderUpdate>> {
        let updates = self.updates.read().await;
        Ok(updates
            .iter()
            .filter(|u| u.order_id == order_id)
            .cloned()
            .collect())
    }
}

/// A thread-safe in-memory store for transactions.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(tx.id, tx);
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn delete(&self, id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.remove(&id);
        Ok(())
    }

    async fn finalize(&self, id: TransactionId, status: TransactionStatus) -> Result<bool> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&id) {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                tx.status = status;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(FulfillmentError::not_found(format!("transaction {id}"))),
        }
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut owned: Vec<Transaction> = transactions
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by_key(|t| t.created_at);
        Ok(owned)
    }
}

/// A thread-safe in-memory store for payments, keyed by processor id.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<String, Payment>>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory payment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.provider_payment_id) {
            return Err(FulfillmentError::Conflict(format!(
                "payment {} already recorded",
                payment.provider_payment_id
            )));
        }
        payments.insert(payment.provider_payment_id.clone(), payment);
        Ok(())
    }

    async fn get_by_provider_id(&self, provider_payment_id: &str) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(provider_payment_id).cloned())
    }

    async fn transition(
        &self,
        provider_payment_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(provider_payment_id) {
            Some(payment) if payment.status == from => {
                payment.status = to;
                payment.completed_at = at;
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// A thread-safe in-memory store for providers and their services,
/// seeded at start-up.
#[derive(Default, Clone)]
pub struct InMemoryCatalogStore {
    providers: Arc<RwLock<HashMap<ProviderId, Provider>>>,
    services: Arc<RwLock<HashMap<ServiceId, Service>>>,
}

impl InMemoryCatalogStore {
    /// Creates a new, empty in-memory catalog store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get_service(&self, id: &str) -> Result<Option<Service>> {
        let services = self.services.read().await;
        Ok(services.get(id).cloned())
    }

    async fn get_provider(&self, id: &str) -> Result<Option<Provider>> {
        let providers = self.providers.read().await;
        Ok(providers.get(id).cloned())
    }

    async fn list_providers(&self) -> Result<Vec<Provider>> {
        let providers = self.providers.read().await;
        let mut all: Vec<Provider> = providers.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn upsert_provider(&self, provider: Provider) -> Result<()> {
        let mut providers = self.providers.write().await;
        providers.insert(provider.id.clone(), provider);
        Ok(())
    }

    async fn upsert_service(&self, service: Service) -> Result<()> {
        let mut services = self.services.write().await;
        services.insert(service.id.clone(), service);
        Ok(())
    }

    async fn record_sync(&self, provider_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut providers = self.providers.write().await;
        let provider = providers
            .get_mut(provider_id)
            .ok_or_else(|| FulfillmentError::not_found(format!("provider {provider_id}")))?;
        provider.last_sync = Some(at);
        Ok(())
    }
}

/// Builds a [`Repositories`] bundle backed entirely by memory.
pub fn in_memory_repositories() -> Repositories {
    let orders = InMemoryOrderStore::new();
    Repositories {
        wallets: Arc::new(InMemoryWalletStore::new()),
        orders: Arc::new(orders.clone()),
        order_updates: Arc::new(orders),
        transactions: Arc::new(InMemoryTransactionStore::new()),
        payments: Arc::new(InMemoryPaymentStore::new()),
        catalog: Arc::new(InMemoryCatalogStore::new()),
    }
}
