use super::catalog::{
    Provider, ProviderId, RemoteService, Service, StatusReport, SubmissionResult,
};
use super::job::JobPayload;
use super::money::Amount;
use super::order::{Order, OrderId, OrderStatus, OrderUpdate};
use super::payment::{Payment, PaymentIntent, PaymentStatus};
use super::transaction::{Transaction, TransactionId, TransactionStatus};
use super::wallet::Wallet;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Fails with `Conflict` if the owner already has a wallet.
    async fn insert(&self, wallet: Wallet) -> Result<()>;
    async fn get_by_owner(&self, owner_id: &str) -> Result<Option<Wallet>>;
    /// Persists `wallet` only if the stored version still equals
    /// `wallet.version`, bumping it on success. `Ok(false)` means another
    /// writer got there first.
    async fn compare_and_swap(&self, wallet: &Wallet) -> Result<bool>;
}

/// Page of an owner's orders plus the unpaged total.
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: usize,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<()>;
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
    /// Same contract as [`WalletStore::compare_and_swap`].
    async fn compare_and_swap(&self, order: &Order) -> Result<bool>;
    /// Only used to undo a placement whose job could not be enqueued.
    async fn delete(&self, id: OrderId) -> Result<()>;
    /// Newest first. `total` counts every match, ignoring the page.
    async fn list_for_owner(
        &self,
        owner_id: &str,
        status: Option<OrderStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<OrderPage>;
    /// Orders of `provider_id` in `IN_PROGRESS`/`PARTIAL` with a provider order id.
    async fn in_flight(&self, provider_id: &str) -> Result<Vec<Order>>;
    /// Distinct providers that have at least one in-flight order.
    async fn providers_with_in_flight(&self) -> Result<Vec<ProviderId>>;
}

/// Append-only audit trail of order status changes.
#[async_trait]
pub trait OrderUpdateStore: Send + Sync {
    async fn append(&self, update: OrderUpdate) -> Result<()>;
    /// Oldest first.
    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<OrderUpdate>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: Transaction) -> Result<()>;
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>>;
    /// Only used to clean up after a write that was rolled back.
    async fn delete(&self, id: TransactionId) -> Result<()>;
    /// Moves a pending transaction to `status`. `Ok(false)` if it was not pending.
    async fn finalize(&self, id: TransactionId, status: TransactionStatus) -> Result<bool>;
    /// Oldest first.
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<()>;
    async fn get_by_provider_id(&self, provider_payment_id: &str) -> Result<Option<Payment>>;
    /// Atomically moves a payment from `from` to `to`. Returns the updated
    /// payment, or `None` if it was not in `from` (or does not exist).
    async fn transition(
        &self,
        provider_payment_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Inactive services are returned too; callers decide what to do with them.
    async fn get_service(&self, id: &str) -> Result<Option<Service>>;
    async fn get_provider(&self, id: &str) -> Result<Option<Provider>>;
    async fn list_providers(&self) -> Result<Vec<Provider>>;
    async fn upsert_provider(&self, provider: Provider) -> Result<()>;
    async fn upsert_service(&self, service: Service) -> Result<()>;
    /// Stamps the provider's `last_sync`.
    async fn record_sync(&self, provider_id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Producer side of the job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, payload: JobPayload) -> Result<Uuid>;
}

/// One external fulfillment vendor API.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn submit_order(
        &self,
        provider: &Provider,
        service_ref: &str,
        link: &str,
        quantity: u32,
    ) -> SubmissionResult;
    /// A fetch error is never a submission failure.
    async fn fetch_status(&self, provider: &Provider, provider_order_id: &str)
    -> Result<StatusReport>;
    async fn sync_catalog(&self, provider: &Provider) -> Result<Vec<RemoteService>>;
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    fn name(&self) -> &str;
    async fn create_intent(
        &self,
        owner_id: &str,
        amount: Amount,
        currency: &str,
    ) -> Result<PaymentIntent>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

pub type WalletStoreRef = Arc<dyn WalletStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type OrderUpdateStoreRef = Arc<dyn OrderUpdateStore>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type CatalogStoreRef = Arc<dyn CatalogStore>;
pub type JobQueueRef = Arc<dyn JobQueue>;
pub type ProviderGatewayRef = Arc<dyn ProviderGateway>;
pub type PaymentProcessorRef = Arc<dyn PaymentProcessor>;
pub type MailerRef = Arc<dyn Mailer>;

/// Handles to every persisted entity, built once at start-up.
#[derive(Clone)]
pub struct Repositories {
    pub wallets: WalletStoreRef,
    pub orders: OrderStoreRef,
    pub order_updates: OrderUpdateStoreRef,
    pub transactions: TransactionStoreRef,
    pub payments: PaymentStoreRef,
    pub catalog: CatalogStoreRef,
}
