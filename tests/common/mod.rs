#![allow(dead_code)]

use async_trait::async_trait;
use orderflow::application::ledger::Ledger;
use orderflow::application::notifications::NotificationDispatcher;
use orderflow::application::orders::{OrderService, PlaceOrder};
use chrono::{DateTime, Utc};
use orderflow::domain::catalog::{
    Provider, RemoteService, Service, StatusReport, SubmissionResult,
};
use orderflow::domain::job::JobPayload;
use orderflow::domain::money::Amount;
use orderflow::domain::order::{OrderId, OrderUpdate};
use orderflow::domain::payment::PaymentIntent;
use orderflow::domain::ports::{
    CatalogStore, CatalogStoreRef, JobQueue, Mailer, OrderUpdateStore, OrderUpdateStoreRef,
    PaymentProcessor, ProviderGateway, Repositories, TransactionStore, TransactionStoreRef,
    WalletStore, WalletStoreRef,
};
use orderflow::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use orderflow::domain::wallet::Wallet;
use orderflow::error::{FulfillmentError, Result};
use orderflow::infrastructure::in_memory::in_memory_repositories;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const OWNER: &str = "user-1";
pub const PROVIDER: &str = "panel-1";
pub const SERVICE: &str = "followers";

pub fn provider() -> Provider {
    Provider {
        id: PROVIDER.to_string(),
        name: "Panel One".to_string(),
        endpoint: "http://127.0.0.1:9/api/v2".to_string(),
        credential: "secret-key".to_string(),
        last_sync: None,
    }
}

/// 2.50 per 1000, quantity 10..=100000.
pub fn service() -> Service {
    Service {
        id: SERVICE.to_string(),
        provider_id: PROVIDER.to_string(),
        provider_service_ref: "101".to_string(),
        name: "Instagram Followers".to_string(),
        min_quantity: 10,
        max_quantity: 100_000,
        price_per_1000: dec!(2.50),
        is_active: true,
    }
}

pub fn order_request(quantity: u32) -> PlaceOrder {
    PlaceOrder {
        service_id: SERVICE.to_string(),
        link: "https://instagram.com/someone".to_string(),
        quantity,
    }
}

pub fn report(status: &str) -> StatusReport {
    StatusReport {
        status: status.to_string(),
        start_count: Some(120),
        remains: Some(0),
        payload: json!({ "status": status, "start_count": "120", "remains": "0" }),
    }
}

/// Catalog seeded with [`provider`] and [`service`], and a wallet for
/// [`OWNER`] holding `balance`.
pub async fn seeded_repositories(balance: Decimal) -> (Repositories, Ledger) {
    let repos = in_memory_repositories();
    repos.catalog.upsert_provider(provider()).await.unwrap();
    repos.catalog.upsert_service(service()).await.unwrap();
    let ledger = Ledger::new(repos.wallets.clone());
    ledger.open_wallet(OWNER, "USD").await.unwrap();
    if balance > Decimal::ZERO {
        ledger
            .credit(OWNER, Amount::new(balance).unwrap())
            .await
            .unwrap();
    }
    (repos, ledger)
}

pub struct Fixture {
    pub repos: Repositories,
    pub ledger: Ledger,
    pub queue: Arc<RecordingQueue>,
    pub orders: OrderService,
}

pub async fn fixture(balance: Decimal) -> Fixture {
    fixture_with_queue(balance, Arc::new(RecordingQueue::default())).await
}

pub async fn fixture_with_queue(balance: Decimal, queue: Arc<RecordingQueue>) -> Fixture {
    let (repos, _) = seeded_repositories(balance).await;
    fixture_over(repos, queue)
}

/// Services wired over `repos`, for tests that swap in a failing store.
pub fn fixture_over(repos: Repositories, queue: Arc<RecordingQueue>) -> Fixture {
    let ledger = Ledger::new(repos.wallets.clone());
    let orders = OrderService::new(
        repos.clone(),
        ledger.clone(),
        queue.clone(),
        NotificationDispatcher::new(queue.clone()),
    );
    Fixture {
        repos,
        ledger,
        queue,
        orders,
    }
}

/// Keeps every enqueued payload; can be switched to reject fulfillment jobs.
#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<JobPayload>>,
    pub reject_fulfillment: bool,
}

impl RecordingQueue {
    pub fn rejecting_fulfillment() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            reject_fulfillment: true,
        }
    }

    pub fn payloads(&self) -> Vec<JobPayload> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<JobPayload> {
        self.payloads()
            .into_iter()
            .filter(|p| matches!(p, JobPayload::Notification(_)))
            .collect()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, payload: JobPayload) -> Result<Uuid> {
        if self.reject_fulfillment && matches!(payload, JobPayload::Fulfillment { .. }) {
            return Err(FulfillmentError::QueueError("broker unavailable".into()));
        }
        self.jobs.lock().unwrap().push(payload);
        Ok(Uuid::new_v4())
    }
}

/// Gateway with canned answers per call type.
#[derive(Default)]
pub struct ScriptedGateway {
    /// Popped per submission; `Accepted` with a fresh id when empty.
    pub submissions: Mutex<VecDeque<SubmissionResult>>,
    /// Keyed by provider order id; missing ids fail to fetch.
    pub statuses: Mutex<HashMap<String, StatusReport>>,
    pub catalog: Mutex<Vec<RemoteService>>,
    pub fail_catalog: bool,
    pub submit_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn rejecting(reason: &str) -> Self {
        let gateway = Self::default();
        gateway
            .submissions
            .lock()
            .unwrap()
            .push_back(SubmissionResult::Rejected {
                reason: reason.to_string(),
            });
        gateway
    }

    pub fn set_status(&self, provider_order_id: &str, report: StatusReport) {
        self.statuses
            .lock()
            .unwrap()
            .insert(provider_order_id.to_string(), report);
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    async fn submit_order(
        &self,
        _provider: &Provider,
        _service_ref: &str,
        _link: &str,
        _quantity: u32,
    ) -> SubmissionResult {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.submissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SubmissionResult::Accepted {
                provider_order_id: format!("remote-{n}"),
                payload: json!({ "order": n }),
            })
    }

    async fn fetch_status(
        &self,
        _provider: &Provider,
        provider_order_id: &str,
    ) -> Result<StatusReport> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .get(provider_order_id)
            .cloned()
            .ok_or_else(|| FulfillmentError::ProviderError("connection reset".into()))
    }

    async fn sync_catalog(&self, _provider: &Provider) -> Result<Vec<RemoteService>> {
        if self.fail_catalog {
            return Err(FulfillmentError::ProviderError("timed out".into()));
        }
        Ok(self.catalog.lock().unwrap().clone())
    }
}

/// Hands out sequential `pi_test_<n>` intents.
#[derive(Default)]
pub struct FakeProcessor {
    issued: AtomicUsize,
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn create_intent(
        &self,
        _owner_id: &str,
        _amount: Amount,
        _currency: &str,
    ) -> Result<PaymentIntent> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentIntent {
            provider_payment_id: format!("pi_test_{n}"),
            client_secret: Some(format!("pi_test_{n}_secret")),
        })
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Polls `check` every 10ms until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}

/// Counts down failures: `true` while any remain, `false` after that.
#[derive(Default)]
pub struct Failures(AtomicUsize);

impl Failures {
    pub fn arm(&self, n: usize) {
        self.0.store(n, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn store_down() -> FulfillmentError {
    FulfillmentError::PersistenceError("connection refused".into())
}

/// Wallet store whose `compare_and_swap` fails while armed.
pub struct FlakyWallets {
    pub inner: WalletStoreRef,
    pub failures: Failures,
}

impl FlakyWallets {
    pub fn over(inner: WalletStoreRef) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: Failures::default(),
        })
    }
}

#[async_trait]
impl WalletStore for FlakyWallets {
    async fn insert(&self, wallet: Wallet) -> Result<()> {
        self.inner.insert(wallet).await
    }

    async fn get_by_owner(&self, owner_id: &str) -> Result<Option<Wallet>> {
        self.inner.get_by_owner(owner_id).await
    }

    async fn compare_and_swap(&self, wallet: &Wallet) -> Result<bool> {
        if self.failures.take() {
            return Err(store_down());
        }
        self.inner.compare_and_swap(wallet).await
    }
}

/// Audit store whose `append` fails while armed.
pub struct FlakyOrderUpdates {
    pub inner: OrderUpdateStoreRef,
    pub failures: Failures,
}

impl FlakyOrderUpdates {
    pub fn over(inner: OrderUpdateStoreRef) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: Failures::default(),
        })
    }
}

#[async_trait]
impl OrderUpdateStore for FlakyOrderUpdates {
    async fn append(&self, update: OrderUpdate) -> Result<()> {
        if self.failures.take() {
            return Err(store_down());
        }
        self.inner.append(update).await
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<OrderUpdate>> {
        self.inner.list_for_order(order_id).await
    }
}

/// Transaction store whose `finalize` fails while armed.
pub struct FlakyTransactions {
    pub inner: TransactionStoreRef,
    pub failures: Failures,
}

impl FlakyTransactions {
    pub fn over(inner: TransactionStoreRef) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: Failures::default(),
        })
    }
}

#[async_trait]
impl TransactionStore for FlakyTransactions {
    async fn insert(&self, tx: Transaction) -> Result<()> {
        self.inner.insert(tx).await
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: TransactionId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn finalize(&self, id: TransactionId, status: TransactionStatus) -> Result<bool> {
        if self.failures.take() {
            return Err(store_down());
        }
        self.inner.finalize(id, status).await
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Transaction>> {
        self.inner.list_for_owner(owner_id).await
    }
}

/// Catalog whose provider lookups always fail.
pub struct UnreachableProviders {
    pub inner: CatalogStoreRef,
}

#[async_trait]
impl CatalogStore for UnreachableProviders {
    async fn get_service(&self, id: &str) -> Result<Option<Service>> {
        self.inner.get_service(id).await
    }

    async fn get_provider(&self, _id: &str) -> Result<Option<Provider>> {
        Err(store_down())
    }

    async fn list_providers(&self) -> Result<Vec<Provider>> {
        self.inner.list_providers().await
    }

    async fn upsert_provider(&self, provider: Provider) -> Result<()> {
        self.inner.upsert_provider(provider).await
    }

    async fn upsert_service(&self, service: Service) -> Result<()> {
        self.inner.upsert_service(service).await
    }

    async fn record_sync(&self, provider_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.inner.record_sync(provider_id, at).await
    }
}
