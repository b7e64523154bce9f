//! Process wiring: tracing set-up and construction of every long-lived
//! handle. Components receive their queue and store handles from here
//! instead of reaching for globals.

use crate::application::deposits::DepositService;
use crate::application::fulfillment::FulfillmentHandler;
use crate::application::ledger::Ledger;
use crate::application::notifications::{NotificationDispatcher, NotificationHandler};
use crate::application::orders::OrderService;
use crate::application::reconciliation::{ProviderSyncHandler, Reconciler, Schedule};
use crate::application::webhook::WebhookHandler;
use crate::domain::job::{QueueName, QueuePolicy};
use crate::domain::ports::{
    JobQueueRef, MailerRef, PaymentProcessorRef, ProviderGatewayRef, Repositories,
};
use crate::error::{FulfillmentError, Result};
use crate::infrastructure::queue::{InProcessQueue, JobHandler, QueueReceivers, WorkerPool};
use crate::interfaces::http::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("ORDERFLOW_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Services and queue handles of one running pipeline.
pub struct Pipeline {
    pub repos: Repositories,
    pub ledger: Ledger,
    pub queue: InProcessQueue,
    pub orders: OrderService,
    pub state: AppState,
    receivers: QueueReceivers,
}

impl Pipeline {
    pub fn new(
        repos: Repositories,
        processor: PaymentProcessorRef,
        webhook_secret: String,
        webhook_tolerance: Duration,
    ) -> Self {
        let (queue, receivers) = InProcessQueue::new();
        let queue_ref: JobQueueRef = Arc::new(queue.clone());
        let ledger = Ledger::new(repos.wallets.clone());
        let notifier = NotificationDispatcher::new(queue_ref.clone());
        let orders = OrderService::new(
            repos.clone(),
            ledger.clone(),
            queue_ref,
            notifier.clone(),
        );
        let state = AppState {
            orders: orders.clone(),
            deposits: DepositService::new(repos.clone(), ledger.clone(), processor),
            webhooks: WebhookHandler::new(
                repos.clone(),
                ledger.clone(),
                webhook_secret,
                webhook_tolerance,
            ),
            ledger: ledger.clone(),
            notifier,
        };

        Self {
            repos,
            ledger,
            queue,
            orders,
            state,
            receivers,
        }
    }

    pub fn spawn_workers(
        &mut self,
        gateway: ProviderGatewayRef,
        mailer: MailerRef,
        shutdown: &CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>> {
        self.spawn_workers_with(gateway, mailer, shutdown, QueuePolicy::for_queue)
    }

    /// Starts one worker pool per queue, with `policy` deciding each pool's
    /// concurrency and retry budget.
    pub fn spawn_workers_with(
        &mut self,
        gateway: ProviderGatewayRef,
        mailer: MailerRef,
        shutdown: &CancellationToken,
        policy: impl Fn(QueueName) -> QueuePolicy,
    ) -> Result<Vec<JoinHandle<()>>> {
        let mut pools = Vec::with_capacity(QueueName::ALL.len());
        for queue in QueueName::ALL {
            let handler: Arc<dyn JobHandler> = match queue {
                QueueName::Fulfillment => Arc::new(FulfillmentHandler::new(
                    self.orders.clone(),
                    self.repos.catalog.clone(),
                    gateway.clone(),
                )),
                QueueName::ProviderSync => Arc::new(ProviderSyncHandler::new(
                    self.orders.clone(),
                    self.repos.orders.clone(),
                    self.repos.catalog.clone(),
                    gateway.clone(),
                )),
                QueueName::Notification => Arc::new(NotificationHandler::new(mailer.clone())),
            };
            let receiver = self.receivers.take(queue).ok_or_else(|| {
                FulfillmentError::QueueError(format!("workers for {queue} already started"))
            })?;
            let pool = WorkerPool::new(queue, policy(queue), handler, self.queue.clone());
            pools.push(pool.spawn(receiver, shutdown.clone()));
        }
        Ok(pools)
    }

    pub fn reconciler(&self, schedule: Schedule) -> Reconciler {
        Reconciler::new(
            self.repos.orders.clone(),
            self.repos.catalog.clone(),
            Arc::new(self.queue.clone()),
            schedule,
        )
    }
}
