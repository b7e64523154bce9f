//! Periodic re-polling of in-flight orders and provider catalogs.
//!
//! The [`Reconciler`] only enqueues `providerSync` jobs; the
//! [`ProviderSyncHandler`] does the actual vendor calls on the worker pool.
//! Nothing on this path moves money: a failed poll is simply picked up again
//! on the next tick.

use super::orders::{OrderService, StatusSync};
use crate::domain::catalog::Provider;
use crate::domain::job::{Job, JobOutcome, JobPayload};
use crate::domain::ports::{CatalogStoreRef, JobQueueRef, OrderStoreRef, ProviderGatewayRef};
use crate::error::Result;
use crate::infrastructure::queue::JobHandler;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub status_every: Duration,
    pub catalog_every: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            status_every: Duration::from_secs(60),
            catalog_every: Duration::from_secs(3600),
        }
    }
}

pub struct Reconciler {
    orders: OrderStoreRef,
    catalog: CatalogStoreRef,
    queue: JobQueueRef,
    schedule: Schedule,
}

impl Reconciler {
    pub fn new(
        orders: OrderStoreRef,
        catalog: CatalogStoreRef,
        queue: JobQueueRef,
        schedule: Schedule,
    ) -> Self {
        Self {
            orders,
            catalog,
            queue,
            schedule,
        }
    }

    /// Enqueues one `checkStatus` job per provider that has in-flight
    /// orders. Returns how many jobs were enqueued.
    pub async fn tick(&self) -> Result<usize> {
        let providers = self.orders.providers_with_in_flight().await?;
        for provider_id in &providers {
            self.queue
                .enqueue(JobPayload::CheckStatus {
                    provider_id: provider_id.clone(),
                })
                .await?;
        }
        debug!(providers = providers.len(), "Status reconciliation scheduled");
        Ok(providers.len())
    }

    /// Enqueues one `syncServices` job per configured provider.
    pub async fn refresh_catalogs(&self) -> Result<usize> {
        let providers = self.catalog.list_providers().await?;
        for provider in &providers {
            self.queue
                .enqueue(JobPayload::SyncServices {
                    provider_id: provider.id.clone(),
                })
                .await?;
        }
        debug!(providers = providers.len(), "Catalog refresh scheduled");
        Ok(providers.len())
    }

    /// Drives both cadences until `shutdown` fires. Both fire once right
    /// away, then on their intervals.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut status = tokio::time::interval(self.schedule.status_every);
        status.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut catalog = tokio::time::interval(self.schedule.catalog_every);
        catalog.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            status_every = ?self.schedule.status_every,
            catalog_every = ?self.schedule.catalog_every,
            "Reconciler started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = status.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Status reconciliation tick failed");
                    }
                }
                _ = catalog.tick() => {
                    if let Err(e) = self.refresh_catalogs().await {
                        warn!(error = %e, "Catalog refresh tick failed");
                    }
                }
            }
        }
        info!("Reconciler stopped");
    }
}

/// Consumes the `providerSync` queue.
pub struct ProviderSyncHandler {
    orders: OrderService,
    order_store: OrderStoreRef,
    catalog: CatalogStoreRef,
    gateway: ProviderGatewayRef,
}

impl ProviderSyncHandler {
    pub fn new(
        orders: OrderService,
        order_store: OrderStoreRef,
        catalog: CatalogStoreRef,
        gateway: ProviderGatewayRef,
    ) -> Self {
        Self {
            orders,
            order_store,
            catalog,
            gateway,
        }
    }

    async fn provider(&self, provider_id: &str) -> std::result::Result<Provider, JobOutcome> {
        match self.catalog.get_provider(provider_id).await {
            Ok(Some(provider)) => Ok(provider),
            Ok(None) => Err(JobOutcome::Failed(format!("unknown provider {provider_id}"))),
            Err(e) => Err(JobOutcome::Retry(e.to_string())),
        }
    }

    async fn check_status(&self, provider_id: &str) -> JobOutcome {
        let provider = match self.provider(provider_id).await {
            Ok(provider) => provider,
            Err(outcome) => return outcome,
        };
        let batch = match self.order_store.in_flight(provider_id).await {
            Ok(batch) => batch,
            Err(e) => return JobOutcome::Retry(e.to_string()),
        };

        let (mut applied, mut skipped) = (0usize, 0usize);
        for order in &batch {
            let Some(provider_order_id) = order.provider_order_id.as_deref() else {
                continue;
            };
            let report = match self.gateway.fetch_status(&provider, provider_order_id).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(order_id = %order.id, provider_id, error = %e, "Status fetch failed, retrying next cycle");
                    skipped += 1;
                    continue;
                }
            };
            match self.orders.update_status(order.id, &report).await {
                Ok(StatusSync::Applied(_)) => applied += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "Status update failed, retrying next cycle");
                    skipped += 1;
                }
            }
        }

        info!(provider_id, checked = batch.len(), applied, skipped, "Status check finished");
        JobOutcome::Done
    }

    async fn sync_services(&self, provider_id: &str) -> JobOutcome {
        let provider = match self.provider(provider_id).await {
            Ok(provider) => provider,
            Err(outcome) => return outcome,
        };
        let services = match self.gateway.sync_catalog(&provider).await {
            Ok(services) => services,
            Err(e) => return JobOutcome::Retry(e.to_string()),
        };
        if let Err(e) = self.catalog.record_sync(provider_id, Utc::now()).await {
            return JobOutcome::Retry(e.to_string());
        }
        info!(provider_id, services = services.len(), "Provider catalog synced");
        JobOutcome::Done
    }
}

#[async_trait]
impl JobHandler for ProviderSyncHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        match &job.payload {
            JobPayload::CheckStatus { provider_id } => self.check_status(provider_id).await,
            JobPayload::SyncServices { provider_id } => self.sync_services(provider_id).await,
            other => {
                JobOutcome::Failed(format!("unexpected payload on providerSync queue: {other:?}"))
            }
        }
    }

    async fn on_dead_letter(&self, job: &Job, reason: &str) {
        warn!(job_id = %job.id, payload = ?job.payload, reason, "Provider sync abandoned until next cycle");
    }
}
