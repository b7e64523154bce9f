use super::orders::OrderService;
use crate::domain::catalog::SubmissionResult;
use crate::domain::job::{Job, JobOutcome, JobPayload};
use crate::domain::order::{OrderId, OrderStatus};
use crate::domain::ports::{CatalogStoreRef, ProviderGatewayRef};
use crate::error::FulfillmentError;
use crate::infrastructure::queue::JobHandler;
use async_trait::async_trait;
use tracing::{error, info, warn};

/// Consumes the `fulfillment` queue: submits pending orders to their
/// provider and resolves them with the answer.
pub struct FulfillmentHandler {
    orders: OrderService,
    catalog: CatalogStoreRef,
    gateway: ProviderGatewayRef,
}

impl FulfillmentHandler {
    pub fn new(orders: OrderService, catalog: CatalogStoreRef, gateway: ProviderGatewayRef) -> Self {
        Self {
            orders,
            catalog,
            gateway,
        }
    }

    async fn fulfill(&self, order_id: OrderId) -> JobOutcome {
        let order = match self.orders.get(order_id).await {
            Ok(order) => order,
            Err(FulfillmentError::NotFound(_)) => {
                warn!(%order_id, "Fulfillment job for unknown order, dropping");
                return JobOutcome::Done;
            }
            Err(e) => return JobOutcome::Retry(e.to_string()),
        };
        // Redelivered job after the order was already resolved.
        if order.status != OrderStatus::Pending {
            if order.hold_released {
                return JobOutcome::Done;
            }
            return match self.orders.finish_outstanding_hold(order_id).await {
                Ok(_) => JobOutcome::Done,
                Err(e) => JobOutcome::Retry(e.to_string()),
            };
        }

        let result = match self.catalog.get_provider(&order.provider_id).await {
            Ok(Some(provider)) => {
                self.gateway
                    .submit_order(
                        &provider,
                        &order.provider_service_ref,
                        &order.link,
                        order.quantity,
                    )
                    .await
            }
            Ok(None) => SubmissionResult::Rejected {
                reason: format!("provider {} is not configured", order.provider_id),
            },
            Err(e) => return JobOutcome::Retry(e.to_string()),
        };

        let rejection = match &result {
            SubmissionResult::Rejected { reason } => Some(reason.clone()),
            SubmissionResult::Accepted { .. } => None,
        };
        if let Err(e) = self.orders.handle_submission_result(order_id, result).await {
            return JobOutcome::Retry(e.to_string());
        }
        match rejection {
            Some(reason) => JobOutcome::Failed(reason),
            None => JobOutcome::Done,
        }
    }
}

#[async_trait]
impl JobHandler for FulfillmentHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        match &job.payload {
            JobPayload::Fulfillment { order_id } => self.fulfill(*order_id).await,
            other => JobOutcome::Failed(format!("unexpected payload on fulfillment queue: {other:?}")),
        }
    }

    /// Makes sure an order whose job gave up never stays `PENDING` with
    /// funds on hold. A no-op when the order was already resolved.
    async fn on_dead_letter(&self, job: &Job, reason: &str) {
        let JobPayload::Fulfillment { order_id } = &job.payload else {
            return;
        };
        let result = SubmissionResult::Rejected {
            reason: reason.to_string(),
        };
        match self.orders.handle_submission_result(*order_id, result).await {
            Ok(Some(_)) => info!(%order_id, reason, "Order cancelled after fulfillment gave up"),
            Ok(None) => {}
            Err(e) => error!(
                %order_id,
                reason,
                error = %e,
                "Could not resolve order after fulfillment gave up"
            ),
        }
    }
}
