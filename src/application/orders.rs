use super::ledger::Ledger;
use super::notifications::NotificationDispatcher;
use crate::domain::catalog::{StatusReport, SubmissionResult};
use crate::domain::job::JobPayload;
use crate::domain::money::{Amount, order_charge};
use crate::domain::notification::{Notification, Template};
use crate::domain::order::{Order, OrderId, OrderStatus, OrderUpdate, map_provider_status};
use crate::domain::ports::{JobQueueRef, Repositories};
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus, TransactionType};
use crate::domain::wallet::{LedgerOp, Wallet};
use crate::error::{FulfillmentError, Result};
use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Bound on re-reads when an order write loses a version race.
const MAX_ORDER_CAS_ATTEMPTS: u32 = 8;

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrder {
    pub service_id: String,
    pub link: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrders {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderListing {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

/// What a status poll did to an order.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusSync {
    Applied(OrderStatus),
    /// Same canonical status as stored; nothing recorded.
    Unchanged,
    /// Order already completed or cancelled.
    Terminal,
    /// Vendor status maps to a state with no edge from the current one.
    Held(OrderStatus),
    /// Vendor status outside the mapping table.
    Unrecognized(String),
}

/// Owns the order state machine and coordinates ledger and queue around it.
#[derive(Clone)]
pub struct OrderService {
    repos: Repositories,
    ledger: Ledger,
    queue: JobQueueRef,
    notifier: NotificationDispatcher,
}

impl OrderService {
    pub fn new(
        repos: Repositories,
        ledger: Ledger,
        queue: JobQueueRef,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            repos,
            ledger,
            queue,
            notifier,
        }
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        self.repos
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found(format!("order {order_id}")))
    }

    /// Validates, reserves funds, records the order and queues it for
    /// fulfillment. Any failure after the reserve is compensated so no hold
    /// is left behind.
    pub async fn place_order(&self, owner_id: &str, request: PlaceOrder) -> Result<Order> {
        if request.link.trim().is_empty() {
            return Err(FulfillmentError::ValidationError("link is required".into()));
        }
        if request.quantity == 0 {
            return Err(FulfillmentError::ValidationError(
                "quantity must be positive".into(),
            ));
        }

        let service = self
            .repos
            .catalog
            .get_service(&request.service_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| FulfillmentError::not_found("service"))?;

        if !service.accepts_quantity(request.quantity) {
            return Err(FulfillmentError::ValidationError(format!(
                "Quantity must be between {} and {}",
                service.min_quantity, service.max_quantity
            )));
        }

        let charge = Amount::new(order_charge(request.quantity, service.price_per_1000))?;
        let wallet = self.ledger.wallet(owner_id).await?;
        self.ledger.reserve(owner_id, charge).await?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            service_id: service.id.clone(),
            provider_id: service.provider_id.clone(),
            provider_service_ref: service.provider_service_ref.clone(),
            link: request.link.trim().to_string(),
            quantity: request.quantity,
            price_per_1000: service.price_per_1000,
            charge,
            status: OrderStatus::Pending,
            provider_order_id: None,
            start_count: None,
            remains: None,
            failure_reason: None,
            hold_released: false,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.repos.orders.insert(order.clone()).await {
            self.rollback(&order, None).await;
            return Err(e);
        }

        let hold = Transaction::new(
            owner_id,
            wallet.id,
            TransactionType::Order,
            -charge.value(),
            TransactionStatus::Completed,
            format!("Order for {}", service.name),
        )
        .with_currency(wallet.currency.clone())
        .with_reference(order.id.to_string(), "order");
        let hold_id = hold.id;

        if let Err(e) = self.repos.transactions.insert(hold).await {
            self.rollback(&order, None).await;
            return Err(e);
        }

        if let Err(e) = self
            .queue
            .enqueue(JobPayload::Fulfillment { order_id: order.id })
            .await
        {
            self.rollback(&order, Some(hold_id)).await;
            return Err(e);
        }

        info!(
            order_id = %order.id,
            owner_id,
            service_id = %order.service_id,
            charge = %charge,
            "Order placed"
        );
        Ok(order)
    }

    /// Undoes a partially placed order in reverse order of creation.
    async fn rollback(&self, order: &Order, hold: Option<TransactionId>) {
        warn!(order_id = %order.id, "Rolling back order placement");
        if let Some(tx_id) = hold
            && let Err(e) = self.repos.transactions.delete(tx_id).await
        {
            error!(order_id = %order.id, %tx_id, error = %e, "Could not delete hold transaction");
        }
        if let Err(e) = self.repos.orders.delete(order.id).await {
            error!(order_id = %order.id, error = %e, "Could not delete order");
        }
        if let Err(e) = self.ledger.release(&order.owner_id, order.charge).await {
            error!(
                order_id = %order.id,
                owner_id = %order.owner_id,
                charge = %order.charge,
                error = %e,
                "Could not release hold, wallet needs manual reconciliation"
            );
        }
    }

    pub async fn list_orders(&self, owner_id: &str, query: ListOrders) -> Result<OrderListing> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        let result = self
            .repos
            .orders
            .list_for_owner(owner_id, query.status, (page - 1) * limit, limit)
            .await?;

        Ok(OrderListing {
            orders: result.orders,
            pagination: Pagination {
                page,
                limit,
                total: result.total,
                pages: result.total.div_ceil(limit),
            },
        })
    }

    /// Resolves a pending order with the provider's answer to its submission.
    ///
    /// The order transition is written first, then the money side. When an
    /// earlier delivery moved the order but never settled or refunded it,
    /// this call finishes that step instead. Returns `None` when there is
    /// nothing left to do, which makes repeated deliveries harmless.
    pub async fn handle_submission_result(
        &self,
        order_id: OrderId,
        result: SubmissionResult,
    ) -> Result<Option<Order>> {
        for _ in 0..MAX_ORDER_CAS_ATTEMPTS {
            let mut order = self.get(order_id).await?;
            if order.status != OrderStatus::Pending {
                if order.hold_released {
                    info!(%order_id, status = %order.status, "Submission result ignored, order already resolved");
                    return Ok(None);
                }
                warn!(%order_id, status = %order.status, "Resuming unfinished order resolution");
                return self.release_hold(order).await.map(Some);
            }

            order.updated_at = Utc::now();
            let update = match &result {
                SubmissionResult::Accepted {
                    provider_order_id,
                    payload,
                } => {
                    order.status = OrderStatus::InProgress;
                    order.provider_order_id = Some(provider_order_id.clone());
                    OrderUpdate::new(&order)
                        .with_payload(payload.clone())
                        .with_note("Order submitted to provider successfully")
                }
                SubmissionResult::Rejected { reason } => {
                    order.status = OrderStatus::Cancelled;
                    order.failure_reason = Some(reason.clone());
                    OrderUpdate::new(&order).with_note(format!("Order failed: {reason}"))
                }
            };
            if !self.repos.orders.compare_and_swap(&order).await? {
                continue;
            }
            order.version += 1;

            self.record_update(update).await;
            return self.release_hold(order).await.map(Some);
        }
        Err(FulfillmentError::Conflict(format!(
            "order {order_id} kept changing while resolving submission"
        )))
    }

    /// Finishes the money side of an order that left `Pending` without its
    /// hold being settled or refunded. `None` when nothing was outstanding.
    pub async fn finish_outstanding_hold(&self, order_id: OrderId) -> Result<Option<Order>> {
        let order = self.get(order_id).await?;
        if order.status == OrderStatus::Pending || order.hold_released {
            return Ok(None);
        }
        self.release_hold(order).await.map(Some)
    }

    /// Settles the hold of an accepted order or refunds a cancelled one, then
    /// marks the order so the ledger operation is not repeated.
    async fn release_hold(&self, order: Order) -> Result<Order> {
        let op = if order.status == OrderStatus::Cancelled {
            LedgerOp::Refund
        } else {
            LedgerOp::Settle
        };
        let wallet = self.ledger_with_retry(&order, op).await?;
        let order = (|| self.try_mark_hold_released(order.id))
            .retry(post_transition_backoff())
            .when(is_transient)
            .await
            .inspect_err(|e| {
                error!(
                    order_id = %order.id,
                    op = op.as_str(),
                    error = %e,
                    "Ledger updated but order not marked, a redelivery would repeat the operation"
                )
            })?;

        match op {
            LedgerOp::Refund => self.record_refund(&order, &wallet).await,
            _ => info!(
                order_id = %order.id,
                provider_order_id = order.provider_order_id.as_deref().unwrap_or_default(),
                charge = %order.charge,
                "Order accepted by provider, charge settled"
            ),
        }
        Ok(order)
    }

    async fn try_mark_hold_released(&self, order_id: OrderId) -> Result<Order> {
        for _ in 0..MAX_ORDER_CAS_ATTEMPTS {
            let mut order = self.get(order_id).await?;
            if order.hold_released {
                return Ok(order);
            }
            order.hold_released = true;
            order.updated_at = Utc::now();
            if self.repos.orders.compare_and_swap(&order).await? {
                order.version += 1;
                return Ok(order);
            }
        }
        Err(FulfillmentError::Conflict(format!(
            "order {order_id} kept changing while releasing its hold"
        )))
    }

    /// Writes the refund record and tells the owner. The money already moved,
    /// so failures here are logged instead of returned.
    async fn record_refund(&self, order: &Order, wallet: &Wallet) {
        let refund = Transaction::new(
            &order.owner_id,
            wallet.id,
            TransactionType::Refund,
            order.charge.value(),
            TransactionStatus::Completed,
            format!("Refund for failed order {}", order.id),
        )
        .with_currency(wallet.currency.clone())
        .with_reference(order.id.to_string(), "order");

        if let Err(e) = (|| self.repos.transactions.insert(refund.clone()))
            .retry(post_transition_backoff())
            .when(is_transient)
            .await
        {
            error!(order_id = %order.id, error = %e, "Refund applied but its transaction record was not written");
        }

        let reason = order
            .failure_reason
            .as_deref()
            .unwrap_or("rejected by provider");
        warn!(order_id = %order.id, reason, refunded = %order.charge, "Order cancelled and refunded");
        self.notifier
            .notify(
                Notification::new(&order.owner_id, Template::OrderFailed)
                    .with("order_id", order.id)
                    .with("reason", reason)
                    .with("refund_amount", order.charge),
            )
            .await;
    }

    /// Audit rows never block a transition that is already stored.
    async fn record_update(&self, update: OrderUpdate) {
        let order_id = update.order_id;
        if let Err(e) = (|| self.repos.order_updates.append(update.clone()))
            .retry(post_transition_backoff())
            .when(is_transient)
            .await
        {
            error!(%order_id, status = %update.status, error = %e, "Order update not recorded");
        }
    }

    /// Applies the money side of a resolved submission. The order transition
    /// already happened, so transient store failures are retried here rather
    /// than by re-running the job.
    async fn ledger_with_retry(&self, order: &Order, op: LedgerOp) -> Result<Wallet> {
        (|| self.ledger.apply(&order.owner_id, op, order.charge))
            .retry(post_transition_backoff())
            .when(is_transient)
            .await
            .inspect_err(|e| {
                error!(
                    order_id = %order.id,
                    op = op.as_str(),
                    error = %e,
                    "Ledger update failed after order transition, job will retry"
                )
            })
    }

    /// Applies one provider status observation to an in-flight order.
    pub async fn update_status(
        &self,
        order_id: OrderId,
        report: &StatusReport,
    ) -> Result<StatusSync> {
        let Some(target) = map_provider_status(&report.status) else {
            warn!(%order_id, vendor_status = %report.status, "Unrecognized provider status, order held");
            return Ok(StatusSync::Unrecognized(report.status.clone()));
        };

        for _ in 0..MAX_ORDER_CAS_ATTEMPTS {
            let mut order = self.get(order_id).await?;
            if order.status.is_terminal() {
                return Ok(StatusSync::Terminal);
            }
            if order.status == target {
                return Ok(StatusSync::Unchanged);
            }
            if !order.status.can_transition_to(target) {
                warn!(
                    %order_id,
                    from = %order.status,
                    to = %target,
                    vendor_status = %report.status,
                    "Provider status has no transition from current state, order held"
                );
                return Ok(StatusSync::Held(target));
            }

            order.status = target;
            order.start_count = report.start_count.or(order.start_count);
            order.remains = report.remains.or(order.remains);
            order.updated_at = Utc::now();
            if !self.repos.orders.compare_and_swap(&order).await? {
                continue;
            }

            self.record_update(OrderUpdate::new(&order).with_payload(report.payload.clone()))
                .await;
            info!(%order_id, status = %target, "Order status updated from provider");

            match target {
                OrderStatus::Completed => self.notify_completed(&order).await,
                OrderStatus::Partial | OrderStatus::Cancelled => warn!(
                    %order_id,
                    status = %target,
                    remains = ?order.remains,
                    "Provider did not fully deliver a settled order, review for refund"
                ),
                _ => {}
            }
            return Ok(StatusSync::Applied(target));
        }
        Err(FulfillmentError::Conflict(format!(
            "order {order_id} kept changing during status sync"
        )))
    }

    async fn notify_completed(&self, order: &Order) {
        let service = match self.repos.catalog.get_service(&order.service_id).await {
            Ok(Some(service)) => service.name,
            _ => order.service_id.clone(),
        };
        self.notifier
            .notify(
                Notification::new(&order.owner_id, Template::OrderCompleted)
                    .with("order_id", order.id)
                    .with("service", service)
                    .with("link", &order.link)
                    .with("quantity", order.quantity),
            )
            .await
    }
}

/// Retry budget for store writes that follow an order transition.
fn post_transition_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_times(3)
}

fn is_transient(e: &FulfillmentError) -> bool {
    matches!(
        e,
        FulfillmentError::PersistenceError(_) | FulfillmentError::Conflict(_)
    )
}
