//! In-process job queue and bounded worker pools.
//!
//! Each [`QueueName`] gets an unbounded channel. A [`WorkerPool`] drains one
//! channel with at most `policy.concurrency` jobs in flight, re-delivers
//! `Retry` outcomes after exponential backoff and routes `Failed` outcomes
//! and exhausted budgets to the handler's dead-letter path.
//!
//! Delivery is at-least-once: handlers must check entity state before acting.

use crate::domain::job::{Job, JobOutcome, JobPayload, QueueName, QueuePolicy};
use crate::domain::ports::JobQueue;
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Consumer side of a queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobOutcome;

    /// Terminal-failure path, invoked exactly once per job that is
    /// permanently failed or out of attempts.
    async fn on_dead_letter(&self, job: &Job, reason: &str);
}

/// Delay before re-delivering a job whose `attempt`-th delivery asked for a
/// retry: `base_delay * 2^(attempt-1)`.
pub fn retry_delay(policy: &QueuePolicy, attempt: u32) -> Duration {
    let cap = policy.base_delay * 64;
    ExponentialBuilder::default()
        .with_min_delay(policy.base_delay)
        .with_factor(2.0)
        .with_max_delay(cap)
        .with_max_times(policy.max_attempts.max(1) as usize)
        .build()
        .nth(attempt.saturating_sub(1) as usize)
        .unwrap_or(cap)
}

/// The producer handle shared by every component that enqueues work.
#[derive(Clone)]
pub struct InProcessQueue {
    senders: Arc<HashMap<QueueName, mpsc::UnboundedSender<Job>>>,
}

/// Receiving ends, handed to worker pools at start-up.
pub struct QueueReceivers {
    receivers: HashMap<QueueName, mpsc::UnboundedReceiver<Job>>,
}

impl QueueReceivers {
    pub fn take(&mut self, queue: QueueName) -> Option<mpsc::UnboundedReceiver<Job>> {
        self.receivers.remove(&queue)
    }
}

impl InProcessQueue {
    pub fn new() -> (Self, QueueReceivers) {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for queue in QueueName::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(queue, tx);
            receivers.insert(queue, rx);
        }
        (
            Self {
                senders: Arc::new(senders),
            },
            QueueReceivers { receivers },
        )
    }

    fn sender(&self, queue: QueueName) -> Result<mpsc::UnboundedSender<Job>> {
        self.senders
            .get(&queue)
            .cloned()
            .ok_or_else(|| FulfillmentError::QueueError(format!("no such queue {queue}")))
    }

    fn push(&self, job: Job) -> Result<Uuid> {
        let id = job.id;
        let queue = job.queue();
        self.sender(queue)?
            .send(job)
            .map_err(|_| FulfillmentError::QueueError(format!("queue {queue} is closed")))?;
        Ok(id)
    }
}

#[async_trait]
impl JobQueue for InProcessQueue {
    async fn enqueue(&self, payload: JobPayload) -> Result<Uuid> {
        let job = Job::new(payload);
        debug!(job_id = %job.id, queue = %job.queue(), "Job enqueued");
        self.push(job)
    }
}

/// Bounded-concurrency consumer of one queue.
pub struct WorkerPool {
    queue: QueueName,
    policy: QueuePolicy,
    handler: Arc<dyn JobHandler>,
    producer: InProcessQueue,
}

impl WorkerPool {
    pub fn new(
        queue: QueueName,
        policy: QueuePolicy,
        handler: Arc<dyn JobHandler>,
        producer: InProcessQueue,
    ) -> Self {
        Self {
            queue,
            policy,
            handler,
            producer,
        }
    }

    /// Runs until `shutdown` fires or the channel closes, then waits for
    /// jobs already in flight.
    pub fn spawn(
        self,
        mut receiver: mpsc::UnboundedReceiver<Job>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = Arc::new(self);
        tokio::spawn(async move {
            let permits = Arc::new(Semaphore::new(pool.policy.concurrency.max(1)));
            let mut in_flight = JoinSet::new();
            info!(
                queue = %pool.queue,
                concurrency = pool.policy.concurrency,
                max_attempts = pool.policy.max_attempts,
                "Worker pool started"
            );

            loop {
                let permit = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                let job = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    job = receiver.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };

                let pool = pool.clone();
                in_flight.spawn(async move {
                    pool.process(job).await;
                    drop(permit);
                });
                while in_flight.try_join_next().is_some() {}
            }

            while in_flight.join_next().await.is_some() {}
            info!(queue = %pool.queue, "Worker pool stopped");
        })
    }

    async fn process(&self, job: Job) {
        let span = info_span!("job", queue = %self.queue, job_id = %job.id, attempt = job.attempt);
        async {
            match self.run_handler(&job).await {
                JobOutcome::Done => debug!("Job done"),
                JobOutcome::Retry(reason) if job.attempt < self.policy.max_attempts => {
                    let delay = retry_delay(&self.policy, job.attempt);
                    warn!(%reason, ?delay, "Job failed, scheduling retry");
                    self.schedule_retry(job.next_attempt(), delay);
                }
                JobOutcome::Retry(reason) => {
                    error!(%reason, "Job exhausted its attempts");
                    self.handler.on_dead_letter(&job, &reason).await;
                }
                JobOutcome::Failed(reason) => {
                    warn!(%reason, "Job failed permanently");
                    self.handler.on_dead_letter(&job, &reason).await;
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs the handler on its own task so a panic becomes a retry instead
    /// of a lost job.
    async fn run_handler(&self, job: &Job) -> JobOutcome {
        let handler = self.handler.clone();
        let owned = job.clone();
        match tokio::spawn(async move { handler.handle(&owned).await }).await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Retry(format!("handler crashed: {e}")),
        }
    }

    fn schedule_retry(&self, job: Job, delay: Duration) {
        let producer = self.producer.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let job_id = job.id;
            if let Err(e) = producer.push(job) {
                error!(%job_id, error = %e, "Could not re-deliver job");
            }
        });
    }
}
