use super::catalog::ProviderId;
use super::notification::Notification;
use super::order::OrderId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Logical queues, each served by its own worker pool.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "camelCase")]
pub enum QueueName {
    Fulfillment,
    ProviderSync,
    Notification,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [
        QueueName::Fulfillment,
        QueueName::ProviderSync,
        QueueName::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Fulfillment => "fulfillment",
            QueueName::ProviderSync => "providerSync",
            QueueName::Notification => "notification",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job asks a worker to do.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JobPayload {
    Fulfillment { order_id: OrderId },
    CheckStatus { provider_id: ProviderId },
    SyncServices { provider_id: ProviderId },
    Notification(Notification),
}

impl JobPayload {
    pub fn queue(&self) -> QueueName {
        match self {
            JobPayload::Fulfillment { .. } => QueueName::Fulfillment,
            JobPayload::CheckStatus { .. } | JobPayload::SyncServices { .. } => {
                QueueName::ProviderSync
            }
            JobPayload::Notification(_) => QueueName::Notification,
        }
    }
}

/// A unit of work owned by the queue.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Job {
    pub id: Uuid,
    pub payload: JobPayload,
    /// 1-based delivery count.
    pub attempt: u32,
}

impl Job {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            attempt: 1,
        }
    }

    pub fn queue(&self) -> QueueName {
        self.payload.queue()
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            id: self.id,
            payload: self.payload.clone(),
            attempt: self.attempt + 1,
        }
    }
}

/// How a handler wants the queue to treat a delivery.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum JobOutcome {
    Done,
    /// Transient: deliver again after backoff while attempts remain.
    Retry(String),
    /// Permanent: go straight to the terminal-failure path.
    Failed(String),
}

/// Concurrency and retry budget of one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl QueuePolicy {
    pub fn for_queue(queue: QueueName) -> Self {
        match queue {
            QueueName::Fulfillment => Self {
                concurrency: 5,
                max_attempts: 3,
                base_delay: Duration::from_secs(2),
            },
            QueueName::ProviderSync => Self {
                concurrency: 2,
                max_attempts: 2,
                base_delay: Duration::from_secs(5),
            },
            QueueName::Notification => Self {
                concurrency: 3,
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_routes_to_queue() {
        let order = JobPayload::Fulfillment {
            order_id: Uuid::new_v4(),
        };
        let check = JobPayload::CheckStatus {
            provider_id: "p1".into(),
        };
        let sync = JobPayload::SyncServices {
            provider_id: "p1".into(),
        };
        assert_eq!(order.queue(), QueueName::Fulfillment);
        assert_eq!(check.queue(), QueueName::ProviderSync);
        assert_eq!(sync.queue(), QueueName::ProviderSync);
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let job = Job::new(JobPayload::CheckStatus {
            provider_id: "p1".into(),
        });
        let retry = job.next_attempt();
        assert_eq!(retry.id, job.id);
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.payload, job.payload);
    }

    #[test]
    fn test_default_policies() {
        assert_eq!(QueuePolicy::for_queue(QueueName::Fulfillment).concurrency, 5);
        assert_eq!(QueuePolicy::for_queue(QueueName::ProviderSync).concurrency, 2);
        assert_eq!(QueuePolicy::for_queue(QueueName::Notification).concurrency, 3);
    }
}
