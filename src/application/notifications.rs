use crate::domain::job::{Job, JobOutcome, JobPayload};
use crate::domain::notification::Notification;
use crate::domain::ports::{JobQueueRef, MailerRef};
use crate::infrastructure::queue::JobHandler;
use async_trait::async_trait;
use tracing::{info, warn};

/// Fire-and-forget producer of lifecycle notifications.
#[derive(Clone)]
pub struct NotificationDispatcher {
    queue: JobQueueRef,
}

impl NotificationDispatcher {
    pub fn new(queue: JobQueueRef) -> Self {
        Self { queue }
    }

    /// Enqueues `notification`. Failures are logged, never returned.
    pub async fn notify(&self, notification: Notification) {
        let template = notification.template;
        let recipient = notification.recipient.clone();
        if let Err(e) = self
            .queue
            .enqueue(JobPayload::Notification(notification))
            .await
        {
            warn!(%recipient, ?template, error = %e, "Dropping notification, enqueue failed");
        }
    }
}

/// Worker side: renders and delivers notification jobs.
pub struct NotificationHandler {
    mailer: MailerRef,
}

impl NotificationHandler {
    pub fn new(mailer: MailerRef) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl JobHandler for NotificationHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let JobPayload::Notification(notification) = &job.payload else {
            return JobOutcome::Failed(format!("unexpected payload on notification queue: {job:?}"));
        };
        match self
            .mailer
            .send(
                &notification.recipient,
                notification.subject(),
                &notification.render(),
            )
            .await
        {
            Ok(()) => JobOutcome::Done,
            Err(e) => JobOutcome::Retry(e.to_string()),
        }
    }

    async fn on_dead_letter(&self, job: &Job, reason: &str) {
        info!(job_id = %job.id, reason, "Notification abandoned");
    }
}
