use crate::domain::ports::Mailer;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Delivers mail to the log. Stands in for an SMTP relay.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        info!(recipient, subject, body, "Email sent");
        Ok(())
    }
}
