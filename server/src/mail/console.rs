use async_trait::async_trait;

use super::{EmailMessage, MailError, Mailer};

/// Writes messages to the log. Used in development.
pub struct ConsoleMailer {
    from: String,
}

impl ConsoleMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Email (console backend)"
        );
        Ok(())
    }
}
