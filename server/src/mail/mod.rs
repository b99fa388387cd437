//! Outgoing email. Batch jobs depend on [`Mailer`] only; the concrete
//! transport is picked from configuration at startup.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::MailConfig;

pub mod console;
pub mod smtp;

pub use console::ConsoleMailer;
pub use smtp::SmtpMailer;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// SMTP when a host is configured, otherwise messages are only logged.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match &config.smtp_host {
        Some(host) => {
            tracing::info!(host = %host, port = config.smtp_port, "Mail: using SMTP transport");
            Ok(Arc::new(SmtpMailer::new(config, host)?))
        }
        None => {
            tracing::info!("Mail: SMTP_HOST not set, messages will be logged instead of sent");
            Ok(Arc::new(ConsoleMailer::new(config.from_address.clone())))
        }
    }
}
