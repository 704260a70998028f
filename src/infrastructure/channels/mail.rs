//! Mail channel.

use crate::application::ports::{AggregatingChannel, Channel};
use crate::domain::content::{Batch, Content, Notice};
use crate::error::DeliveryError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A plain text mail ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// Sender address, if the transport does not fix one.
    pub from: Option<String>,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Copied recipients.
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// When the message was built.
    pub sent_at: DateTime<Local>,
}

/// Delivers mail.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send one message.
    async fn send(&self, message: MailMessage) -> Result<(), DeliveryError>;
}

/// Mail addressing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSettings {
    /// Sender address.
    #[serde(default)]
    pub from: Option<String>,
    /// Primary recipients.
    #[serde(default)]
    pub to: Vec<String>,
    /// Copied recipients.
    #[serde(default)]
    pub cc: Vec<String>,
}

/// Aggregating channel sending notices by mail.
pub struct MailChannel<T> {
    settings: MailSettings,
    transport: T,
}

impl<T> MailChannel<T>
where
    T: MailTransport,
{
    /// Create a mail channel.
    pub fn new(settings: MailSettings, transport: T) -> Self {
        Self {
            settings,
            transport,
        }
    }

    fn message(&self, content: &Content) -> MailMessage {
        MailMessage {
            from: self.settings.from.clone(),
            to: self.settings.to.clone(),
            cc: self.settings.cc.clone(),
            subject: content.title.clone(),
            body: content.body.clone(),
            sent_at: Local::now(),
        }
    }

    async fn send(&self, content: &Content) -> Result<bool, DeliveryError> {
        if self.settings.to.is_empty() {
            debug!("mail recipients not configured, skipping");
            return Ok(false);
        }
        self.transport.send(self.message(content)).await?;
        Ok(true)
    }
}

#[async_trait]
impl<T> Channel for MailChannel<T>
where
    T: MailTransport,
{
    fn name(&self) -> &str {
        "mail"
    }

    async fn notify(&self, notice: &Notice) -> Result<bool, DeliveryError> {
        self.send(notice.content()).await
    }
}

#[async_trait]
impl<T> AggregatingChannel for MailChannel<T>
where
    T: MailTransport,
{
    async fn notify_batch(&self, batch: &Batch) -> Result<bool, DeliveryError> {
        self.send(batch.content()).await
    }
}

impl<T> std::fmt::Debug for MailChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailChannel")
            .field("settings", &self.settings)
            .finish()
    }
}
