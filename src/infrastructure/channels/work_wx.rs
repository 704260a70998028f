//! WeChat Work group robot channel.
//!
//! The robot takes a single markdown `content` field and mentions users
//! inline with `<@userid>`:
//!
//! ```json
//! { "msgtype": "markdown", "markdown": { "content": "### title\n> line" } }
//! ```
//!
//! Every body line is rendered as a quote so the message reads as one block
//! in the chat.

use crate::application::ports::{AggregatingChannel, Channel};
use crate::domain::content::{Batch, Content, Notice};
use crate::error::DeliveryError;
use crate::infrastructure::channels::webhook::{accepted, WebhookSettings, WebhookTransport};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct RobotMessage {
    msgtype: &'static str,
    markdown: Markdown,
}

#[derive(Debug, Serialize)]
struct Markdown {
    content: String,
}

/// Aggregating channel posting to a WeChat Work group robot.
///
/// Uses the `url`, `at_user_ids` and `at_all` settings; phone mentions are
/// not supported by this robot and are ignored.
pub struct WorkWxChannel<T> {
    name: String,
    settings: WebhookSettings,
    transport: T,
}

impl<T> WorkWxChannel<T>
where
    T: WebhookTransport,
{
    /// Create a channel named `"work-wx"`.
    pub fn new(settings: WebhookSettings, transport: T) -> Self {
        Self {
            name: "work-wx".to_string(),
            settings,
            transport,
        }
    }

    /// Build the JSON payload for some content.
    pub fn payload(&self, content: &Content) -> Result<String, DeliveryError> {
        let mut text = format!("### {}", content.title);
        for line in content.body.lines() {
            text.push_str("\n> ");
            text.push_str(line);
        }

        if self.settings.at_all {
            text.push_str(" <@all>");
        } else {
            for user in &self.settings.at_user_ids {
                text.push_str(&format!(" <@{user}>"));
            }
        }

        let message = RobotMessage {
            msgtype: "markdown",
            markdown: Markdown { content: text },
        };
        Ok(serde_json::to_string(&message)?)
    }

    async fn send(&self, content: &Content) -> Result<bool, DeliveryError> {
        let Some(url) = self.settings.url.as_deref().filter(|url| !url.is_empty()) else {
            debug!(channel = %self.name, "work-wx url not configured, skipping");
            return Ok(false);
        };

        let body = self.payload(content)?;
        let response = self.transport.post_json(url, body).await?;
        accepted(&self.name, &response)
    }
}

#[async_trait]
impl<T> Channel for WorkWxChannel<T>
where
    T: WebhookTransport,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, notice: &Notice) -> Result<bool, DeliveryError> {
        self.send(notice.content()).await
    }
}

#[async_trait]
impl<T> AggregatingChannel for WorkWxChannel<T>
where
    T: WebhookTransport,
{
    async fn notify_batch(&self, batch: &Batch) -> Result<bool, DeliveryError> {
        self.send(batch.content()).await
    }
}

impl<T> std::fmt::Debug for WorkWxChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkWxChannel")
            .field("name", &self.name)
            .field("configured", &self.settings.url.is_some())
            .finish()
    }
}
