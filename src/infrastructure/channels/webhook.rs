//! Chat robot webhook channel.
//!
//! Sends markdown messages in the shape common chat robots accept:
//!
//! ```json
//! {
//!   "msgtype": "markdown",
//!   "markdown": { "title": "...", "text": "..." },
//!   "at": { "atMobiles": [], "atUserIds": [], "isAtAll": false }
//! }
//! ```
//!
//! The robot answers with `{"errcode": 0, "errmsg": "ok"}` on success.

use crate::application::ports::{AggregatingChannel, Channel};
use crate::domain::content::{Batch, Content, Notice};
use crate::error::DeliveryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Posts a JSON body to a URL and returns the response body.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Send `body` with content type `application/json`.
    async fn post_json(&self, url: &str, body: String) -> Result<String, DeliveryError>;
}

/// Webhook target and mentions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Robot URL, including any access token.
    #[serde(default)]
    pub url: Option<String>,
    /// Phone numbers to mention.
    #[serde(default)]
    pub at_mobiles: Vec<String>,
    /// User ids to mention.
    #[serde(default)]
    pub at_user_ids: Vec<String>,
    /// Mention everyone in the chat.
    #[serde(default)]
    pub at_all: bool,
}

#[derive(Debug, Serialize)]
struct RobotMessage<'a> {
    msgtype: &'static str,
    markdown: Markdown<'a>,
    at: Mentions<'a>,
}

#[derive(Debug, Serialize)]
struct Markdown<'a> {
    title: &'a str,
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Mentions<'a> {
    at_mobiles: &'a [String],
    at_user_ids: &'a [String],
    is_at_all: bool,
}

#[derive(Debug, Deserialize)]
struct RobotResponse {
    #[serde(default)]
    errcode: Option<i64>,
    #[serde(default)]
    errmsg: Option<String>,
}

/// Aggregating channel posting to a chat robot.
pub struct WebhookChannel<T> {
    name: String,
    settings: WebhookSettings,
    transport: T,
}

impl<T> WebhookChannel<T>
where
    T: WebhookTransport,
{
    /// Create a channel named `"webhook"`.
    pub fn new(settings: WebhookSettings, transport: T) -> Self {
        Self::named("webhook", settings, transport)
    }

    /// Create a channel with a custom name for logs.
    pub fn named(name: impl Into<String>, settings: WebhookSettings, transport: T) -> Self {
        Self {
            name: name.into(),
            settings,
            transport,
        }
    }

    /// Build the JSON payload for some content.
    pub fn payload(&self, content: &Content) -> Result<String, DeliveryError> {
        let mut text = format!("#### {}\n\n", content.title);
        for line in content.body.lines() {
            text.push_str(line);
            // markdown hard line break
            text.push_str("  \n");
        }
        for mobile in &self.settings.at_mobiles {
            text.push_str(&format!("@{mobile} "));
        }

        let message = RobotMessage {
            msgtype: "markdown",
            markdown: Markdown {
                title: &content.title,
                text,
            },
            at: Mentions {
                at_mobiles: &self.settings.at_mobiles,
                at_user_ids: &self.settings.at_user_ids,
                is_at_all: self.settings.at_all,
            },
        };
        Ok(serde_json::to_string(&message)?)
    }

    async fn send(&self, content: &Content) -> Result<bool, DeliveryError> {
        let Some(url) = self.settings.url.as_deref().filter(|url| !url.is_empty()) else {
            debug!(channel = %self.name, "webhook url not configured, skipping");
            return Ok(false);
        };

        let body = self.payload(content)?;
        let response = self.transport.post_json(url, body).await?;
        accepted(&self.name, &response)
    }
}

/// Read a robot response; anything but `errcode: 0` is a soft failure.
pub(super) fn accepted(channel: &str, response: &str) -> Result<bool, DeliveryError> {
    let response: RobotResponse = serde_json::from_str(response)?;
    match response.errcode {
        Some(0) => Ok(true),
        code => {
            warn!(
                channel,
                errcode = ?code,
                errmsg = response.errmsg.as_deref().unwrap_or(""),
                "webhook rejected message"
            );
            Ok(false)
        }
    }
}

#[async_trait]
impl<T> Channel for WebhookChannel<T>
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
impl<T> AggregatingChannel for WebhookChannel<T>
where
    T: WebhookTransport,
{
    async fn notify_batch(&self, batch: &Batch) -> Result<bool, DeliveryError> {
        self.send(batch.content()).await
    }
}

impl<T> std::fmt::Debug for WebhookChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookChannel")
            .field("name", &self.name)
            .field("configured", &self.settings.url.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::content::AppContext;
    use crate::domain::event::NoticeEvent;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct StubTransport {
        response: String,
        requests: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl StubTransport {
        fn answering(response: &str) -> Self {
            Self {
                response: response.to_string(),
                requests: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl WebhookTransport for StubTransport {
        async fn post_json(&self, url: &str, body: String) -> Result<String, DeliveryError> {
            self.requests.lock().push((url.to_string(), body));
            Ok(self.response.clone())
        }
    }

    fn settings(url: Option<&str>) -> WebhookSettings {
        WebhookSettings {
            url: url.map(str::to_string),
            at_mobiles: vec!["13800000000".to_string()],
            ..WebhookSettings::default()
        }
    }

    fn notice() -> Notice {
        Notice::new(
            NoticeEvent::new("db"),
            Content::new("db alert", "host: a\nfrequency: first occurrence\n"),
        )
    }

    #[tokio::test]
    async fn test_posts_markdown_payload() {
        let transport = StubTransport::answering(r#"{"errcode":0,"errmsg":"ok"}"#);
        let channel = WebhookChannel::new(settings(Some("https://robot/send")), transport.clone());

        assert!(channel.notify(&notice()).await.unwrap());

        let requests = transport.requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "https://robot/send");
        let body: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
        assert_eq!(body["msgtype"], "markdown");
        assert_eq!(body["markdown"]["title"], "db alert");
        assert!(body["markdown"]["text"]
            .as_str()
            .unwrap()
            .starts_with("#### db alert\n\nhost: a  \n"));
        assert_eq!(body["at"]["atMobiles"][0], "13800000000");
        assert_eq!(body["at"]["isAtAll"], false);
    }

    #[tokio::test]
    async fn test_missing_url_is_soft_failure() {
        let transport = StubTransport::answering("{}");
        let channel = WebhookChannel::new(settings(None), transport.clone());

        assert!(!channel.notify(&notice()).await.unwrap());
        assert!(transport.requests.lock().is_empty());

        let channel = WebhookChannel::new(settings(Some("")), transport.clone());
        assert!(!channel.notify(&notice()).await.unwrap());
    }

    #[tokio::test]
    async fn test_nonzero_errcode_is_soft_failure() {
        let transport = StubTransport::answering(r#"{"errcode":310000,"errmsg":"keywords not in content"}"#);
        let channel = WebhookChannel::new(settings(Some("https://robot/send")), transport);

        assert!(!channel.notify(&notice()).await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_response_is_error() {
        let transport = StubTransport::answering("<html>bad gateway</html>");
        let channel = WebhookChannel::new(settings(Some("https://robot/send")), transport);

        let err = channel.notify(&notice()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Json(_)));
    }

    #[tokio::test]
    async fn test_batch_uses_batch_content() {
        let transport = StubTransport::answering(r#"{"errcode":0}"#);
        let channel = WebhookChannel::new(settings(Some("https://robot/send")), transport.clone());
        let batch = Batch::new(
            vec![Arc::new(notice()), Arc::new(notice())],
            &AppContext::new("svc", ["prod"]),
        );

        assert!(channel.notify_batch(&batch).await.unwrap());
        let requests = transport.requests.lock().clone();
        let body: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
        assert_eq!(
            body["markdown"]["title"],
            "[prod] environment, 2 alerts aggregated"
        );
    }
}
