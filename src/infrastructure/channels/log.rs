//! Log channel.

use crate::application::ports::Channel;
use crate::domain::content::Notice;
use crate::error::DeliveryError;
use async_trait::async_trait;
use tracing::warn;

/// Writes each notice as a WARN record.
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

impl LogChannel {
    /// Create a log channel.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notice: &Notice) -> Result<bool, DeliveryError> {
        let content = notice.content();
        warn!(
            scene = notice.event().scene(),
            "{}\n{}", content.title, content.body
        );
        Ok(true)
    }
}
