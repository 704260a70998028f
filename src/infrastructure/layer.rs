//! Tracing integration: turn ERROR events into notices.
//!
//! [`ErrorNoticeLayer`] sits in a `tracing_subscriber` stack and submits an
//! exception notice for every ERROR event it sees. The message becomes the
//! unique code, so repeats of the same error are throttled together.
//!
//! ```no_run
//! use notice_throttle::{ErrorNoticeLayer, EventKind, LogChannel, Notifier};
//! use std::sync::Arc;
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! # async fn example() {
//! let notifier = Notifier::builder()
//!     .with_channel(EventKind::Notice, Arc::new(LogChannel::new()))
//!     .build()
//!     .unwrap();
//!
//! let subscriber = tracing_subscriber::registry()
//!     .with(ErrorNoticeLayer::new(notifier.clone()).with_ignored_targets(["hyper"]));
//! tracing::subscriber::set_global_default(subscriber).unwrap();
//!
//! tracing::error!(order_id = 42, "payment capture failed");
//! # }
//! ```

use crate::domain::event::{NoticeEvent, SCENE_EXCEPTION};
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::visitor::FieldVisitor;
use std::collections::BTreeSet;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Target prefix of this crate's own diagnostics, which are never bridged.
const OWN_TARGET: &str = "notice_throttle";

/// Layer submitting ERROR events to a [`Notifier`].
#[derive(Debug, Clone)]
pub struct ErrorNoticeLayer {
    notifier: Notifier,
    ignored_targets: BTreeSet<String>,
}

impl ErrorNoticeLayer {
    /// Create a layer feeding `notifier`.
    pub fn new(notifier: Notifier) -> Self {
        Self {
            notifier,
            ignored_targets: BTreeSet::new(),
        }
    }

    /// Skip events from these targets and their submodules.
    pub fn with_ignored_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_targets
            .extend(targets.into_iter().map(Into::into));
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        matches_target(target, OWN_TARGET)
            || self
                .ignored_targets
                .iter()
                .any(|ignored| matches_target(target, ignored))
    }
}

fn matches_target(target: &str, prefix: &str) -> bool {
    match target.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with("::"),
        None => false,
    }
}

impl<S> Layer<S> for ErrorNoticeLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() != Level::ERROR || self.is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);
        let (message, fields) = visitor.into_parts();
        let message = message.unwrap_or_else(|| metadata.name().to_string());

        let notice = fields.into_iter().fold(
            NoticeEvent::new(SCENE_EXCEPTION)
                .with_unique_code(message.clone())
                .with_message(message)
                .with_field("target", metadata.target()),
            |notice, (key, value)| notice.with_field(key, value),
        );
        self.notifier.submit(notice);
    }
}
