//! Notification events and their constructors.
//!
//! A [`NoticeEvent`] is a value describing one occurrence of something worth
//! telling a human about. Producers build one, hand it to the notifier and move
//! on; the notifier decides whether it reaches any channel.

use crate::domain::signature::SignatureKey;
use chrono::{DateTime, Local};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Scene used by [`NoticeEvent::exception`].
pub const SCENE_EXCEPTION: &str = "system exception";
/// Scene used by [`NoticeEvent::slow_request`].
pub const SCENE_SLOW_REQUEST: &str = "slow request handling";
/// Scene used by [`NoticeEvent::slow_third_party_request`].
pub const SCENE_SLOW_THIRD_PARTY: &str = "slow third-party request";
/// Scene used by [`NoticeEvent::slow_sql`].
pub const SCENE_SLOW_SQL: &str = "slow sql";
/// Scene used by [`NoticeEvent::slow_task`].
pub const SCENE_SLOW_TASK: &str = "slow task execution";
/// Scene used by [`NoticeEvent::pool_backlog`].
pub const SCENE_POOL_BACKLOG: &str = "thread pool task backlog";
/// Scene used for process level resource breaches.
pub const SCENE_PROCESS_RESOURCE: &str = "process resource anomaly";
/// Scene used for host level resource breaches.
pub const SCENE_SYSTEM_RESOURCE: &str = "system resource anomaly";

/// Longest error chain kept by [`NoticeEvent::exception`], in characters.
pub const MAX_TRACE_CHARS: usize = 1024;

/// The kind of an event, used to route it to channels and renderers.
///
/// Channels subscribe to a kind. [`EventKind::Notice`] is the general kind
/// every built-in constructor produces; applications can define their own
/// kinds with [`EventKind::Custom`] and register renderers for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// The general notice kind.
    Notice,
    /// An application defined kind.
    Custom(&'static str),
}

impl EventKind {
    /// Name of the kind, suitable for log fields.
    pub fn name(&self) -> &'static str {
        match *self {
            EventKind::Notice => "notice",
            EventKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One occurrence of a notable condition.
///
/// The frequency description is empty until the throttle attaches one on the
/// way to the channels.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeEvent {
    kind: EventKind,
    scene: String,
    unique_code: Option<String>,
    message: String,
    timestamp: DateTime<Local>,
    fields: Vec<(String, String)>,
    frequency: Option<String>,
}

impl NoticeEvent {
    /// Create an event of kind [`EventKind::Notice`] for a scene.
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Notice,
            scene: scene.into(),
            unique_code: None,
            message: String::new(),
            timestamp: Local::now(),
            fields: Vec::new(),
            frequency: None,
        }
    }

    /// Set the identifier of the specific instance within the scene.
    pub fn with_unique_code(mut self, code: impl Into<String>) -> Self {
        self.unique_code = Some(code.into());
        self
    }

    /// Set the message, used as the signature when no unique code is set.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Append a display field. Fields render in insertion order.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Change the kind of the event.
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Override the occurrence timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// An error surfaced while serving `location`.
    ///
    /// The error message is the unique code. The error and its sources are
    /// joined into the `error` field, cut to [`MAX_TRACE_CHARS`] characters.
    pub fn exception(location: impl Into<String>, error: &(dyn StdError + 'static)) -> Self {
        let mut trace = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push_str("\ncaused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        if trace.chars().count() > MAX_TRACE_CHARS {
            trace = trace.chars().take(MAX_TRACE_CHARS).collect();
        }

        Self::new(SCENE_EXCEPTION)
            .with_unique_code(error.to_string())
            .with_message(error.to_string())
            .with_field("location", location)
            .with_field("error", trace)
    }

    /// A request that took longer than expected.
    pub fn slow_request(url: impl Into<String>, elapsed: Duration, params: &[&str]) -> Self {
        let url = url.into();
        Self::new(SCENE_SLOW_REQUEST)
            .with_unique_code(url.clone())
            .with_field("request url", url)
            .with_field("request parameters", format!("{:?}", params))
            .with_field("elapsed", format_millis(elapsed))
    }

    /// An outbound call to another service that took longer than expected.
    pub fn slow_third_party_request(
        url: impl Into<String>,
        elapsed: Duration,
        params: &[&str],
        response: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self::new(SCENE_SLOW_THIRD_PARTY)
            .with_unique_code(url.clone())
            .with_field("request url", url)
            .with_field("request parameters", format!("{:?}", params))
            .with_field("response", response)
            .with_field("elapsed", format_millis(elapsed))
    }

    /// A database statement that took longer than expected.
    pub fn slow_sql(statement: impl Into<String>, elapsed: Duration) -> Self {
        let statement = statement.into();
        Self::new(SCENE_SLOW_SQL)
            .with_unique_code(statement.clone())
            .with_field("statement", statement)
            .with_field("elapsed", format_millis(elapsed))
    }

    /// A background task that took longer than expected.
    pub fn slow_task(task: impl Into<String>, elapsed: Duration) -> Self {
        let task = task.into();
        Self::new(SCENE_SLOW_TASK)
            .with_unique_code(task.clone())
            .with_field("task", task)
            .with_field("elapsed", format_millis(elapsed))
    }

    /// A worker pool whose queue is piling up.
    ///
    /// `distribution` lists queued task counts per task name.
    pub fn pool_backlog(
        pool: impl Into<String>,
        total_threads: usize,
        active_threads: usize,
        queued_tasks: usize,
        distribution: &[(String, usize)],
    ) -> Self {
        let pool = pool.into();
        let distribution = distribution
            .iter()
            .map(|(name, count)| format!("{name}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(SCENE_POOL_BACKLOG)
            .with_unique_code(pool.clone())
            .with_field("pool", pool)
            .with_field("threads", total_threads.to_string())
            .with_field("active threads", active_threads.to_string())
            .with_field("queued tasks", queued_tasks.to_string())
            .with_field("queued task distribution", distribution)
    }

    /// Routing kind of the event.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Category label.
    pub fn scene(&self) -> &str {
        &self.scene
    }

    /// Instance identifier within the scene, if any.
    pub fn unique_code(&self) -> Option<&str> {
        self.unique_code.as_deref()
    }

    /// Message text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// When the event occurred.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Display fields in insertion order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the first field named `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Frequency description attached when the event was let through.
    pub fn frequency(&self) -> Option<&str> {
        self.frequency.as_deref()
    }

    /// Signature used to throttle this event.
    pub fn signature(&self) -> SignatureKey {
        SignatureKey::from_event(self)
    }

    pub(crate) fn attach_frequency(&mut self, frequency: impl Into<String>) {
        self.frequency = Some(frequency.into());
    }
}

fn format_millis(elapsed: Duration) -> String {
    format!("{}ms", elapsed.as_millis())
}
