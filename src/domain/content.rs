//! Rendered notification content.
//!
//! Channels never format events themselves. A [`Renderer`] turns an event
//! into a [`Content`] title and body once, when the event is let through, and
//! every channel delivers that same content.

use crate::domain::event::{EventKind, NoticeEvent};
use crate::error::RenderError;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Timestamp format used in rendered bodies.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DIVIDER: &str = "----------------------------------------";

/// A rendered title and body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Content {
    /// One line headline.
    pub title: String,
    /// Multi line body.
    pub body: String,
}

impl Content {
    /// Create content from a title and body.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Facts about the running application stamped onto every notice.
///
/// Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppContext {
    application_name: String,
    profiles: Vec<String>,
    host: String,
    process_id: u32,
}

impl AppContext {
    /// Create a context for the current process.
    ///
    /// The host defaults to the `HOSTNAME` environment variable, or
    /// `"unknown"` when it is not set.
    pub fn new<I, S>(application_name: impl Into<String>, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            application_name: application_name.into(),
            profiles: profiles.into_iter().map(Into::into).collect(),
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
            process_id: std::process::id(),
        }
    }

    /// Override the host shown in notices.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the process id shown in notices.
    pub fn with_process_id(mut self, process_id: u32) -> Self {
        self.process_id = process_id;
        self
    }

    /// Application name.
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Active deployment profiles.
    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    /// Host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Process id.
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Check if any active profile is in `ignored`.
    ///
    /// A notifier running under an ignored profile drops every submission.
    pub fn runs_under_any(&self, ignored: &BTreeSet<String>) -> bool {
        self.profiles.iter().any(|profile| ignored.contains(profile))
    }

    /// Profiles as `[dev, test]`.
    pub fn profiles_label(&self) -> String {
        format!("[{}]", self.profiles.join(", "))
    }

    fn info_block(&self) -> String {
        format!(
            "host: {}\nprocess id: {}\napplication: {}\n",
            self.host, self.process_id, self.application_name
        )
    }
}

impl Default for AppContext {
    fn default() -> Self {
        AppContext::new("application", Vec::<String>::new())
    }
}

/// An event that was let through, together with its rendered content.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    event: NoticeEvent,
    content: Content,
}

impl Notice {
    /// Pair an event with its content.
    pub fn new(event: NoticeEvent, content: Content) -> Self {
        Self { event, content }
    }

    /// The event, with its frequency description attached.
    pub fn event(&self) -> &NoticeEvent {
        &self.event
    }

    /// Rendered content.
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Routing kind of the underlying event.
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// Notices drained together from one aggregation buffer.
#[derive(Debug, Clone)]
pub struct Batch {
    notices: Vec<Arc<Notice>>,
    content: Content,
}

impl Batch {
    /// Build a batch and its combined content.
    pub fn new(notices: Vec<Arc<Notice>>, context: &AppContext) -> Self {
        let content = aggregate(&notices, context);
        Self { notices, content }
    }

    /// Notices in the order they were buffered.
    pub fn notices(&self) -> &[Arc<Notice>] {
        &self.notices
    }

    /// Combined content.
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Number of notices.
    pub fn len(&self) -> usize {
        self.notices.len()
    }

    /// Check if the batch holds no notices.
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

/// Turns an event into content.
///
/// Register one per [`EventKind`]. A renderer for [`EventKind::Notice`] is
/// always present; custom kinds must bring their own.
pub trait Renderer: Send + Sync {
    /// Render an event that was let through with `frequency`.
    fn render(
        &self,
        event: &NoticeEvent,
        frequency: &str,
        context: &AppContext,
    ) -> Result<Content, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(&NoticeEvent, &str, &AppContext) -> Result<Content, RenderError> + Send + Sync,
{
    fn render(
        &self,
        event: &NoticeEvent,
        frequency: &str,
        context: &AppContext,
    ) -> Result<Content, RenderError> {
        self(event, frequency, context)
    }
}

/// Renderer for the general notice kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRenderer;

impl Renderer for DefaultRenderer {
    fn render(
        &self,
        event: &NoticeEvent,
        frequency: &str,
        context: &AppContext,
    ) -> Result<Content, RenderError> {
        let mut title = format!(
            "{} environment, {} alert",
            context.profiles_label(),
            event.scene()
        );
        if let Some(code) = event.unique_code() {
            title.push_str(": ");
            title.push_str(code);
        }

        let mut body = context.info_block();
        body.push_str(&format!(
            "time: {}\nfrequency: {}\n",
            event.timestamp().format(TIME_FORMAT),
            frequency
        ));
        for (key, value) in event.fields() {
            body.push_str(&format!("{key} : {value}\n"));
        }

        Ok(Content { title, body })
    }
}

/// Combined content for several notices.
pub fn aggregate(notices: &[Arc<Notice>], context: &AppContext) -> Content {
    let title = format!(
        "{} environment, {} alerts aggregated",
        context.profiles_label(),
        notices.len()
    );

    let mut body = context.info_block();
    for notice in notices {
        body.push_str(DIVIDER);
        body.push('\n');
        body.push_str(&notice.content.title);
        body.push('\n');
        body.push_str(&notice.content.body);
        if !notice.content.body.ends_with('\n') {
            body.push('\n');
        }
    }

    Content { title, body }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.title, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> AppContext {
        AppContext::new("orders", ["prod", "eu"])
            .with_host("10.0.0.7")
            .with_process_id(4242)
    }

    fn event() -> NoticeEvent {
        let ts = chrono::Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 0)
            .single()
            .unwrap();
        NoticeEvent::new("payments")
            .with_unique_code("gateway-down")
            .with_field("gateway", "stripe")
            .with_field("status", "503")
            .with_timestamp(ts)
    }

    #[test]
    fn test_default_renderer_title_and_body() {
        let content = DefaultRenderer
            .render(&event(), "first occurrence", &context())
            .unwrap();

        assert_eq!(
            content.title,
            "[prod, eu] environment, payments alert: gateway-down"
        );
        assert_eq!(
            content.body,
            "host: 10.0.0.7\nprocess id: 4242\napplication: orders\n\
             time: 2024-03-09 14:05:00\nfrequency: first occurrence\n\
             gateway : stripe\nstatus : 503\n"
        );
    }

    #[test]
    fn test_closure_renderer() {
        let renderer = |event: &NoticeEvent, frequency: &str, _: &AppContext| {
            Ok::<_, RenderError>(Content::new(
                event.scene().to_uppercase(),
                frequency.to_string(),
            ))
        };

        let content = renderer.render(&event(), "x", &context()).unwrap();
        assert_eq!(content, Content::new("PAYMENTS", "x"));
    }

    #[test]
    fn test_aggregate_content() {
        let ctx = context();
        let notices: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|t| Arc::new(Notice::new(event(), Content::new(*t, format!("{t} body")))))
            .collect();

        let batch = Batch::new(notices, &ctx);
        assert_eq!(batch.len(), 3);
        assert_eq!(
            batch.content().title,
            "[prod, eu] environment, 3 alerts aggregated"
        );
        assert!(batch.content().body.starts_with("host: 10.0.0.7\n"));
        assert_eq!(batch.content().body.matches(DIVIDER).count(), 3);

        let a = batch.content().body.find("a body").unwrap();
        let c = batch.content().body.find("c body").unwrap();
        assert!(a < c);
    }

    #[test]
    fn test_runs_under_any() {
        let context = AppContext::new("orders", ["prod", "eu"]);
        let mut ignored = BTreeSet::from(["dev".to_string()]);
        assert!(!context.runs_under_any(&ignored));

        ignored.insert("eu".to_string());
        assert!(context.runs_under_any(&ignored));
        assert!(!AppContext::new("orders", Vec::<String>::new()).runs_under_any(&ignored));
    }

    #[test]
    fn test_profiles_label() {
        assert_eq!(context().profiles_label(), "[prod, eu]");
        assert_eq!(AppContext::new("x", Vec::<String>::new()).profiles_label(), "[]");
    }
}
