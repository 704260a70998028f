//! # notice-throttle
//!
//! In-process alert throttling and fan-out to notification channels.
//!
//! Producers hand [`NoticeEvent`]s to a [`Notifier`]. Each event is reduced to
//! a [`SignatureKey`] (`scene:unique_code`, falling back to the message), and
//! per signature a fixed window decides whether a notification goes out:
//!
//! - the first occurrence in a window notifies
//! - further occurrences are suppressed until `threshold` of them have been
//!   seen inside the window, which notifies again and restarts the window
//! - every notification carries a human-readable frequency description
//!
//! Notices that get through are rendered once and handed to every channel
//! subscribed to their [`EventKind`]. Immediate channels get one delivery task
//! each on a bounded worker pool; aggregating channels buffer notices and
//! receive them on a fixed period, merged into one message when several piled
//! up. A failing or panicking channel never affects the producer or the other
//! channels.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notice_throttle::{EventKind, LogChannel, NoticeEvent, Notifier};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let notifier = Notifier::builder()
//!         .with_interval(Duration::from_secs(3600))
//!         .with_threshold(5)
//!         .with_channel(EventKind::Notice, Arc::new(LogChannel::new()))
//!         .build()
//!         .expect("valid configuration");
//!
//!     notifier.submit(
//!         NoticeEvent::new("payments")
//!             .with_unique_code("gateway-timeout")
//!             .with_field("gateway", "acme"),
//!     );
//!
//!     notifier.shutdown().await.expect("clean shutdown");
//! }
//! ```
//!
//! ## Configuration
//!
//! Settings can come from a file with `NOTICE__*` environment overrides:
//!
//! ```rust,no_run
//! use notice_throttle::{NoticeConfig, Notifier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NoticeConfig::load("notice.yaml")?;
//! let notifier = Notifier::builder().with_config(config).build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Tracing
//!
//! [`ErrorNoticeLayer`] turns `tracing` ERROR events into exception notices,
//! so existing `error!` calls alert without code changes.
//!
//! ## Observability
//!
//! ```rust,no_run
//! # use notice_throttle::Notifier;
//! # fn report(notifier: &Notifier) {
//! let snapshot = notifier.metrics().snapshot();
//! println!("notified: {}", snapshot.events_notified);
//! println!("suppression rate: {:.2}%", snapshot.suppression_rate() * 100.0);
//! println!("tracked signatures: {}", notifier.signature_count());
//! # }
//! ```
//!
//! ## Memory
//!
//! At most `max_signatures` (default 10,000) signatures are tracked. Every
//! 10,000 evaluations the registry sweeps and evicts the signatures that
//! notified longest ago until it is back at the cap. An evicted signature
//! starts over with a fresh window.

// Domain layer - pure throttle and rendering rules
pub mod domain;

// Application layer - registry, dispatch and delivery orchestration
pub mod application;

// Infrastructure layer - adapters, channels and the facade
pub mod infrastructure;

pub mod config;
pub mod error;

pub use domain::{
    content::{AppContext, Batch, Content, DefaultRenderer, Notice, Renderer},
    event::{
        EventKind, NoticeEvent, SCENE_EXCEPTION, SCENE_POOL_BACKLOG, SCENE_PROCESS_RESOURCE,
        SCENE_SLOW_REQUEST, SCENE_SLOW_SQL, SCENE_SLOW_TASK, SCENE_SLOW_THIRD_PARTY,
        SCENE_SYSTEM_RESOURCE,
    },
    signature::SignatureKey,
    throttle::{ThrottleDecision, ThrottlePolicy, ThrottleState},
};

pub use application::{
    channels::ChannelRegistry,
    dispatcher::Dispatcher,
    metrics::{Metrics, MetricsSnapshot},
    pool::{Job, WorkerPool},
    ports::{AggregatingChannel, Channel, Clock, EvictionCandidate, EvictionPolicy, Storage},
    registry::SignatureRegistry,
    scheduler::{AggregationScheduler, TaskHandle},
};

pub use infrastructure::{
    channels::{
        LogChannel, MailChannel, MailMessage, MailSettings, MailTransport, WebhookChannel,
        WebhookSettings, WebhookTransport, WorkWxChannel,
    },
    clock::SystemClock,
    eviction::LruEviction,
    layer::ErrorNoticeLayer,
    monitor::{ResourceMonitor, ResourceProbe, ResourceSample, ResourceScope},
    notifier::{Notifier, NotifierBuilder},
    storage::ShardedStorage,
};

pub use config::NoticeConfig;
pub use error::{BuildError, ConfigError, DeliveryError, RenderError, ShutdownError};
