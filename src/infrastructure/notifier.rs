//! The notifier facade and its builder.
//!
//! [`Notifier`] is what producers hold. [`Notifier::submit`] throttles the
//! event, routes it, and returns without waiting for any channel.

use crate::application::channels::ChannelRegistry;
use crate::application::dispatcher::Dispatcher;
use crate::application::metrics::Metrics;
use crate::application::pool::WorkerPool;
use crate::application::ports::{AggregatingChannel, Channel, Clock};
use crate::application::registry::SignatureRegistry;
use crate::application::scheduler::{AggregationScheduler, TaskHandle};
use crate::config::NoticeConfig;
use crate::domain::content::{AppContext, DefaultRenderer, Renderer};
use crate::domain::event::{EventKind, NoticeEvent};
use crate::error::{BuildError, ShutdownError};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::eviction::LruEviction;
use crate::infrastructure::storage::ShardedStorage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace};

/// Builder for constructing a [`Notifier`].
///
/// Defaults come from [`NoticeConfig::default`].
pub struct NotifierBuilder {
    config: NoticeConfig,
    clock: Option<Arc<dyn Clock>>,
    context: Option<AppContext>,
    channels: ChannelRegistry,
    renderers: HashMap<EventKind, Arc<dyn Renderer>>,
    runtime: Option<Handle>,
}

impl NotifierBuilder {
    /// Replace every setting with those in `config`.
    pub fn with_config(mut self, config: NoticeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the throttle window length.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set how many occurrences inside a window force a notification.
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Set the aggregation drain period.
    pub fn with_aggregation_interval(mut self, interval: Duration) -> Self {
        self.config.aggregation_interval = interval;
        self
    }

    /// Set the cap on tracked signatures.
    pub fn with_max_signatures(mut self, max: usize) -> Self {
        self.config.max_signatures = max;
        self
    }

    /// Set the profiles in which submissions are ignored.
    pub fn with_ignored_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ignored_profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of delivery workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set how many delivery tasks may wait before the oldest is discarded.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Use a custom clock (e.g. `MockClock` in tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use an explicit application context instead of one built from the
    /// configured name and profiles.
    pub fn with_context(mut self, context: AppContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Subscribe an immediate channel to `kind`.
    pub fn with_channel(mut self, kind: EventKind, channel: Arc<dyn Channel>) -> Self {
        self.channels.register(kind, channel);
        self
    }

    /// Subscribe an aggregating channel to `kind`.
    pub fn with_aggregating_channel(
        mut self,
        kind: EventKind,
        channel: Arc<dyn AggregatingChannel>,
    ) -> Self {
        self.channels.register_aggregating(kind, channel);
        self
    }

    /// Register the renderer for `kind`, replacing any previous one.
    pub fn with_renderer(mut self, kind: EventKind, renderer: Arc<dyn Renderer>) -> Self {
        self.renderers.insert(kind, renderer);
        self
    }

    /// Run workers and the scheduler on `runtime` instead of the current one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate settings and start the notifier.
    ///
    /// Spawns the delivery workers and, when an aggregating channel is
    /// registered, the aggregation scheduler.
    ///
    /// # Errors
    /// Returns an error if a setting is zero, or if no runtime was given and
    /// the caller is not inside a tokio runtime.
    pub fn build(self) -> Result<Notifier, BuildError> {
        let config = self.config;
        config.validate()?;
        let policy = config.policy()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };

        let context = Arc::new(self.context.unwrap_or_else(|| {
            AppContext::new(config.application_name.clone(), config.profiles.clone())
        }));
        let muted = context.runs_under_any(&config.ignored_profiles);

        let metrics = Metrics::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let registry = SignatureRegistry::new(
            Arc::new(ShardedStorage::new()),
            clock,
            policy,
            Arc::new(LruEviction::new(config.max_signatures)),
            metrics.clone(),
        );

        let mut renderers = self.renderers;
        renderers
            .entry(EventKind::Notice)
            .or_insert_with(|| Arc::new(DefaultRenderer));

        let pool = Arc::new(WorkerPool::start(
            config.workers,
            config.queue_capacity,
            metrics.clone(),
            &runtime,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(self.channels),
            renderers,
            Arc::clone(&context),
            Arc::clone(&pool),
            metrics.clone(),
        ));
        let scheduler = Arc::new(AggregationScheduler::new(
            Arc::clone(&dispatcher),
            config.aggregation_interval,
        ));
        let scheduler_handle = dispatcher
            .channels()
            .has_aggregating()
            .then(|| Arc::clone(&scheduler).start(&runtime));

        info!(
            application = context.application_name(),
            profiles = %context.profiles_label(),
            muted,
            channels = dispatcher.channels().len(),
            interval = ?config.interval,
            threshold = config.threshold,
            "notifier started"
        );

        Ok(Notifier {
            inner: Arc::new(NotifierInner {
                registry,
                dispatcher,
                scheduler,
                scheduler_handle: Mutex::new(scheduler_handle),
                pool,
                metrics,
                muted,
            }),
        })
    }
}

struct NotifierInner {
    registry: SignatureRegistry,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<AggregationScheduler>,
    scheduler_handle: Mutex<Option<TaskHandle>>,
    pool: Arc<WorkerPool>,
    metrics: Metrics,
    muted: bool,
}

/// Throttles events and fans them out to channels.
///
/// Cheap to clone; clones share all state.
///
/// # Example
/// ```no_run
/// use notice_throttle::{EventKind, LogChannel, NoticeEvent, Notifier};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let notifier = Notifier::builder()
///     .with_threshold(5)
///     .with_channel(EventKind::Notice, Arc::new(LogChannel::new()))
///     .build()
///     .expect("valid configuration");
///
/// notifier.submit(NoticeEvent::new("payments").with_unique_code("gateway-down"));
///
/// notifier.shutdown().await.expect("clean shutdown");
/// # }
/// ```
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl Notifier {
    /// Create a builder with default settings.
    pub fn builder() -> NotifierBuilder {
        NotifierBuilder {
            config: NoticeConfig::default(),
            clock: None,
            context: None,
            channels: ChannelRegistry::new(),
            renderers: HashMap::new(),
            runtime: None,
        }
    }

    /// Hand an event to the notifier.
    ///
    /// Never blocks on delivery and never panics: the throttle decision is
    /// made inline, rendering and enqueueing follow, and channel I/O happens
    /// on the worker pool.
    pub fn submit(&self, event: NoticeEvent) {
        let inner = &self.inner;
        inner.metrics.record_submitted();
        if inner.muted {
            inner.metrics.record_ignored();
            return;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let key = event.signature();
            let decision = inner.registry.evaluate(&key);
            if decision.is_notify() {
                inner.metrics.record_notified();
                debug!(
                    signature = %key,
                    fingerprint = key.fingerprint(),
                    frequency = %decision.frequency,
                    "notice let through"
                );
                inner.dispatcher.route(event, &decision);
            } else {
                inner.metrics.record_suppressed();
                trace!(signature = %key, "notice suppressed");
            }
        }));

        if outcome.is_err() {
            inner.metrics.record_dropped();
            error!("notice submission panicked, event dropped");
        }
    }

    /// Drain aggregation buffers now instead of waiting for the next tick.
    ///
    /// Returns `None` if a drain was already in progress.
    pub fn flush(&self) -> Option<usize> {
        self.inner.scheduler.tick()
    }

    /// Stop the scheduler after a final drain, then let queued deliveries
    /// finish and stop the workers.
    ///
    /// Submissions after shutdown are still throttled but no longer delivered.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        let handle = self.inner.scheduler_handle.lock().take();
        let scheduler = match handle {
            Some(handle) => handle.shutdown().await,
            None => Ok(()),
        };
        let pool = self.inner.pool.shutdown().await;
        debug!("notifier stopped");
        scheduler.and(pool)
    }

    /// Throttle and delivery counters.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Number of tracked signatures.
    pub fn signature_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// The signature registry.
    pub fn registry(&self) -> &SignatureRegistry {
        &self.inner.registry
    }

    /// Context stamped onto notices.
    pub fn context(&self) -> &AppContext {
        self.inner.dispatcher.context()
    }

    /// Check if an ignored profile is active, making submissions no-ops.
    pub fn is_muted(&self) -> bool {
        self.inner.muted
    }

    /// Notices waiting for the next aggregation tick.
    pub fn buffered(&self) -> usize {
        self.inner.dispatcher.buffered()
    }

    /// Deliveries waiting for a worker.
    pub fn pending_deliveries(&self) -> usize {
        self.inner.pool.pending()
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("signatures", &self.signature_count())
            .field("muted", &self.inner.muted)
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}
