//! Dispatcher: fans a let-through event out to its channels.
//!
//! Immediate channels get one pool task per notice. Aggregating channels get
//! the notice appended to their kind's buffer, which the aggregation
//! scheduler drains on its own cadence. Nothing here waits on a channel.

use crate::application::channels::ChannelRegistry;
use crate::application::metrics::Metrics;
use crate::application::ports::{AggregatingChannel, Channel};
use crate::application::pool::{Job, WorkerPool};
use crate::domain::content::{AppContext, Batch, Notice, Renderer};
use crate::domain::event::{EventKind, NoticeEvent};
use crate::domain::throttle::ThrottleDecision;
use crate::error::DeliveryError;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Buffer of notices waiting for the next aggregation tick.
#[derive(Debug, Default)]
pub struct ChannelBuffer {
    queue: Mutex<VecDeque<Arc<Notice>>>,
}

impl ChannelBuffer {
    /// Append a notice.
    pub fn push(&self, notice: Arc<Notice>) {
        self.queue.lock().push_back(notice);
    }

    /// Take everything buffered so far, oldest first.
    pub fn drain(&self) -> Vec<Arc<Notice>> {
        let drained = std::mem::take(&mut *self.queue.lock());
        drained.into()
    }

    /// Number of buffered notices.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Routes notices to channels through the worker pool.
pub struct Dispatcher {
    channels: Arc<ChannelRegistry>,
    renderers: HashMap<EventKind, Arc<dyn Renderer>>,
    context: Arc<AppContext>,
    buffers: HashMap<EventKind, ChannelBuffer>,
    pool: Arc<WorkerPool>,
    metrics: Metrics,
}

impl Dispatcher {
    /// Create a dispatcher.
    ///
    /// One buffer is created up front for every kind that has an aggregating
    /// channel.
    pub fn new(
        channels: Arc<ChannelRegistry>,
        renderers: HashMap<EventKind, Arc<dyn Renderer>>,
        context: Arc<AppContext>,
        pool: Arc<WorkerPool>,
        metrics: Metrics,
    ) -> Self {
        let buffers = channels
            .aggregating_kinds()
            .map(|kind| (kind, ChannelBuffer::default()))
            .collect();

        Self {
            channels,
            renderers,
            context,
            buffers,
            pool,
            metrics,
        }
    }

    /// Route an event the throttle let through.
    ///
    /// Attaches the frequency description, renders content, then buffers the
    /// notice for aggregating channels and enqueues one delivery per immediate
    /// channel. Events with no channel or no usable renderer are logged and
    /// dropped.
    pub fn route(&self, mut event: NoticeEvent, decision: &ThrottleDecision) {
        let kind = event.kind();
        if !self.channels.accepts(kind) {
            error!(
                kind = %kind,
                scene = event.scene(),
                "no channel registered for event kind, dropping notice"
            );
            self.metrics.record_dropped();
            return;
        }

        let Some(renderer) = self.renderers.get(&kind) else {
            error!(
                kind = %kind,
                scene = event.scene(),
                "no renderer registered for event kind, dropping notice"
            );
            self.metrics.record_dropped();
            return;
        };

        event.attach_frequency(decision.frequency.as_str());
        let content = match renderer.render(&event, &decision.frequency, &self.context) {
            Ok(content) => content,
            Err(err) => {
                error!(
                    kind = %kind,
                    scene = event.scene(),
                    error = %err,
                    "failed to render notice, dropping it"
                );
                self.metrics.record_dropped();
                return;
            }
        };

        let notice = Arc::new(Notice::new(event, content));
        if let Some(buffer) = self.buffers.get(&kind) {
            buffer.push(Arc::clone(&notice));
        }
        for channel in self.channels.immediate(kind) {
            self.deliver(Arc::clone(channel), Arc::clone(&notice));
        }
    }

    /// Enqueue delivery of one notice to one channel.
    pub fn deliver(&self, channel: Arc<dyn Channel>, notice: Arc<Notice>) {
        let label = channel.name().to_string();
        let metrics = self.metrics.clone();
        let task = async move {
            let start = Instant::now();
            let result = channel.notify(&notice).await;
            record_outcome(channel.name(), start, result, &metrics);
        };
        self.pool.submit(Job::new(label, task.boxed()));
    }

    /// Enqueue delivery of drained notices to one aggregating channel.
    ///
    /// A single notice goes out through [`Channel::notify`]; several are
    /// combined into a [`Batch`].
    pub fn deliver_aggregated(
        &self,
        channel: Arc<dyn AggregatingChannel>,
        mut notices: Vec<Arc<Notice>>,
    ) {
        let label = channel.name().to_string();
        let metrics = self.metrics.clone();

        let task = if notices.len() == 1 {
            let notice = notices.remove(0);
            async move {
                let start = Instant::now();
                let result = channel.notify(&notice).await;
                record_outcome(channel.name(), start, result, &metrics);
            }
            .boxed()
        } else {
            let batch = Batch::new(notices, &self.context);
            async move {
                let start = Instant::now();
                let result = channel.notify_batch(&batch).await;
                record_outcome(channel.name(), start, result, &metrics);
            }
            .boxed()
        };

        self.pool.submit(Job::new(label, task));
    }

    /// Take every buffered notice, grouped by kind.
    pub fn drain_buffers(&self) -> Vec<(EventKind, Vec<Arc<Notice>>)> {
        self.buffers
            .iter()
            .map(|(kind, buffer)| (*kind, buffer.drain()))
            .filter(|(_, notices)| !notices.is_empty())
            .collect()
    }

    /// Number of notices waiting in aggregation buffers.
    pub fn buffered(&self) -> usize {
        self.buffers.values().map(ChannelBuffer::len).sum()
    }

    /// The channel registry.
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Context stamped onto rendered content.
    pub fn context(&self) -> &AppContext {
        &self.context
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.renderers.keys().copied().collect();
        kinds.sort();
        f.debug_struct("Dispatcher")
            .field("channels", &self.channels)
            .field("renderers", &kinds)
            .field("buffered", &self.buffered())
            .finish()
    }
}

fn record_outcome(
    channel: &str,
    start: Instant,
    result: Result<bool, DeliveryError>,
    metrics: &Metrics,
) {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(true) => metrics.record_delivered(),
        Ok(false) => {
            metrics.record_delivery_failed();
            warn!(channel, "channel reported notification was not delivered");
        }
        Err(err) => {
            metrics.record_delivery_failed();
            error!(channel, error = %err, "channel notification failed");
        }
    }
    info!(channel, elapsed_ms, "channel notification finished");
}
