//! Aggregation scheduler: periodic drain of aggregation buffers.
//!
//! Each tick takes everything buffered for every kind and hands it to that
//! kind's aggregating channels through the worker pool. Ticks never overlap:
//! a tick that finds the previous one still draining is skipped.

use crate::application::dispatcher::Dispatcher;
use crate::error::ShutdownError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Drains aggregation buffers on a fixed period.
#[derive(Debug)]
pub struct AggregationScheduler {
    dispatcher: Arc<Dispatcher>,
    period: Duration,
    draining: AtomicBool,
}

impl AggregationScheduler {
    /// Create a scheduler ticking every `period`.
    pub fn new(dispatcher: Arc<Dispatcher>, period: Duration) -> Self {
        Self {
            dispatcher,
            period,
            draining: AtomicBool::new(false),
        }
    }

    /// Drain all buffers once.
    ///
    /// Returns the number of notices handed to channels, or `None` if another
    /// drain was already running and this tick was skipped.
    pub fn tick(&self) -> Option<usize> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("previous aggregation still draining, skipping tick");
            return None;
        }
        let _guard = DrainGuard(&self.draining);

        let mut drained = 0;
        for (kind, notices) in self.dispatcher.drain_buffers() {
            drained += notices.len();
            for channel in self.dispatcher.channels().aggregating(kind) {
                self.dispatcher
                    .deliver_aggregated(Arc::clone(channel), notices.clone());
            }
        }

        if drained > 0 {
            debug!(notices = drained, "drained aggregation buffers");
        } else {
            trace!("aggregation tick found nothing buffered");
        }
        Some(drained)
    }

    /// Check if a drain is in progress.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run ticks on `runtime` until the returned handle is shut down.
    ///
    /// The first tick fires one period after start. Shutdown runs a final
    /// tick so nothing buffered is lost.
    pub fn start(self: Arc<Self>, runtime: &Handle) -> TaskHandle {
        TaskHandle::spawn(runtime, move |mut shutdown_rx| async move {
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick();
                    }
                    _ = &mut shutdown_rx => {
                        self.tick();
                        debug!("aggregation scheduler stopped");
                        break;
                    }
                }
            }
        })
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to a periodic background task.
///
/// Dropping the handle also signals the task to stop, but without waiting for
/// it; prefer [`shutdown`](TaskHandle::shutdown).
#[derive(Debug)]
pub struct TaskHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `body` with the receiving end of its shutdown signal.
    pub fn spawn<F, Fut>(runtime: &Handle, body: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = runtime.spawn(body(shutdown_rx));
        Self {
            shutdown_tx: Some(shutdown_tx),
            join,
        }
    }

    /// Signal the task to stop and wait for it.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown_tx.take() {
            // The task may already be gone; the join below reports how.
            let _ = tx.send(());
        }
        self.join.await?;
        Ok(())
    }

    /// Check if the task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::channels::ChannelRegistry;
    use crate::application::metrics::Metrics;
    use crate::application::pool::WorkerPool;
    use crate::domain::content::{AppContext, DefaultRenderer, Renderer};
    use crate::domain::event::{EventKind, NoticeEvent};
    use crate::domain::throttle::ThrottleDecision;
    use crate::infrastructure::mocks::RecordingChannel;
    use std::collections::HashMap;

    fn setup(mail: &Arc<RecordingChannel>) -> (Arc<Dispatcher>, Arc<WorkerPool>) {
        let mut channels = ChannelRegistry::new();
        channels.register_aggregating(EventKind::Notice, mail.clone());
        let metrics = Metrics::new();
        let pool = Arc::new(WorkerPool::start(1, 64, metrics.clone(), &Handle::current()));
        let mut renderers: HashMap<EventKind, Arc<dyn Renderer>> = HashMap::new();
        renderers.insert(EventKind::Notice, Arc::new(DefaultRenderer));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(channels),
            renderers,
            Arc::new(AppContext::new("svc", ["test"])),
            Arc::clone(&pool),
            metrics,
        ));
        (dispatcher, pool)
    }

    fn route(dispatcher: &Dispatcher, scene: &str) {
        dispatcher.route(
            NoticeEvent::new(scene),
            &ThrottleDecision::notify("first occurrence"),
        );
    }

    #[tokio::test]
    async fn test_tick_sends_single_notice_unbatched() {
        let mail = Arc::new(RecordingChannel::new("mail"));
        let (dispatcher, pool) = setup(&mail);
        let scheduler = AggregationScheduler::new(Arc::clone(&dispatcher), Duration::from_secs(60));

        route(&dispatcher, "a");
        assert_eq!(scheduler.tick(), Some(1));
        assert_eq!(scheduler.tick(), Some(0));

        pool.shutdown().await.unwrap();
        assert_eq!(mail.notices().len(), 1);
        assert!(mail.batches().is_empty());
    }

    #[tokio::test]
    async fn test_tick_batches_multiple_notices() {
        let mail = Arc::new(RecordingChannel::new("mail"));
        let (dispatcher, pool) = setup(&mail);
        let scheduler = AggregationScheduler::new(Arc::clone(&dispatcher), Duration::from_secs(60));

        route(&dispatcher, "a");
        route(&dispatcher, "b");
        route(&dispatcher, "c");
        assert_eq!(scheduler.tick(), Some(3));

        pool.shutdown().await.unwrap();
        let batches = mail.batches();
        assert_eq!(batches.len(), 1);
        let scenes: Vec<_> = batches[0]
            .notices()
            .iter()
            .map(|n| n.event().scene().to_string())
            .collect();
        assert_eq!(scenes, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let mail = Arc::new(RecordingChannel::new("mail"));
        let (dispatcher, pool) = setup(&mail);
        let scheduler = AggregationScheduler::new(Arc::clone(&dispatcher), Duration::from_secs(60));

        route(&dispatcher, "a");
        scheduler.draining.store(true, Ordering::Release);
        assert_eq!(scheduler.tick(), None);
        assert_eq!(dispatcher.buffered(), 1);

        scheduler.draining.store(false, Ordering::Release);
        assert_eq!(scheduler.tick(), Some(1));
        assert!(!scheduler.is_draining());
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_scheduler_ticks_and_drains_on_shutdown() {
        let mail = Arc::new(RecordingChannel::new("mail"));
        let (dispatcher, pool) = setup(&mail);
        let scheduler = Arc::new(AggregationScheduler::new(
            Arc::clone(&dispatcher),
            Duration::from_secs(60),
        ));
        let handle = Arc::clone(&scheduler).start(&Handle::current());

        route(&dispatcher, "a");
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(dispatcher.buffered(), 0);

        route(&dispatcher, "b");
        route(&dispatcher, "c");
        handle.shutdown().await.unwrap();
        assert_eq!(dispatcher.buffered(), 0);

        pool.shutdown().await.unwrap();
        assert_eq!(mail.notices().len(), 1);
        assert_eq!(mail.batches().len(), 1);
    }
}
