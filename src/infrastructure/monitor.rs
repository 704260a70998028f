//! Resource monitor: turns sustained resource breaches into notices.
//!
//! A [`ResourceProbe`] reports samples; the monitor keeps a consecutive-breach
//! counter per sample and submits a notice once a sample has stayed at or
//! above its limit for the required number of checks in a row. Any reading
//! under the limit resets the counter.

use crate::application::scheduler::TaskHandle;
use crate::domain::event::{NoticeEvent, SCENE_PROCESS_RESOURCE, SCENE_SYSTEM_RESOURCE};
use crate::infrastructure::notifier::Notifier;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

/// Whether a sample describes this process or the whole host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceScope {
    /// The running process (heap, file descriptors, threads).
    Process,
    /// The host (CPU load, memory, disk).
    System,
}

impl ResourceScope {
    /// Scene used for notices about this scope.
    pub fn scene(&self) -> &'static str {
        match self {
            ResourceScope::Process => SCENE_PROCESS_RESOURCE,
            ResourceScope::System => SCENE_SYSTEM_RESOURCE,
        }
    }
}

/// One reading of a monitored resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSample {
    /// Resource name, e.g. `"cpu load"`.
    pub name: String,
    /// Process or host.
    pub scope: ResourceScope,
    /// Observed ratio or count.
    pub value: f64,
    /// Breach threshold. Zero or negative disables the sample.
    pub limit: f64,
    /// Breaches in a row needed before notifying.
    pub consecutive: u32,
    /// Extra fields copied into the notice.
    pub details: Vec<(String, String)>,
}

impl ResourceSample {
    /// A sample that notifies on its first breach.
    pub fn new(scope: ResourceScope, name: impl Into<String>, value: f64, limit: f64) -> Self {
        Self {
            name: name.into(),
            scope,
            value,
            limit,
            consecutive: 1,
            details: Vec::new(),
        }
    }

    /// Require `count` breaches in a row.
    pub fn with_consecutive(mut self, count: u32) -> Self {
        self.consecutive = count;
        self
    }

    /// Add a detail field.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    fn counter_key(&self) -> (ResourceScope, String) {
        (self.scope, self.name.clone())
    }

    fn is_breach(&self) -> bool {
        self.value >= self.limit
    }

    fn into_event(self, breaches: u32) -> NoticeEvent {
        let description = format!(
            "{} outside normal range (0 ~ {})",
            self.name,
            format_reading(self.limit)
        );
        let event = NoticeEvent::new(self.scope.scene())
            .with_unique_code(self.name.clone())
            .with_message(description.clone())
            .with_field("description", description)
            .with_field("observed", format_reading(self.value))
            .with_field("consecutive breaches", breaches.to_string());
        self.details
            .into_iter()
            .fold(event, |event, (key, value)| event.with_field(key, value))
    }
}

fn format_reading(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

/// Source of resource samples.
///
/// Called from a blocking-capable thread, so it may read `/proc` or similar.
pub trait ResourceProbe: Send + Sync {
    /// Take one reading of every monitored resource.
    fn sample(&self) -> Vec<ResourceSample>;
}

impl<F> ResourceProbe for F
where
    F: Fn() -> Vec<ResourceSample> + Send + Sync,
{
    fn sample(&self) -> Vec<ResourceSample> {
        self()
    }
}

/// Polls a probe and submits breach notices.
pub struct ResourceMonitor {
    probe: Arc<dyn ResourceProbe>,
    notifier: Notifier,
    breaches: Mutex<HashMap<(ResourceScope, String), u32>>,
}

impl ResourceMonitor {
    /// Create a monitor submitting to `notifier`.
    pub fn new(probe: Arc<dyn ResourceProbe>, notifier: Notifier) -> Self {
        Self {
            probe,
            notifier,
            breaches: Mutex::new(HashMap::new()),
        }
    }

    /// Take one round of samples. Returns the number of notices submitted.
    pub fn check(&self) -> usize {
        let mut submitted = 0;
        for sample in self.probe.sample() {
            if sample.limit <= 0.0 {
                continue;
            }

            let key = sample.counter_key();
            let fire = {
                let mut breaches = self.breaches.lock();
                if sample.is_breach() {
                    let count = breaches.entry(key).or_insert(0);
                    *count += 1;
                    let fired = *count;
                    if fired >= sample.consecutive.max(1) {
                        *count = 0;
                        Some(fired)
                    } else {
                        None
                    }
                } else {
                    breaches.remove(&key);
                    None
                }
            };

            if let Some(count) = fire {
                debug!(
                    resource = %sample.name,
                    value = sample.value,
                    limit = sample.limit,
                    "resource limit breached"
                );
                self.notifier.submit(sample.into_event(count));
                submitted += 1;
            }
        }
        submitted
    }

    /// Current consecutive-breach count for a resource.
    pub fn breaches(&self, scope: ResourceScope, name: &str) -> u32 {
        self.breaches
            .lock()
            .get(&(scope, name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Check every `period` on `runtime` until the handle is shut down.
    pub fn start(self: Arc<Self>, period: Duration, runtime: &Handle) -> TaskHandle {
        TaskHandle::spawn(runtime, move |mut shutdown_rx| async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let monitor = Arc::clone(&self);
                        if let Err(err) = tokio::task::spawn_blocking(move || monitor.check()).await {
                            error!(error = %err, "resource check failed");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        debug!("resource monitor stopped");
                        break;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("tracked", &self.breaches.lock().len())
            .finish()
    }
}
