//! Channel registry: which channels receive which event kinds.
//!
//! Filled while the notifier is being built and read-only afterwards, so
//! routing never takes a lock.

use crate::application::ports::{AggregatingChannel, Channel};
use crate::domain::event::EventKind;
use std::collections::HashMap;
use std::sync::Arc;

/// Channels partitioned by event kind and delivery mode.
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    immediate: HashMap<EventKind, Vec<Arc<dyn Channel>>>,
    aggregating: HashMap<EventKind, Vec<Arc<dyn AggregatingChannel>>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a channel to `kind`, delivering each notice as it happens.
    ///
    /// Registering the same channel instance twice for a kind has no effect.
    pub fn register(&mut self, kind: EventKind, channel: Arc<dyn Channel>) {
        let channels = self.immediate.entry(kind).or_default();
        if !channels.iter().any(|c| same_instance(c, &channel)) {
            channels.push(channel);
        }
    }

    /// Subscribe a channel to `kind`, delivering buffered notices each tick.
    ///
    /// Registering the same channel instance twice for a kind has no effect.
    pub fn register_aggregating(&mut self, kind: EventKind, channel: Arc<dyn AggregatingChannel>) {
        let channels = self.aggregating.entry(kind).or_default();
        if !channels.iter().any(|c| same_instance(c, &channel)) {
            channels.push(channel);
        }
    }

    /// Immediate channels subscribed to `kind`.
    pub fn immediate(&self, kind: EventKind) -> &[Arc<dyn Channel>] {
        self.immediate.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Aggregating channels subscribed to `kind`.
    pub fn aggregating(&self, kind: EventKind) -> &[Arc<dyn AggregatingChannel>] {
        self.aggregating.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Kinds with at least one aggregating channel.
    pub fn aggregating_kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.aggregating
            .iter()
            .filter(|(_, channels)| !channels.is_empty())
            .map(|(kind, _)| *kind)
    }

    /// Check if any channel of either mode is subscribed to `kind`.
    pub fn accepts(&self, kind: EventKind) -> bool {
        !self.immediate(kind).is_empty() || !self.aggregating(kind).is_empty()
    }

    /// Check if any aggregating channel is registered at all.
    pub fn has_aggregating(&self) -> bool {
        self.aggregating_kinds().next().is_some()
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.immediate.values().map(Vec::len).sum::<usize>()
            + self.aggregating.values().map(Vec::len).sum::<usize>()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut immediate: Vec<_> = self
            .immediate
            .iter()
            .map(|(kind, channels)| {
                (*kind, channels.iter().map(|c| c.name().to_string()).collect::<Vec<_>>())
            })
            .collect();
        immediate.sort();
        let mut aggregating: Vec<_> = self
            .aggregating
            .iter()
            .map(|(kind, channels)| {
                (*kind, channels.iter().map(|c| c.name().to_string()).collect::<Vec<_>>())
            })
            .collect();
        aggregating.sort();

        f.debug_struct("ChannelRegistry")
            .field("immediate", &immediate)
            .field("aggregating", &aggregating)
            .finish()
    }
}

fn same_instance<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
