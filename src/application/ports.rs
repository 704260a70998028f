//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::content::{Batch, Notice};
use crate::error::DeliveryError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Instant;

/// Candidate entry for eviction consideration.
///
/// Values are copied out of the map so no guard is held while the policy
/// decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate<K> {
    /// The key of the entry
    pub key: K,
    /// When the entry last let a notice through, if ever
    pub last_notify: Option<Instant>,
}

/// Port for eviction policy decisions.
///
/// The registry asks the policy whether it has grown too large, then hands it
/// every entry and removes the keys it returns.
pub trait EvictionPolicy<K>: Send + Sync + Debug {
    /// Check if eviction should be triggered at this size.
    fn should_evict(&self, current_entries: usize) -> bool;

    /// Pick the keys to remove so the registry shrinks back to its cap.
    fn select_victims(&self, candidates: Vec<EvictionCandidate<K>>) -> Vec<K>;
}

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for concurrent key-value storage.
///
/// Values are handles (typically `Arc`s) that callers clone out and lock on
/// their own, so no storage guard outlives a call.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Return the value for `key`, creating it with `factory` if absent.
    ///
    /// Concurrent callers racing on the same absent key all observe the one
    /// value that won.
    fn get_or_insert_with(&self, key: K, factory: impl FnOnce() -> V) -> V;

    /// Look up a value.
    fn get(&self, key: &K) -> Option<V>;

    /// Remove a key and return its value.
    fn remove(&self, key: &K) -> Option<V>;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries, providing access to both key and value.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);
}

/// Port for a notification destination.
///
/// `Ok(true)` means delivered, `Ok(false)` a soft failure such as missing
/// configuration, and `Err` a transport failure. The dispatcher logs all three
/// and never retries.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Name used in log fields.
    fn name(&self) -> &str;

    /// Deliver one notice.
    async fn notify(&self, notice: &Notice) -> Result<bool, DeliveryError>;
}

/// A channel that receives buffered notices once per aggregation tick.
///
/// A tick that drained exactly one notice calls [`Channel::notify`]; more than
/// one calls [`notify_batch`](AggregatingChannel::notify_batch).
#[async_trait]
pub trait AggregatingChannel: Channel {
    /// Deliver several notices at once.
    async fn notify_batch(&self, batch: &Batch) -> Result<bool, DeliveryError>;
}
