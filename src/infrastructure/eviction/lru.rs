//! Least-recently-notified eviction adapter.

use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// Evicts the signatures that notified longest ago once the registry exceeds
/// its cap.
///
/// Signatures that never notified sort first. Enough victims are chosen to
/// bring the registry back to exactly `max_entries`.
#[derive(Debug, Clone)]
pub struct LruEviction {
    /// Maximum number of entries kept after a sweep
    max_entries: usize,
}

impl LruEviction {
    /// Create a new policy with the given entry cap.
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// The entry cap.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K> EvictionPolicy<K> for LruEviction
where
    K: Send + Sync,
{
    fn should_evict(&self, current_entries: usize) -> bool {
        current_entries > self.max_entries
    }

    fn select_victims(&self, mut candidates: Vec<EvictionCandidate<K>>) -> Vec<K> {
        let excess = candidates.len().saturating_sub(self.max_entries);
        if excess == 0 {
            return Vec::new();
        }

        // None < Some, so never-notified entries go first
        candidates.sort_by_key(|candidate| candidate.last_notify);
        candidates
            .into_iter()
            .take(excess)
            .map(|candidate| candidate.key)
            .collect()
    }
}
