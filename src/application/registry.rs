//! Signature registry: per-signature throttle state with bounded size.
//!
//! Every evaluation counts towards a periodic sweep. Each
//! [`SWEEP_EVERY`] evaluations the registry checks its size against the
//! eviction policy and drops the signatures that notified longest ago.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, EvictionCandidate, EvictionPolicy, Storage};
use crate::domain::signature::SignatureKey;
use crate::domain::throttle::{ThrottleDecision, ThrottlePolicy, ThrottleState};
use crate::infrastructure::storage::ShardedStorage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Evaluations between two eviction sweeps.
pub const SWEEP_EVERY: usize = 10_000;

/// Default cap on tracked signatures.
pub const DEFAULT_MAX_SIGNATURES: usize = 10_000;

/// Shared, individually locked state of one signature.
pub type SharedState = Arc<Mutex<ThrottleState>>;

/// Default storage used by the notifier.
pub type DefaultStorage = Arc<ShardedStorage<SignatureKey, SharedState>>;

/// Registry of throttle state keyed by signature.
///
/// Lookups only take a shard lock long enough to clone the state handle; the
/// decision itself runs under that signature's own mutex, so unrelated
/// signatures never wait on each other.
#[derive(Debug)]
pub struct SignatureRegistry<S = DefaultStorage>
where
    S: Storage<SignatureKey, SharedState>,
{
    storage: S,
    clock: Arc<dyn Clock>,
    policy: ThrottlePolicy,
    eviction: Arc<dyn EvictionPolicy<SignatureKey>>,
    calls: AtomicUsize,
    metrics: Metrics,
}

impl<S> SignatureRegistry<S>
where
    S: Storage<SignatureKey, SharedState>,
{
    /// Create a registry.
    pub fn new(
        storage: S,
        clock: Arc<dyn Clock>,
        policy: ThrottlePolicy,
        eviction: Arc<dyn EvictionPolicy<SignatureKey>>,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            clock,
            policy,
            eviction,
            calls: AtomicUsize::new(0),
            metrics,
        }
    }

    /// Return the state for `key`, creating a fresh one if absent.
    pub fn get_or_create(&self, key: &SignatureKey) -> SharedState {
        self.storage.get_or_insert_with(key.clone(), || {
            Arc::new(Mutex::new(ThrottleState::new()))
        })
    }

    /// Record one occurrence of `key` now and decide whether to notify.
    pub fn evaluate(&self, key: &SignatureKey) -> ThrottleDecision {
        let state = self.get_or_create(key);
        let decision = {
            let mut state = state.lock();
            state.evaluate_with(self.clock.now(), &self.policy)
        };
        self.record_call();
        decision
    }

    fn record_call(&self) {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % SWEEP_EVERY == 0 {
            self.sweep();
        }
    }

    /// Evict signatures if the registry is over its cap.
    ///
    /// Returns the number of signatures removed. Runs automatically every
    /// [`SWEEP_EVERY`] evaluations.
    pub fn sweep(&self) -> usize {
        let size = self.storage.len();
        if !self.eviction.should_evict(size) {
            return 0;
        }

        let mut candidates = Vec::with_capacity(size);
        self.storage.for_each(|key, state| {
            candidates.push(EvictionCandidate {
                key: key.clone(),
                last_notify: state.lock().last_notify(),
            });
        });

        let victims = self.eviction.select_victims(candidates);
        let mut removed = 0;
        for key in &victims {
            if self.storage.remove(key).is_some() {
                self.metrics.record_eviction();
                removed += 1;
            }
        }

        debug!(
            evicted = removed,
            remaining = self.storage.len(),
            "swept signature registry"
        );
        removed
    }

    /// Copy of the current state of `key`, if tracked.
    pub fn snapshot(&self, key: &SignatureKey) -> Option<ThrottleState> {
        self.storage.get(key).map(|state| state.lock().clone())
    }

    /// Number of tracked signatures.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if no signatures are tracked.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Forget every signature.
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// The interval and threshold in force.
    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::eviction::LruEviction;
    use crate::infrastructure::mocks::MockClock;
    use std::thread;
    use std::time::{Duration, Instant};

    fn registry(max: usize, clock: MockClock) -> SignatureRegistry {
        SignatureRegistry::new(
            Arc::new(ShardedStorage::new()),
            Arc::new(clock),
            ThrottlePolicy::new(Duration::from_secs(100), 3).unwrap(),
            Arc::new(LruEviction::new(max)),
            Metrics::new(),
        )
    }

    fn key(n: usize) -> SignatureKey {
        SignatureKey::new("scene", Some(&n.to_string()), "")
    }

    #[test]
    fn test_get_or_create_returns_same_state() {
        let registry = registry(10, MockClock::new(Instant::now()));

        let a = registry.get_or_create(&key(1));
        let b = registry.get_or_create(&key(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_evaluate_uses_clock() {
        let clock = MockClock::new(Instant::now());
        let registry = registry(10, clock.clone());
        let k = key(1);

        assert!(registry.evaluate(&k).is_notify());
        clock.advance(Duration::from_secs(10));
        assert!(registry.evaluate(&k).is_suppress());
        clock.advance(Duration::from_secs(10));
        let decision = registry.evaluate(&k);
        assert!(decision.is_notify());
        assert_eq!(decision.frequency, "20s saw 3 occurrences (total 3)");

        let state = registry.snapshot(&k).unwrap();
        assert_eq!(state.total_count(), 3);
        assert_eq!(state.interval_count(), 1);
    }

    #[test]
    fn test_signatures_are_isolated() {
        let registry = registry(10, MockClock::new(Instant::now()));

        assert!(registry.evaluate(&key(1)).is_notify());
        assert!(registry.evaluate(&key(2)).is_notify());
        assert!(registry.evaluate(&key(1)).is_suppress());
        assert_eq!(registry.snapshot(&key(2)).unwrap().total_count(), 1);
    }

    #[test]
    fn test_sweep_keeps_most_recent() {
        let clock = MockClock::new(Instant::now());
        let registry = registry(3, clock.clone());

        for n in 0..5 {
            registry.evaluate(&key(n));
            clock.advance(Duration::from_secs(1));
        }

        assert_eq!(registry.sweep(), 2);
        assert_eq!(registry.len(), 3);
        assert!(registry.snapshot(&key(0)).is_none());
        assert!(registry.snapshot(&key(1)).is_none());
        assert!(registry.snapshot(&key(4)).is_some());
        assert_eq!(registry.metrics.signatures_evicted(), 2);
    }

    #[test]
    fn test_sweep_under_cap_is_noop() {
        let registry = registry(10, MockClock::new(Instant::now()));
        registry.evaluate(&key(1));
        assert_eq!(registry.sweep(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sweep_triggers_automatically() {
        let registry = registry(100, MockClock::new(Instant::now()));

        for n in 0..SWEEP_EVERY {
            registry.evaluate(&key(n));
        }

        assert_eq!(registry.len(), 100);
        assert_eq!(registry.metrics.signatures_evicted(), (SWEEP_EVERY - 100) as u64);
    }

    #[test]
    fn test_evicted_signature_starts_fresh() {
        let clock = MockClock::new(Instant::now());
        let registry = registry(1, clock.clone());

        registry.evaluate(&key(1));
        registry.evaluate(&key(1));
        clock.advance(Duration::from_secs(1));
        registry.evaluate(&key(2));
        registry.sweep();

        let decision = registry.evaluate(&key(1));
        assert_eq!(decision.frequency, "first occurrence");
        assert_eq!(registry.snapshot(&key(1)).unwrap().total_count(), 1);
    }

    #[test]
    fn test_concurrent_evaluations_count_every_hit() {
        let registry = Arc::new(registry(10, MockClock::new(Instant::now())));
        let k = key(1);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let k = k.clone();
                thread::spawn(move || {
                    let mut notified = 0;
                    for _ in 0..100 {
                        if registry.evaluate(&k).is_notify() {
                            notified += 1;
                        }
                    }
                    notified
                })
            })
            .collect();

        let notified: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        let state = registry.snapshot(&k).unwrap();
        assert_eq!(state.total_count(), 800);
        // first hit, then every second hit after it
        assert_eq!(notified, 400);
    }
}
