//! Per-signature throttle state and the notify/suppress decision.
//!
//! Each signature owns a [`ThrottleState`]. A signature is let through the
//! first time it is seen, the first time it is seen after its window has
//! lapsed, and whenever it has been seen `threshold` times inside the current
//! window. Everything else is suppressed and only counted.

use crate::error::BuildError;
use std::time::{Duration, Instant};

/// Decision returned by [`ThrottleState::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleDecision {
    /// Whether the event should reach the channels.
    pub notify: bool,
    /// Human readable frequency summary. Empty when suppressed.
    pub frequency: String,
}

impl ThrottleDecision {
    /// Let the event through with a frequency description.
    pub fn notify(frequency: impl Into<String>) -> Self {
        Self {
            notify: true,
            frequency: frequency.into(),
        }
    }

    /// Suppress the event.
    pub fn suppress() -> Self {
        Self {
            notify: false,
            frequency: String::new(),
        }
    }

    /// Check if the decision lets the event through.
    pub fn is_notify(&self) -> bool {
        self.notify
    }

    /// Check if the decision suppresses the event.
    pub fn is_suppress(&self) -> bool {
        !self.notify
    }
}

/// Validated interval and threshold pair.
///
/// # Example
/// ```
/// use notice_throttle::ThrottlePolicy;
/// use std::time::Duration;
///
/// let policy = ThrottlePolicy::new(Duration::from_secs(3600), 5).unwrap();
/// assert_eq!(policy.threshold(), 5);
///
/// assert!(ThrottlePolicy::new(Duration::from_secs(3600), 0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    interval: Duration,
    threshold: u32,
}

impl ThrottlePolicy {
    /// Create a policy.
    ///
    /// # Errors
    /// Returns an error if `interval` is zero or `threshold` is zero.
    pub fn new(interval: Duration, threshold: u32) -> Result<Self, BuildError> {
        if interval.is_zero() {
            return Err(BuildError::ZeroInterval);
        }
        if threshold == 0 {
            return Err(BuildError::ZeroThreshold);
        }
        Ok(Self {
            interval,
            threshold,
        })
    }

    /// Length of a throttle window.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Occurrences inside one window that force a notification.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            threshold: 5,
        }
    }
}

/// Counters for one signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleState {
    total_count: u64,
    interval_count: u32,
    window_start: Option<Instant>,
    last_notify: Option<Instant>,
}

impl ThrottleState {
    /// Fresh state for a signature never seen before.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence at `now` and decide whether to notify.
    ///
    /// Callers must serialize calls for the same signature.
    pub fn evaluate(&mut self, now: Instant, interval: Duration, threshold: u32) -> ThrottleDecision {
        self.total_count = self.total_count.saturating_add(1);

        if let Some(start) = self.window_start {
            let elapsed = now.saturating_duration_since(start);
            if elapsed < interval {
                self.interval_count = self.interval_count.saturating_add(1);
                if self.interval_count < threshold {
                    return ThrottleDecision::suppress();
                }

                let frequency = format!(
                    "{} saw {} occurrences (total {})",
                    format_elapsed(elapsed),
                    self.interval_count,
                    self.total_count
                );
                self.open_window(now);
                return ThrottleDecision::notify(frequency);
            }
        }

        let frequency = match (self.last_notify, self.window_start) {
            (Some(_), Some(start)) => format!(
                "first occurrence since {} (total {})",
                format_elapsed(now.saturating_duration_since(start)),
                self.total_count
            ),
            _ => "first occurrence".to_string(),
        };
        self.open_window(now);
        ThrottleDecision::notify(frequency)
    }

    /// Same as [`evaluate`](Self::evaluate) with the values from a policy.
    pub fn evaluate_with(&mut self, now: Instant, policy: &ThrottlePolicy) -> ThrottleDecision {
        self.evaluate(now, policy.interval, policy.threshold)
    }

    fn open_window(&mut self, now: Instant) {
        self.window_start = Some(now);
        self.interval_count = 1;
        self.last_notify = Some(now);
    }

    /// Occurrences since the state was created.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Occurrences inside the current window, including the one that opened it.
    pub fn interval_count(&self) -> u32 {
        self.interval_count
    }

    /// When the current window opened.
    pub fn window_start(&self) -> Option<Instant> {
        self.window_start
    }

    /// When the signature last let a notice through.
    pub fn last_notify(&self) -> Option<Instant> {
        self.last_notify
    }
}

/// Format a duration as `1h 2m 3s`, or in milliseconds when under a second.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs == 0 {
        return format!("{}ms", elapsed.as_millis());
    }

    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(100);

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn test_first_occurrence_notifies() {
        let base = Instant::now();
        let mut state = ThrottleState::new();

        let decision = state.evaluate(base, INTERVAL, 3);
        assert!(decision.is_notify());
        assert_eq!(decision.frequency, "first occurrence");
        assert_eq!(state.total_count(), 1);
        assert_eq!(state.interval_count(), 1);
        assert_eq!(state.window_start(), Some(base));
        assert_eq!(state.last_notify(), Some(base));
    }

    #[test]
    fn test_window_scenario() {
        // interval 100s, threshold 3, hits at t = 0, 10, 20, 30, 125
        let base = Instant::now();
        let mut state = ThrottleState::new();

        assert!(state.evaluate(at(base, 0), INTERVAL, 3).is_notify());

        let d = state.evaluate(at(base, 10), INTERVAL, 3);
        assert!(d.is_suppress());
        assert!(d.frequency.is_empty());

        let d = state.evaluate(at(base, 20), INTERVAL, 3);
        assert!(d.is_notify());
        assert_eq!(d.frequency, "20s saw 3 occurrences (total 3)");
        assert_eq!(state.window_start(), Some(at(base, 20)));
        assert_eq!(state.interval_count(), 1);

        assert!(state.evaluate(at(base, 30), INTERVAL, 3).is_suppress());

        let d = state.evaluate(at(base, 125), INTERVAL, 3);
        assert!(d.is_notify());
        assert_eq!(d.frequency, "first occurrence since 1m 45s (total 5)");
        assert_eq!(state.window_start(), Some(at(base, 125)));
        assert_eq!(state.interval_count(), 1);
        assert_eq!(state.total_count(), 5);
    }

    #[test]
    fn test_threshold_one_notifies_every_time() {
        let base = Instant::now();
        let mut state = ThrottleState::new();

        assert!(state.evaluate(at(base, 0), INTERVAL, 1).is_notify());
        let d = state.evaluate(at(base, 1), INTERVAL, 1);
        assert!(d.is_notify());
        assert_eq!(d.frequency, "1s saw 2 occurrences (total 2)");
        assert_eq!(state.interval_count(), 1);
    }

    #[test]
    fn test_breach_inside_window_is_not_a_reset() {
        // t = 101 is only 81s after the window opened at t = 20
        let base = Instant::now();
        let mut state = ThrottleState::new();

        for secs in [0, 10, 20, 30] {
            state.evaluate(at(base, secs), INTERVAL, 3);
        }
        let d = state.evaluate(at(base, 101), INTERVAL, 3);
        assert!(d.is_notify());
        assert_eq!(d.frequency, "1m 21s saw 3 occurrences (total 5)");
        assert_eq!(state.window_start(), Some(at(base, 101)));
        assert_eq!(state.interval_count(), 1);
    }

    #[test]
    fn test_sixty_second_window_with_threshold_five() {
        // interval 60s, threshold 5
        let interval = Duration::from_secs(60);
        let base = Instant::now();
        let mut state = ThrottleState::new();

        let steps = [
            (0, true, 1, 0),
            (10, false, 2, 0),
            (20, false, 3, 0),
            (30, false, 4, 0),
            (40, true, 1, 40),
            (45, false, 2, 40),
            (101, true, 1, 101),
        ];
        for (secs, notify, interval_count, window_start) in steps {
            let d = state.evaluate(at(base, secs), interval, 5);
            assert_eq!(d.is_notify(), notify, "t = {secs}");
            assert_eq!(state.interval_count(), interval_count, "t = {secs}");
            assert_eq!(state.window_start(), Some(at(base, window_start)), "t = {secs}");
        }

        assert_eq!(state.total_count(), 7);
        assert_eq!(state.last_notify(), Some(at(base, 101)));
    }

    #[test]
    fn test_boundary_equal_to_interval_reopens_window() {
        let base = Instant::now();
        let mut state = ThrottleState::new();

        state.evaluate(at(base, 0), INTERVAL, 5);
        let d = state.evaluate(at(base, 100), INTERVAL, 5);
        assert!(d.is_notify());
        assert!(d.frequency.starts_with("first occurrence since 1m 40s"));
    }

    #[test]
    fn test_clock_going_backwards_counts_inside_window() {
        let base = Instant::now() + Duration::from_secs(1000);
        let mut state = ThrottleState::new();

        state.evaluate(base, INTERVAL, 5);
        let d = state.evaluate(base - Duration::from_secs(10), INTERVAL, 5);
        assert!(d.is_suppress());
        assert_eq!(state.interval_count(), 2);
    }

    #[test]
    fn test_counts_stay_consistent_over_many_hits() {
        let base = Instant::now();
        let mut state = ThrottleState::new();
        let mut notified = 0;

        for i in 0..50 {
            if state.evaluate(at(base, i), Duration::from_secs(1000), 5).is_notify() {
                notified += 1;
            }
            assert!(state.interval_count() >= 1);
            assert!(state.total_count() >= u64::from(state.interval_count()));
        }
        // first hit, then every fourth hit after it
        assert_eq!(notified, 13);
        assert_eq!(state.total_count(), 50);
    }

    #[test]
    fn test_evaluate_with_policy() {
        let base = Instant::now();
        let policy = ThrottlePolicy::new(INTERVAL, 2).unwrap();
        let mut state = ThrottleState::new();

        assert!(state.evaluate_with(base, &policy).is_notify());
        assert!(state.evaluate_with(at(base, 1), &policy).is_notify());
    }

    #[test]
    fn test_policy_validation() {
        assert_eq!(
            ThrottlePolicy::new(Duration::ZERO, 5),
            Err(BuildError::ZeroInterval)
        );
        assert_eq!(ThrottlePolicy::new(INTERVAL, 0), Err(BuildError::ZeroThreshold));

        let default = ThrottlePolicy::default();
        assert_eq!(default.interval(), Duration::from_secs(3600));
        assert_eq!(default.threshold(), 5);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(350)), "350ms");
        assert_eq!(format_elapsed(Duration::from_secs(40)), "40s");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "1h");
        assert_eq!(format_elapsed(Duration::from_secs(3661)), "1h 1m 1s");
        assert_eq!(format_elapsed(Duration::from_secs(120)), "2m");
    }
}
