//! Failed-claim monitor.
//!
//! Repeated rejected claims against the same token are a sign of someone
//! replaying or guessing tokens. The monitor keeps a sliding window of
//! failure timestamps per token and raises a signal once the count inside
//! the window reaches the threshold. It never changes a claim outcome.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use handoff_types::{ClaimConfig, TokenId, constants};

/// Raised when a token collects too many failed claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspiciousClaims {
    pub token_id: TokenId,
    /// Failures inside the current window, this one included.
    pub failures: usize,
    pub window: Duration,
}

#[derive(Debug)]
pub struct FailedClaimMonitor {
    /// `TokenId → timestamps of recent failures` (monotonically increasing).
    windows: HashMap<TokenId, VecDeque<DateTime<Utc>>>,
    window: Duration,
    threshold: usize,
    max_tracked: usize,
}

impl FailedClaimMonitor {
    #[must_use]
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            window,
            threshold,
            max_tracked: constants::DEFAULT_FAILED_CLAIM_MAX_TRACKED,
        }
    }

    #[must_use]
    pub fn from_config(config: &ClaimConfig) -> Self {
        Self::new(
            config.failed_claim_threshold,
            Duration::try_seconds(config.failed_claim_window_secs).unwrap_or(Duration::MAX),
        )
        .with_max_tracked(config.max_tracked_tokens)
    }

    /// Cap the number of tokens with a live window (at least one).
    #[must_use]
    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.max_tracked = max_tracked.max(1);
        self
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Record one rejected claim at `now`.
    pub fn record_failure(&mut self, token_id: TokenId, now: DateTime<Utc>) -> Option<SuspiciousClaims> {
        if !self.windows.contains_key(&token_id) && self.windows.len() >= self.max_tracked {
            self.make_room(now);
        }

        let cutoff = self.cutoff(now);
        let window = self.windows.entry(token_id).or_default();
        while window.front().is_some_and(|front| *front < cutoff) {
            window.pop_front();
        }
        window.push_back(now);

        let failures = window.len();
        if failures < self.threshold {
            return None;
        }
        tracing::warn!(
            token = %token_id.short(),
            failures,
            window_secs = self.window.num_seconds(),
            "repeated failed claims on token"
        );
        Some(SuspiciousClaims {
            token_id,
            failures,
            window: self.window,
        })
    }

    /// Free one slot: drop stale windows, then the token whose newest
    /// failure is oldest.
    fn make_room(&mut self, now: DateTime<Utc>) {
        self.prune(now);
        if self.windows.len() < self.max_tracked {
            return;
        }
        let quietest = self
            .windows
            .iter()
            .min_by_key(|(_, w)| w.back().copied())
            .map(|(id, _)| *id);
        if let Some(id) = quietest {
            self.windows.remove(&id);
            tracing::debug!(token = %id.short(), tracked = self.windows.len(), "failed-claim window evicted");
        }
    }

    /// Failures currently counted for `token_id`.
    #[must_use]
    pub fn failures(&self, token_id: &TokenId) -> usize {
        self.windows.get(token_id).map_or(0, VecDeque::len)
    }

    /// Drop windows whose newest failure is older than the window.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = self.cutoff(now);
        self.windows
            .retain(|_, w| w.back().is_some_and(|last| *last >= cutoff));
    }

    #[must_use]
    pub fn tracked_tokens(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(byte: u8) -> TokenId {
        TokenId::from_bytes([byte; 32])
    }

    #[test]
    fn below_threshold_is_quiet() {
        let mut monitor = FailedClaimMonitor::new(3, Duration::seconds(60));
        let now = Utc::now();
        assert!(monitor.record_failure(token(1), now).is_none());
        assert!(monitor.record_failure(token(1), now).is_none());
        assert_eq!(monitor.failures(&token(1)), 2);
    }

    #[test]
    fn threshold_raises_signal() {
        let mut monitor = FailedClaimMonitor::new(3, Duration::seconds(60));
        let now = Utc::now();
        for _ in 0..2 {
            monitor.record_failure(token(1), now);
        }
        let signal = monitor.record_failure(token(1), now).unwrap();
        assert_eq!(signal.failures, 3);
        assert_eq!(signal.token_id, token(1));
    }

    #[test]
    fn window_slides() {
        let mut monitor = FailedClaimMonitor::new(3, Duration::seconds(60));
        let start = Utc::now();
        monitor.record_failure(token(1), start);
        monitor.record_failure(token(1), start + Duration::seconds(10));
        // The first failure has left the window by now.
        let later = start + Duration::seconds(65);
        assert!(monitor.record_failure(token(1), later).is_none());
        assert_eq!(monitor.failures(&token(1)), 2);
    }

    #[test]
    fn tokens_counted_independently() {
        let mut monitor = FailedClaimMonitor::new(2, Duration::seconds(60));
        let now = Utc::now();
        monitor.record_failure(token(1), now);
        assert!(monitor.record_failure(token(2), now).is_none());
        assert!(monitor.record_failure(token(1), now).is_some());
    }

    #[test]
    fn prune_drops_stale_windows() {
        let mut monitor = FailedClaimMonitor::new(5, Duration::seconds(60));
        let now = Utc::now();
        monitor.record_failure(token(1), now);
        monitor.record_failure(token(2), now + Duration::seconds(90));
        monitor.prune(now + Duration::seconds(100));
        assert_eq!(monitor.tracked_tokens(), 1);
        assert_eq!(monitor.failures(&token(1)), 0);
    }

    #[test]
    fn failures_on_many_unknown_tokens_stay_bounded() {
        let mut monitor = FailedClaimMonitor::new(3, Duration::seconds(60)).with_max_tracked(4);
        let start = Utc::now();
        for i in 0..200u8 {
            monitor.record_failure(token(i), start + Duration::milliseconds(i64::from(i)));
            assert!(monitor.tracked_tokens() <= 4);
        }
        assert_eq!(monitor.tracked_tokens(), 4);
        // The most recent tokens survive.
        assert_eq!(monitor.failures(&token(199)), 1);
        assert_eq!(monitor.failures(&token(0)), 0);
    }

    #[test]
    fn eviction_spares_the_active_token() {
        let mut monitor = FailedClaimMonitor::new(3, Duration::seconds(60)).with_max_tracked(2);
        let now = Utc::now();
        monitor.record_failure(token(1), now);
        monitor.record_failure(token(2), now + Duration::seconds(1));
        monitor.record_failure(token(1), now + Duration::seconds(2));
        // Token 2 is now the quietest and makes room for token 3.
        monitor.record_failure(token(3), now + Duration::seconds(3));
        assert_eq!(monitor.failures(&token(2)), 0);
        let signal = monitor.record_failure(token(1), now + Duration::seconds(4)).unwrap();
        assert_eq!(signal.failures, 3);
    }

    #[test]
    fn stale_windows_are_freed_before_eviction() {
        let mut monitor = FailedClaimMonitor::new(3, Duration::seconds(60)).with_max_tracked(2);
        let now = Utc::now();
        monitor.record_failure(token(1), now);
        monitor.record_failure(token(2), now + Duration::seconds(30));
        monitor.record_failure(token(3), now + Duration::seconds(70));
        assert_eq!(monitor.failures(&token(1)), 0);
        assert_eq!(monitor.failures(&token(2)), 1);
        assert_eq!(monitor.tracked_tokens(), 2);
    }

    #[test]
    fn unbounded_window_does_not_overflow() {
        let mut monitor = FailedClaimMonitor::new(2, Duration::MAX);
        let now = Utc::now();
        monitor.record_failure(token(1), now);
        assert!(monitor.record_failure(token(1), now).is_some());
        monitor.prune(now);
        assert_eq!(monitor.tracked_tokens(), 1);
    }
}
