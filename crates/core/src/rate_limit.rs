//! Fixed-window rate limiter.
//!
//! Every `(policy, key)` pair owns one counter. A counter admits up to
//! `max_requests` checks per window and starts a fresh window on the first
//! check at or after `window_start + window`. Callers may therefore see up to
//! twice the cap across a window boundary.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::policy::{Policy, PolicyTable};

/// Number of checks between opportunistic sweeps of stale counters
const DEFAULT_SWEEP_INTERVAL: u64 = 1024;

/// Identifies the caller a counter belongs to.
///
/// Subject ids and network addresses live in separate namespaces, so a
/// subject whose id looks like an address never shares a counter with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Use a caller-supplied key verbatim
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn for_subject(subject_id: &str) -> Self {
        Self(format!("subject:{subject_id}"))
    }

    pub fn for_address(addr: IpAddr) -> Self {
        Self(format!("ip:{addr}"))
    }

    /// Shared key for callers with neither a subject nor a known address
    pub fn unknown() -> Self {
        Self("ip:unknown".to_string())
    }

    /// Subject id when authenticated, else network address
    pub fn for_caller(subject_id: Option<&str>, addr: Option<IpAddr>) -> Self {
        match (subject_id, addr) {
            (Some(subject), _) => Self::for_subject(subject),
            (None, Some(addr)) => Self::for_address(addr),
            (None, None) => Self::unknown(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub admitted: bool,
    /// The policy's `max_requests`
    pub limit: u32,
    pub remaining: u32,
    /// End of the current window, epoch milliseconds
    pub reset_at: u64,
    /// Whole seconds until `reset_at`, at least 1
    #[serde(skip)]
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    /// `reset_at` rounded up to whole epoch seconds
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at.div_ceil(1000)
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    window_start: u64,
    count: u32,
}

/// Per-key fixed-window admission control
pub struct RateLimiter {
    policies: PolicyTable,
    counters: DashMap<(Policy, RateLimitKey), Counter>,
    clock: Arc<dyn Clock>,
    checks: AtomicU64,
    sweep_interval: u64,
}

impl RateLimiter {
    pub fn new(policies: PolicyTable) -> Self {
        Self::with_clock(policies, Arc::new(SystemClock))
    }

    pub fn with_clock(policies: PolicyTable, clock: Arc<dyn Clock>) -> Self {
        Self {
            policies,
            counters: DashMap::new(),
            clock,
            checks: AtomicU64::new(0),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Run a sweep every `interval` checks (`0` disables lazy sweeping)
    pub fn sweep_every(mut self, interval: u64) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Consume one request slot for `key` under `policy`.
    ///
    /// The read-modify-write runs under the map's per-shard lock, so two
    /// concurrent checks for the same key can never both take the last slot.
    pub fn check(&self, policy: Policy, key: &RateLimitKey) -> RateLimitDecision {
        let limits = self.policies.get(policy);
        let window = limits.window_millis();
        let max = limits.max_requests();
        let now = self.clock.now_millis();

        let decision = {
            let mut counter = self
                .counters
                .entry((policy, key.clone()))
                .or_insert(Counter {
                    window_start: now,
                    count: 0,
                });

            if now >= counter.window_start.saturating_add(window) {
                counter.window_start = now;
                counter.count = 0;
            }

            let reset_at = counter.window_start.saturating_add(window);
            let admitted = counter.count < max;
            if admitted {
                counter.count += 1;
            }

            RateLimitDecision {
                admitted,
                limit: max,
                remaining: max - counter.count,
                reset_at,
                retry_after_secs: retry_after_secs(reset_at, now),
            }
        };

        if !decision.admitted {
            tracing::debug!(policy = %policy, key = %key, reset_at = decision.reset_at, "rate limit denied");
        }

        self.maybe_sweep();
        decision
    }

    /// Report the quota `check` would see, without consuming a slot
    pub fn peek(&self, policy: Policy, key: &RateLimitKey) -> RateLimitDecision {
        let limits = self.policies.get(policy);
        let window = limits.window_millis();
        let max = limits.max_requests();
        let now = self.clock.now_millis();

        let active = self
            .counters
            .get(&(policy, key.clone()))
            .map(|c| *c)
            .filter(|c| now < c.window_start.saturating_add(window));

        let (remaining, reset_at) = match active {
            Some(counter) => (
                max.saturating_sub(counter.count),
                counter.window_start + window,
            ),
            None => (max, now.saturating_add(window)),
        };

        RateLimitDecision {
            admitted: remaining > 0,
            limit: max,
            remaining,
            reset_at,
            retry_after_secs: retry_after_secs(reset_at, now),
        }
    }

    /// Forget the counter for one key
    pub fn reset(&self, policy: Policy, key: &RateLimitKey) -> bool {
        self.counters.remove(&(policy, key.clone())).is_some()
    }

    /// Drop every counter whose window has ended.
    ///
    /// An ended window is indistinguishable from a missing counter on the
    /// next check, so removal never changes a decision. `retain` holds each
    /// shard's write lock while it runs.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.counters.len();
        self.counters.retain(|(policy, _), counter| {
            let window = self.policies.get(*policy).window_millis();
            now < counter.window_start.saturating_add(window)
        });
        let removed = before.saturating_sub(self.counters.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.counters.len(), "swept rate limit counters");
        }
        removed
    }

    /// Number of live counters
    pub fn tracked_keys(&self) -> usize {
        self.counters.len()
    }

    fn maybe_sweep(&self) {
        if self.sweep_interval == 0 {
            return;
        }
        let checks = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if checks % self.sweep_interval == 0 {
            self.sweep();
        }
    }
}

fn retry_after_secs(reset_at: u64, now: u64) -> u64 {
    reset_at.saturating_sub(now).div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::policy::RateLimitPolicy;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const START: u64 = 1_700_000_000_000;

    fn limiter(max: u32, window: Duration) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new(START);
        let policies = PolicyTable::default()
            .with(Policy::Public, RateLimitPolicy::new(window, max).unwrap());
        let limiter = RateLimiter::with_clock(policies, Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn test_three_per_minute_scenario() {
        let (limiter, clock) = limiter(3, Duration::from_secs(60));
        let key = RateLimitKey::new("ip-A");

        let mut remaining = Vec::new();
        for _ in 0..3 {
            let decision = limiter.check(Policy::Public, &key);
            assert!(decision.admitted);
            assert_eq!(decision.reset_at, START + 60_000);
            remaining.push(decision.remaining);
            clock.advance(Duration::from_secs(5));
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.check(Policy::Public, &key);
        assert!(!denied.admitted);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at, START + 60_000);
        assert_eq!(denied.limit, 3);
        assert_eq!(denied.retry_after_secs, 45);
    }

    #[test]
    fn test_remaining_strictly_decreases_until_denied() {
        let (limiter, _clock) = limiter(10, Duration::from_secs(1));
        let key = RateLimitKey::new("caller");

        let mut last = u32::MAX;
        for _ in 0..10 {
            let decision = limiter.check(Policy::Public, &key);
            assert!(decision.admitted);
            assert!(decision.remaining < last);
            last = decision.remaining;
        }
        assert!(!limiter.check(Policy::Public, &key).admitted);
    }

    #[test]
    fn test_window_elapsing_resets_counter() {
        let (limiter, clock) = limiter(2, Duration::from_secs(60));
        let key = RateLimitKey::new("ip-A");

        limiter.check(Policy::Public, &key);
        limiter.check(Policy::Public, &key);
        assert!(!limiter.check(Policy::Public, &key).admitted);

        clock.advance(Duration::from_secs(60));
        let decision = limiter.check(Policy::Public, &key);
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.reset_at, START + 120_000);
    }

    #[test]
    fn test_keys_are_isolated() {
        let (limiter, _clock) = limiter(1, Duration::from_secs(60));
        let a = RateLimitKey::new("a");
        let b = RateLimitKey::new("b");

        assert!(limiter.check(Policy::Public, &a).admitted);
        assert!(!limiter.check(Policy::Public, &a).admitted);

        let decision = limiter.check(Policy::Public, &b);
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_policies_are_isolated_for_same_key() {
        let (limiter, _clock) = limiter(1, Duration::from_secs(60));
        let key = RateLimitKey::new("a");

        assert!(limiter.check(Policy::Public, &key).admitted);
        assert!(!limiter.check(Policy::Public, &key).admitted);
        assert!(limiter.check(Policy::Write, &key).admitted);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let (limiter, _clock) = limiter(3, Duration::from_secs(60));
        let key = RateLimitKey::new("a");

        assert_eq!(limiter.peek(Policy::Public, &key).remaining, 3);
        assert_eq!(limiter.tracked_keys(), 0);

        limiter.check(Policy::Public, &key);
        assert_eq!(limiter.peek(Policy::Public, &key).remaining, 2);
        assert_eq!(limiter.peek(Policy::Public, &key).remaining, 2);
    }

    #[test]
    fn test_reset_forgets_counter() {
        let (limiter, _clock) = limiter(1, Duration::from_secs(60));
        let key = RateLimitKey::new("a");

        limiter.check(Policy::Public, &key);
        assert!(limiter.reset(Policy::Public, &key));
        assert!(limiter.check(Policy::Public, &key).admitted);
    }

    #[test]
    fn test_sweep_drops_only_expired_counters() {
        let (limiter, clock) = limiter(5, Duration::from_secs(60));

        limiter.check(Policy::Public, &RateLimitKey::new("old"));
        clock.advance(Duration::from_secs(30));
        limiter.check(Policy::Public, &RateLimitKey::new("fresh"));
        clock.advance(Duration::from_secs(31));

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.peek(Policy::Public, &RateLimitKey::new("fresh")).remaining, 4);
    }

    #[test]
    fn test_lazy_sweep_bounds_key_cardinality() {
        let (limiter, clock) = limiter(5, Duration::from_secs(1));
        let limiter = limiter.sweep_every(10);

        for i in 0..9 {
            limiter.check(Policy::Public, &RateLimitKey::new(format!("ip-{i}")));
        }
        assert_eq!(limiter.tracked_keys(), 9);

        clock.advance(Duration::from_secs(2));
        // 10th check triggers a sweep; only its own counter survives
        limiter.check(Policy::Public, &RateLimitKey::new("ip-new"));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_caller_keys_do_not_collide() {
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let by_subject = RateLimitKey::for_caller(Some("10.0.0.1"), None);
        let by_address = RateLimitKey::for_caller(None, Some(addr));

        assert_ne!(by_subject, by_address);
        assert_eq!(by_address.as_str(), "ip:10.0.0.1");
        assert_eq!(
            RateLimitKey::for_caller(Some("u-1"), Some(addr)).as_str(),
            "subject:u-1"
        );
        assert_eq!(RateLimitKey::for_caller(None, None), RateLimitKey::unknown());
    }

    #[test]
    fn test_concurrent_checks_never_exceed_cap() {
        let (limiter, _clock) = limiter(50, Duration::from_secs(60));
        let limiter = Arc::new(limiter);
        let key = RateLimitKey::new("shared");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let key = key.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| limiter.check(Policy::Public, &key).admitted)
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
