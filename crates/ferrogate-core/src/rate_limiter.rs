//! Dual-window admission control.
//!
//! A sustained 60-second window caps total calls at `max_per_minute`; a
//! shorter burst window caps spikes at `burst_limit`. Admission never rejects:
//! it returns the delay the caller must wait before issuing the call.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::duration_ms;
use crate::ValidationError;

/// Length of the sustained window.
pub const SUSTAINED_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_per_minute: u32,
    pub burst_limit: u32,
    #[serde(rename = "burst_window_ms", with = "duration_ms")]
    pub burst_window: Duration,
    /// Extra wait once the burst window is full.
    #[serde(rename = "burst_pause_ms", with = "duration_ms")]
    pub burst_pause: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 610,
            burst_limit: 50,
            burst_window: Duration::from_secs(10),
            burst_pause: Duration::from_millis(200),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_per_minute == 0 {
            return Err(ValidationError::ZeroValue {
                field: "rate_limit.max_per_minute",
            });
        }
        if self.burst_limit == 0 {
            return Err(ValidationError::ZeroValue {
                field: "rate_limit.burst_limit",
            });
        }
        if self.burst_window.is_zero() {
            return Err(ValidationError::ZeroValue {
                field: "rate_limit.burst_window_ms",
            });
        }
        Ok(())
    }

    /// Minimum spacing between consecutive calls, rounded up to whole nanoseconds.
    pub fn min_interval(&self) -> Duration {
        let per_minute = u64::from(self.max_per_minute.max(1));
        let window_nanos = SUSTAINED_WINDOW.as_nanos() as u64;
        Duration::from_nanos(window_nanos.div_ceil(per_minute))
    }
}

/// Snapshot of limiter usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub max_per_minute: u32,
    pub requests_this_minute: u32,
    pub remaining: u32,
    pub current_rate_per_minute: f64,
    pub utilization_percent: f64,
    pub burst_limit: u32,
    pub burst_count: u32,
    pub burst_remaining: u32,
    pub window_elapsed_secs: f64,
    pub seconds_until_reset: f64,
    pub seconds_until_burst_reset: f64,
}

#[derive(Debug, Default)]
struct RateWindow {
    window_start: Option<Instant>,
    count: u32,
    burst_window_start: Option<Instant>,
    burst_count: u32,
    last_request: Option<Instant>,
}

/// Thread-safe dual-window rate limiter.
///
/// All counters live in one [`Mutex`]. The `*_at` methods take the clock as
/// an argument; [`RateLimiter::acquire`] uses the wall clock and sleeps.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<RateWindow>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(RateWindow::default()),
        }
    }

    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Returns the wait required before a call may be issued at `now`.
    ///
    /// When the sustained window is full the window is restarted at the end
    /// of the returned wait, as if the caller had already slept.
    pub fn admit_at(&self, now: Instant) -> Duration {
        let mut window = self.lock();
        self.plan(&mut window, now)
    }

    /// Records one admitted call issued at `at`.
    pub fn commit_at(&self, at: Instant) {
        let mut window = self.lock();
        Self::record(&mut window, at);
    }

    /// Admission and commit in one critical section.
    ///
    /// The slot is reserved at `now + wait`, so concurrent callers queue
    /// behind each other instead of observing the same free slot.
    pub fn acquire_at(&self, now: Instant) -> Duration {
        let mut window = self.lock();
        let wait = self.plan(&mut window, now);
        Self::record(&mut window, now + wait);
        wait
    }

    /// Reserves a slot and sleeps until it is due.
    pub async fn acquire(&self) -> Duration {
        let wait = self.acquire_at(Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "rate limiter delaying call");
            tokio::time::sleep(wait).await;
        }
        wait
    }

    pub fn status(&self) -> RateLimitStatus {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> RateLimitStatus {
        let window = self.lock();
        let config = &self.config;

        let (count, window_elapsed, until_reset) = match window.window_start {
            Some(start) if now.saturating_duration_since(start) < SUSTAINED_WINDOW => (
                window.count,
                now.saturating_duration_since(start),
                (start + SUSTAINED_WINDOW).saturating_duration_since(now),
            ),
            _ => (0, Duration::ZERO, Duration::ZERO),
        };
        let (burst_count, until_burst_reset) = match window.burst_window_start {
            Some(start) if now.saturating_duration_since(start) < config.burst_window => (
                window.burst_count,
                (start + config.burst_window).saturating_duration_since(now),
            ),
            _ => (0, Duration::ZERO),
        };

        let elapsed_secs = window_elapsed.as_secs_f64();
        let current_rate_per_minute = if elapsed_secs >= 1.0 {
            f64::from(count) * 60.0 / elapsed_secs
        } else {
            f64::from(count)
        };

        RateLimitStatus {
            max_per_minute: config.max_per_minute,
            requests_this_minute: count,
            remaining: config.max_per_minute.saturating_sub(count),
            current_rate_per_minute,
            utilization_percent: f64::from(count) / f64::from(config.max_per_minute.max(1))
                * 100.0,
            burst_limit: config.burst_limit,
            burst_count,
            burst_remaining: config.burst_limit.saturating_sub(burst_count),
            window_elapsed_secs: elapsed_secs,
            seconds_until_reset: until_reset.as_secs_f64(),
            seconds_until_burst_reset: until_burst_reset.as_secs_f64(),
        }
    }

    fn plan(&self, window: &mut RateWindow, now: Instant) -> Duration {
        let config = &self.config;

        let sustained_expired = window
            .window_start
            .is_none_or(|start| now.saturating_duration_since(start) >= SUSTAINED_WINDOW);
        if sustained_expired {
            window.window_start = Some(now);
            window.count = 0;
        }
        let burst_expired = window
            .burst_window_start
            .is_none_or(|start| now.saturating_duration_since(start) >= config.burst_window);
        if burst_expired {
            window.burst_window_start = Some(now);
            window.burst_count = 0;
        }

        let mut wait = Duration::ZERO;
        if window.count >= config.max_per_minute {
            let start = window.window_start.unwrap_or(now);
            wait = (start + SUSTAINED_WINDOW).saturating_duration_since(now);
            let resumed_at = now + wait;
            window.window_start = Some(resumed_at);
            window.count = 0;
            if wait >= config.burst_window {
                window.burst_window_start = Some(resumed_at);
                window.burst_count = 0;
            }
            debug!(
                wait_ms = wait.as_millis() as u64,
                max_per_minute = config.max_per_minute,
                "sustained rate window full"
            );
        }

        if window.burst_count >= config.burst_limit {
            wait += config.burst_pause;
            debug!(
                burst_count = window.burst_count,
                burst_limit = config.burst_limit,
                "burst window full; pausing"
            );
        }

        if let Some(last) = window.last_request {
            let spacing = (last + config.min_interval()).saturating_duration_since(now);
            wait = wait.max(spacing);
        }

        wait
    }

    fn record(window: &mut RateWindow, at: Instant) {
        window.count = window.count.saturating_add(1);
        window.burst_count = window.burst_count.saturating_add(1);
        window.last_request = Some(window.last_request.map_or(at, |last| last.max(at)));
        if window.window_start.is_none() {
            window.window_start = Some(at);
        }
        if window.burst_window_start.is_none() {
            window.burst_window_start = Some(at);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateWindow> {
        self.window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_limiter(max_per_minute: u32, burst_limit: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_per_minute,
            burst_limit,
            burst_window: Duration::from_secs(10),
            burst_pause: Duration::from_millis(200),
        })
    }

    #[test]
    fn first_call_is_admitted_immediately() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.admit_at(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn min_interval_rounds_up() {
        let config = RateLimitConfig::default();
        assert_eq!(config.min_interval(), Duration::from_nanos(98_360_656));
        assert!(config.min_interval() * config.max_per_minute >= SUSTAINED_WINDOW);
    }

    #[test]
    fn enforces_minimum_spacing() {
        let limiter = build_limiter(600, 50);
        let t0 = Instant::now();

        assert_eq!(limiter.acquire_at(t0), Duration::ZERO);
        assert_eq!(limiter.admit_at(t0), Duration::from_millis(100));
        assert_eq!(
            limiter.admit_at(t0 + Duration::from_millis(40)),
            Duration::from_millis(60)
        );
        assert_eq!(limiter.admit_at(t0 + Duration::from_millis(150)), Duration::ZERO);
    }

    #[test]
    fn sustained_cap_waits_for_window_and_restarts_it() {
        let limiter = build_limiter(5, 100);
        let t0 = Instant::now();

        for second in 0..5 {
            let at = t0 + Duration::from_secs(second * 12);
            assert_eq!(limiter.acquire_at(at), Duration::ZERO);
        }

        let now = t0 + Duration::from_secs(50);
        let wait = limiter.acquire_at(now);
        assert_eq!(wait, Duration::from_secs(10));

        let status = limiter.status_at(now + wait);
        assert_eq!(status.requests_this_minute, 1);
        assert_eq!(status.remaining, 4);
    }

    #[test]
    fn window_resets_exactly_after_sixty_seconds() {
        let limiter = build_limiter(5, 100);
        let t0 = Instant::now();
        for step in 0..5 {
            limiter.acquire_at(t0 + Duration::from_secs(step));
        }

        assert!(limiter.admit_at(t0 + Duration::from_millis(59_999)) > Duration::ZERO);
        let fresh = build_limiter(5, 100);
        for step in 0..5 {
            fresh.acquire_at(t0 + Duration::from_secs(step));
        }
        assert_eq!(fresh.admit_at(t0 + SUSTAINED_WINDOW), Duration::ZERO);
    }

    #[test]
    fn full_burst_window_adds_pause() {
        let limiter = build_limiter(600, 50);
        let mut now = Instant::now();

        for _ in 0..50 {
            now += limiter.acquire_at(now);
        }
        let wait = limiter.acquire_at(now);

        assert!(wait >= Duration::from_millis(200), "wait={wait:?}");
    }

    #[test]
    fn committed_calls_never_exceed_cap_in_any_rolling_minute() {
        let limiter = build_limiter(600, 50);
        let mut now = Instant::now();
        let mut commits = Vec::new();

        for _ in 0..1_500 {
            now += limiter.acquire_at(now);
            commits.push(now);
        }

        for pair in commits.windows(601) {
            let span = pair[600].duration_since(pair[0]);
            assert!(span >= SUSTAINED_WINDOW, "601 calls within {span:?}");
        }
    }

    #[test]
    fn concurrent_acquires_reserve_distinct_slots() {
        let limiter = build_limiter(600, 50);
        let t0 = Instant::now();

        let first = limiter.acquire_at(t0);
        let second = limiter.acquire_at(t0);
        let third = limiter.acquire_at(t0);

        assert_eq!(first, Duration::ZERO);
        assert_eq!(second, Duration::from_millis(100));
        assert_eq!(third, Duration::from_millis(200));
        assert_eq!(limiter.status_at(t0).requests_this_minute, 3);
    }

    #[test]
    fn admit_without_commit_does_not_count() {
        let limiter = build_limiter(600, 50);
        let t0 = Instant::now();

        limiter.admit_at(t0);
        limiter.admit_at(t0);
        assert_eq!(limiter.status_at(t0).requests_this_minute, 0);

        limiter.commit_at(t0);
        let status = limiter.status_at(t0);
        assert_eq!(status.requests_this_minute, 1);
        assert_eq!(status.burst_count, 1);
        assert_eq!(status.burst_remaining, 49);
    }

    #[test]
    fn zero_limits_fail_validation() {
        let config = RateLimitConfig {
            max_per_minute: 0,
            ..RateLimitConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ZeroValue { .. })
        ));
    }
}
