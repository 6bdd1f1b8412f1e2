//! Retry policy for one logical upstream call.
//!
//! The executor asks [`RetryConfig::next_delay`] after every failed attempt
//! and either sleeps for the returned delay or reports the final result.
//! Nothing above the executor retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;
use crate::http_client::{HttpErrorKind, HttpMethod};

/// What went wrong on the attempt being considered for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTrigger {
    Status(u16),
    Timeout,
    Connect,
}

impl RetryTrigger {
    /// Transport failures that may be transient; body and other errors are not.
    pub const fn from_error_kind(kind: HttpErrorKind) -> Option<Self> {
        match kind {
            HttpErrorKind::Timeout => Some(Self::Timeout),
            HttpErrorKind::Connect => Some(Self::Connect),
            HttpErrorKind::Body | HttpErrorKind::Other => None,
        }
    }
}

/// Randomization applied on top of an exponential delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    #[default]
    None,
    /// Uniform in `0..=delay`.
    Full,
    /// Half the delay plus a uniform share of the other half.
    Equal,
}

impl Jitter {
    fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(fastrand::u64(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + fastrand::u64(0..=millis - half))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed {
        #[serde(rename = "delay_ms", with = "duration_ms")]
        delay: Duration,
    },
    /// `initial * multiplier^retry`, capped at `cap`.
    Exponential {
        #[serde(rename = "initial_ms", with = "duration_ms")]
        initial: Duration,
        multiplier: f64,
        #[serde(rename = "cap_ms", with = "duration_ms")]
        cap: Duration,
        #[serde(default)]
        jitter: Jitter,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(8),
            jitter: Jitter::None,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0 for the first retry).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                initial,
                multiplier,
                cap,
                jitter,
            } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let seconds = (initial.as_secs_f64() * multiplier.powi(exponent))
                    .min(cap.as_secs_f64())
                    .max(0.0);
                jitter.apply(Duration::from_secs_f64(seconds))
            }
        }
    }
}

/// Retry budget and allow-lists for the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Backoff,
    pub retry_on_status: Vec<u16>,
    /// Methods safe to replay.
    pub retry_methods: Vec<HttpMethod>,
    pub retry_on_timeout: bool,
    pub retry_on_connect: bool,
    /// Waits at least as long as a `Retry-After` header asks.
    pub respect_retry_after: bool,
    /// A `Retry-After` longer than this ends the retry loop instead.
    #[serde(rename = "max_retry_after_ms", with = "duration_ms")]
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::default(),
            retry_on_status: vec![429, 502, 503, 504],
            retry_methods: vec![HttpMethod::Get, HttpMethod::Head],
            retry_on_timeout: true,
            retry_on_connect: true,
            respect_retry_after: true,
            max_retry_after: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts one logical call may make.
    pub const fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    pub fn retries_on(&self, trigger: RetryTrigger) -> bool {
        match trigger {
            RetryTrigger::Status(status) => self.retry_on_status.contains(&status),
            RetryTrigger::Timeout => self.retry_on_timeout,
            RetryTrigger::Connect => self.retry_on_connect,
        }
    }

    /// Delay before the next attempt, or `None` when the call should stop.
    ///
    /// `attempts` is the number of attempts already made.
    pub fn next_delay(
        &self,
        method: HttpMethod,
        trigger: RetryTrigger,
        attempts: u32,
        retry_after: Option<Duration>,
    ) -> Option<Duration> {
        if !self.enabled
            || attempts >= self.max_attempts()
            || !self.retry_methods.contains(&method)
            || !self.retries_on(trigger)
        {
            return None;
        }

        let backoff = self.backoff.delay(attempts.saturating_sub(1));
        match retry_after.filter(|_| self.respect_retry_after) {
            Some(requested) if requested > self.max_retry_after => None,
            Some(requested) => Some(backoff.max(requested)),
            None => Some(backoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET: HttpMethod = HttpMethod::Get;

    #[test]
    fn exponential_backoff_doubles_until_capped() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            cap: Duration::from_secs(1),
            jitter: Jitter::None,
        };

        let delays: Vec<u128> = (0..5).map(|retry| backoff.delay(retry).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000]);
    }

    #[test]
    fn jitter_stays_within_its_band() {
        let base = Duration::from_millis(400);
        for _ in 0..50 {
            assert!(Jitter::Full.apply(base) <= base);
            let equal = Jitter::Equal.apply(base);
            assert!(equal >= Duration::from_millis(200) && equal <= base, "{equal:?}");
        }
    }

    #[test]
    fn default_policy_retries_transient_statuses_on_idempotent_methods() {
        let config = RetryConfig::default();

        assert_eq!(config.max_attempts(), 4);
        for status in [429, 502, 503, 504] {
            assert!(config.next_delay(GET, RetryTrigger::Status(status), 1, None).is_some());
        }
        for status in [400, 401, 403, 404, 500] {
            assert_eq!(config.next_delay(GET, RetryTrigger::Status(status), 1, None), None);
        }
        assert!(config
            .next_delay(HttpMethod::Head, RetryTrigger::Status(503), 1, None)
            .is_some());

        let get_excluded = RetryConfig {
            retry_methods: vec![HttpMethod::Head],
            ..RetryConfig::default()
        };
        assert_eq!(
            get_excluded.next_delay(GET, RetryTrigger::Status(503), 1, None),
            None
        );
    }

    #[test]
    fn attempt_budget_is_enforced() {
        let config = RetryConfig::fixed(Duration::from_millis(5), 2);

        assert_eq!(
            config.next_delay(GET, RetryTrigger::Timeout, 2, None),
            Some(Duration::from_millis(5))
        );
        assert_eq!(config.next_delay(GET, RetryTrigger::Timeout, 3, None), None);
    }

    #[test]
    fn disabled_policy_never_retries() {
        let config = RetryConfig::no_retry();

        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.next_delay(GET, RetryTrigger::Connect, 1, None), None);
    }

    #[test]
    fn retry_after_raises_delay_or_stops_when_too_long() {
        let config = RetryConfig::fixed(Duration::from_millis(10), 3);

        assert_eq!(
            config.next_delay(GET, RetryTrigger::Status(429), 1, Some(Duration::from_secs(2))),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            config.next_delay(GET, RetryTrigger::Status(429), 1, Some(Duration::from_secs(120))),
            None
        );

        let ignoring = RetryConfig {
            respect_retry_after: false,
            ..config
        };
        assert_eq!(
            ignoring.next_delay(GET, RetryTrigger::Status(429), 1, Some(Duration::from_secs(120))),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn transport_errors_map_to_triggers() {
        assert_eq!(
            RetryTrigger::from_error_kind(HttpErrorKind::Timeout),
            Some(RetryTrigger::Timeout)
        );
        assert_eq!(RetryTrigger::from_error_kind(HttpErrorKind::Body), None);
    }

    #[test]
    fn policy_deserializes_from_millisecond_fields() {
        let config: RetryConfig = serde_json::from_str(
            r#"{"max_retries":1,"backoff":{"kind":"exponential","initial_ms":250,"multiplier":2.0,"cap_ms":4000,"jitter":"equal"}}"#,
        )
        .expect("valid retry json");

        assert_eq!(config.max_attempts(), 2);
        assert!(config.enabled);
        assert_eq!(config.max_retry_after, Duration::from_secs(30));
        let delay = config.backoff.delay(1);
        assert!(delay >= Duration::from_millis(250) && delay <= Duration::from_millis(500));
    }
}
