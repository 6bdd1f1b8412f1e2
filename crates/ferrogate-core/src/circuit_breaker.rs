use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::duration_ms;
use crate::outcome::RequestOutcome;
use crate::ValidationError;

/// Runtime circuit state for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { probes_issued: u32 },
}

impl CircuitState {
    pub const fn phase(self) -> CircuitPhase {
        match self {
            Self::Closed => CircuitPhase::Closed,
            Self::Open { .. } => CircuitPhase::Open,
            Self::HalfOpen { .. } => CircuitPhase::HalfOpen,
        }
    }
}

/// State name without its payload, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl Display for CircuitPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(rename = "failure_window_ms", with = "duration_ms")]
    pub failure_window: Duration,
    #[serde(rename = "open_duration_ms", with = "duration_ms")]
    pub open_duration: Duration,
    pub max_half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            open_duration: Duration::from_secs(300),
            max_half_open_probes: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::ZeroValue {
                field: "circuit_breaker.failure_threshold",
            });
        }
        if self.failure_window.is_zero() {
            return Err(ValidationError::ZeroValue {
                field: "circuit_breaker.failure_window_ms",
            });
        }
        if self.open_duration.is_zero() {
            return Err(ValidationError::ZeroValue {
                field: "circuit_breaker.open_duration_ms",
            });
        }
        if self.max_half_open_probes == 0 {
            return Err(ValidationError::ZeroValue {
                field: "circuit_breaker.max_half_open_probes",
            });
        }
        Ok(())
    }
}

/// Admission refused by the breaker; no upstream call may be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitRejection {
    pub phase: CircuitPhase,
    /// Time until the breaker will admit a recovery probe, when known.
    pub retry_after: Option<Duration>,
}

impl Display for CircuitRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.phase, self.retry_after) {
            (CircuitPhase::HalfOpen, _) => {
                f.write_str("circuit breaker is HALF_OPEN and all recovery probes are in flight")
            }
            (phase, Some(retry_after)) => write!(
                f,
                "circuit breaker is {phase}; next recovery attempt in {:.1}s",
                retry_after.as_secs_f64()
            ),
            (phase, None) => write!(f, "circuit breaker is {phase}"),
        }
    }
}

/// One admitted upstream call.
#[derive(Debug)]
#[must_use = "an unrecorded permit counts as a network failure when dropped"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    recorded: bool,
}

impl CircuitPermit<'_> {
    pub fn record(self, outcome: RequestOutcome) {
        self.record_at(outcome, Instant::now());
    }

    pub fn record_at(mut self, outcome: RequestOutcome, now: Instant) {
        self.recorded = true;
        self.breaker.record_at(outcome, now);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            warn!("admitted call abandoned before completion; recording network failure");
            self.breaker.record_at(RequestOutcome::NetworkError, Instant::now());
        }
    }
}

/// Snapshot exposed for health endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub state: CircuitPhase,
    pub failure_count: u32,
    pub success_count: u64,
    pub total_requests: u64,
    pub success_rate: f64,
    pub failure_threshold: u32,
    pub probes_issued: u32,
    pub max_half_open_probes: u32,
    /// Seconds until an OPEN circuit admits its first probe; zero otherwise.
    pub seconds_until_retry: f64,
    pub failure_window_secs: f64,
    pub open_duration_secs: f64,
}

#[derive(Debug, Default)]
struct FailureLedger {
    failure_count: u32,
    window_start: Option<Instant>,
    total_requests: u64,
    success_count: u64,
}

impl FailureLedger {
    fn clear_failures(&mut self) {
        self.failure_count = 0;
        self.window_start = None;
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    ledger: FailureLedger,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            ledger: FailureLedger::default(),
        }
    }
}

/// Thread-safe circuit breaker for upstream requests.
///
/// All reads and transitions happen under one mutex. The `*_at` methods take
/// the clock as an argument so transitions can be driven deterministically.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn admit(&self) -> Result<CircuitPermit<'_>, CircuitRejection> {
        self.admit_at(Instant::now())
    }

    /// Decides admission and claims a half-open probe slot in one step.
    ///
    /// The returned permit must be given the call's outcome; dropping it
    /// unrecorded counts as a network failure so probe slots cannot leak.
    pub fn admit_at(&self, now: Instant) -> Result<CircuitPermit<'_>, CircuitRejection> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::Open { opened_at } => {
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed < self.config.open_duration {
                    return Err(CircuitRejection {
                        phase: CircuitPhase::Open,
                        retry_after: Some(self.config.open_duration - elapsed),
                    });
                }
                inner.state = CircuitState::HalfOpen { probes_issued: 1 };
                info!(
                    max_probes = self.config.max_half_open_probes,
                    "circuit breaker entering HALF_OPEN"
                );
            }
            CircuitState::HalfOpen { probes_issued } => {
                if probes_issued >= self.config.max_half_open_probes {
                    return Err(CircuitRejection {
                        phase: CircuitPhase::HalfOpen,
                        retry_after: None,
                    });
                }
                inner.state = CircuitState::HalfOpen {
                    probes_issued: probes_issued + 1,
                };
            }
        }
        Ok(CircuitPermit {
            breaker: self,
            recorded: false,
        })
    }

    /// Records an outcome outside of any permit, e.g. to seed the ledger.
    pub fn record_at(&self, outcome: RequestOutcome, now: Instant) {
        if outcome.is_breaker_failure() {
            self.on_failure(now);
        } else {
            self.on_success();
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.ledger.total_requests = inner.ledger.total_requests.saturating_add(1);
        inner.ledger.success_count = inner.ledger.success_count.saturating_add(1);

        if let CircuitState::HalfOpen { probes_issued } = inner.state {
            if probes_issued >= self.config.max_half_open_probes {
                inner.state = CircuitState::Closed;
                inner.ledger.clear_failures();
                info!(probes_issued, "circuit breaker CLOSED after successful probes");
            }
        }
    }

    fn on_failure(&self, now: Instant) {
        let mut inner = self.lock();
        inner.ledger.total_requests = inner.ledger.total_requests.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                let stale = inner.ledger.window_start.is_some_and(|window_start| {
                    now.saturating_duration_since(window_start) > self.config.failure_window
                });
                if stale {
                    inner.ledger.clear_failures();
                }
                if inner.ledger.window_start.is_none() {
                    inner.ledger.window_start = Some(now);
                }
                inner.ledger.failure_count = inner.ledger.failure_count.saturating_add(1);

                if inner.ledger.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open { opened_at: now };
                    warn!(
                        failures = inner.ledger.failure_count,
                        threshold = self.config.failure_threshold,
                        open_secs = self.config.open_duration.as_secs_f64(),
                        "circuit breaker OPEN"
                    );
                }
            }
            CircuitState::HalfOpen { probes_issued } => {
                inner.ledger.failure_count = inner.ledger.failure_count.saturating_add(1);
                inner.state = CircuitState::Open { opened_at: now };
                warn!(probes_issued, "recovery probe failed; circuit breaker OPEN again");
            }
            // A call admitted before the circuit opened; the open timer stands.
            CircuitState::Open { .. } => {
                inner.ledger.failure_count = inner.ledger.failure_count.saturating_add(1);
            }
        }
    }

    /// Forces CLOSED with an empty failure ledger.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.ledger = FailureLedger::default();
        info!("circuit breaker manually reset");
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().ledger.failure_count
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> CircuitBreakerStatus {
        let inner = self.lock();
        let ledger = &inner.ledger;

        let success_rate = if ledger.total_requests == 0 {
            100.0
        } else {
            ledger.success_count as f64 / ledger.total_requests as f64 * 100.0
        };
        let (probes_issued, seconds_until_retry) = match inner.state {
            CircuitState::Closed => (0, 0.0),
            CircuitState::Open { opened_at } => (
                0,
                self.config
                    .open_duration
                    .saturating_sub(now.saturating_duration_since(opened_at))
                    .as_secs_f64(),
            ),
            CircuitState::HalfOpen { probes_issued } => (probes_issued, 0.0),
        };

        CircuitBreakerStatus {
            state: inner.state.phase(),
            failure_count: ledger.failure_count,
            success_count: ledger.success_count,
            total_requests: ledger.total_requests,
            success_rate,
            failure_threshold: self.config.failure_threshold,
            probes_issued,
            max_half_open_probes: self.config.max_half_open_probes,
            seconds_until_retry,
            failure_window_secs: self.config.failure_window.as_secs_f64(),
            open_duration_secs: self.config.open_duration.as_secs_f64(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
