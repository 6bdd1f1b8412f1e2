//! Caller-facing response shapes.

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerStatus;
use crate::rate_limiter::RateLimitStatus;
use crate::GatewayError;

/// Structured error block of a [`GatewayResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub kind: String,
    pub message: String,
    /// `false` when the gateway never reached the upstream.
    pub attempted: bool,
}

impl From<&GatewayError> for ErrorBody {
    fn from(error: &GatewayError) -> Self {
        Self {
            code: error.code().to_owned(),
            kind: error.kind().as_str().to_owned(),
            message: error.message().to_owned(),
            attempted: error.attempted(),
        }
    }
}

/// Success-flag envelope around any gateway result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> GatewayResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: &GatewayError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody::from(error)),
        }
    }
}

impl<T> From<Result<T, GatewayError>> for GatewayResponse<T> {
    fn from(result: Result<T, GatewayError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::failed(&error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of probing one market during a health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProbe {
    pub symbol: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    pub us_market: MarketProbe,
    pub saudi_market: MarketProbe,
    pub api_key_configured: bool,
    pub auth_method: String,
    pub circuit_breaker: CircuitBreakerStatus,
    pub rate_limit: RateLimitStatus,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }
}

/// Connection pool settings and usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Whether any request has gone through the pool yet.
    pub active: bool,
    pub requests_dispatched: u64,
    pub base_url: String,
    pub max_idle_per_host: usize,
    pub idle_timeout_secs: f64,
    pub connect_timeout_secs: f64,
    pub read_timeout_secs: f64,
}
