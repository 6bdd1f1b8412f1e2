//! # Ferrogate Core
//!
//! Resilient client for a rate-limited market-data HTTP provider covering US
//! tickers and the Saudi Tadawul exchange.
//!
//! ## Overview
//!
//! This crate turns unreliable third-party calls into a bounded,
//! self-protecting data source:
//!
//! - **Symbol normalization** with Saudi exchange detection
//! - **Dual-window rate limiting** (per-minute cap plus burst cap)
//! - **Circuit breaker** with windowed failure counting and half-open probes
//! - **Retrying executor** that classifies every call into a [`RequestOutcome`]
//! - **Orchestrator** ([`MarketDataGateway`]) returning typed results
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`circuit_breaker`] | CLOSED / OPEN / HALF_OPEN failure isolation |
//! | [`config`] | Gateway configuration from env or JSON |
//! | [`domain`] | Symbols, intervals, and normalized payloads |
//! | [`error`] | Validation, configuration, and gateway errors |
//! | [`executor`] | Retry loop and outcome classification |
//! | [`gateway`] | Request orchestration |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`outcome`] | Outcome taxonomy |
//! | [`provider`] | Provider payload decoding |
//! | [`rate_limiter`] | Admission control |
//! | [`request`] | Request types and upstream parameters |
//! | [`response`] | Response envelope and health report |
//! | [`retry`] | Backoff policy |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrogate_core::{GatewayConfig, MarketDataGateway, TimeSeriesRequest, Interval};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = MarketDataGateway::new(GatewayConfig::from_env()?)?;
//!
//!     let series = gateway
//!         .get_time_series(TimeSeriesRequest::new("2222").with_interval(Interval::OneDay))
//!         .await?;
//!     println!("{} rows in {}", series.values.len(), series.timezone);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! caller
//!   │
//!   ▼
//! MarketDataGateway ──▶ Symbol::normalize
//!   │
//!   ├──▶ CircuitBreaker::admit      (fail fast, no network)
//!   ├──▶ RateLimiter::acquire       (may wait)
//!   ├──▶ HttpExecutor::send         (retries, classification)
//!   ├──▶ CircuitPermit::record      (drop without record = failure)
//!   ▼
//! normalized payload or GatewayError
//! ```
//!
//! ## Error Handling
//!
//! Operations never panic past the gateway; they return [`GatewayError`]:
//!
//! ```rust
//! use ferrogate_core::{ErrorKind, GatewayError};
//!
//! fn handle_error(error: GatewayError) {
//!     match error.kind() {
//!         ErrorKind::CircuitOpen => {
//!             // Not attempted; retry later
//!         }
//!         ErrorKind::Auth => {
//!             // Check credentials
//!         }
//!         _ if error.attempted() => {
//!             // Upstream was reached and failed
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - The API key travels in the `Authorization` header, never the query string
//! - Keys are masked in logs and `Debug` output and never serialized

pub mod circuit_breaker;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod http_client;
pub mod outcome;
pub mod provider;
pub mod rate_limiter;
pub mod request;
pub mod response;
pub mod retry;

// Circuit breaker
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitPermit, CircuitPhase,
    CircuitRejection, CircuitState,
};

// Configuration
pub use config::{mask_api_key, GatewayConfig, TransportConfig};

// Domain models
pub use domain::{
    is_saudi_code, BatchQuotes, FetchedAt, FiftyTwoWeek, Interval, ListedSymbol, Market,
    PriceData, QuoteData, Symbol, SymbolListing, TimeSeries, TimeSeriesValue,
    DEFAULT_CURRENCY, SAUDI_CURRENCY, SAUDI_EXCHANGE_CODE, SAUDI_EXCHANGE_TAG, SAUDI_TIMEZONE,
};

// Error types
pub use error::{ConfigError, ErrorKind, GatewayError, ValidationError};

// Execution
pub use executor::{Execution, HttpExecutor};
pub use gateway::MarketDataGateway;
pub use outcome::RequestOutcome;

// HTTP client types
pub use http_client::{
    ApiKeyAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient, ScriptedHttpClient, ScriptedReply,
};

// Admission control
pub use rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};

// Requests and responses
pub use request::{
    BatchQuoteRequest, Endpoint, PriceRequest, QuoteRequest, TimeSeriesRequest,
    MAX_BATCH_SYMBOLS, MAX_OUTPUT_SIZE,
};
pub use response::{ErrorBody, GatewayResponse, HealthReport, HealthStatus, MarketProbe, PoolStatus};

// Retry logic
pub use retry::{Backoff, Jitter, RetryConfig, RetryTrigger};
