use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::outcome::RequestOutcome;

/// Validation errors for symbols, intervals, requests, and configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,

    #[error(
        "invalid interval '{value}', expected one of 1min, 5min, 15min, 30min, 45min, 1h, 2h, 4h, 5h, 1day, 1week, 1month"
    )]
    InvalidInterval { value: String },

    #[error("batch request must include at least one symbol")]
    EmptyBatch,
    #[error("invalid date '{value}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")]
    InvalidDate { value: String },
    #[error("start date '{start}' is after end date '{end}'")]
    InvertedDateRange { start: String, end: String },
    #[error("field '{field}' must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("api key must be at least {min} characters")]
    InvalidApiKey { min: usize },
    #[error("base url must start with http:// or https://: '{value}'")]
    InvalidBaseUrl { value: String },
}

/// Errors raised while assembling a gateway from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to build http transport: {0}")]
    Transport(String),
}

/// Failure classification exposed to gateway callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSymbol,
    InvalidRequest,
    CircuitOpen,
    Auth,
    RateLimited,
    Server,
    Client,
    EmptyResponse,
    Network,
    DeadlineExceeded,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSymbol => "invalid_symbol",
            Self::InvalidRequest => "invalid_request",
            Self::CircuitOpen => "circuit_open",
            Self::Auth => "auth_error",
            Self::RateLimited => "rate_limited",
            Self::Server => "server_error",
            Self::Client => "client_error",
            Self::EmptyResponse => "empty_response",
            Self::Network => "network_error",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// Whether the gateway reached the upstream for this failure.
    ///
    /// Validation failures and an open circuit never issue a network call.
    pub const fn attempted(self) -> bool {
        !matches!(
            self,
            Self::InvalidSymbol | Self::InvalidRequest | Self::CircuitOpen
        )
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured gateway error returned by every downstream operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    kind: ErrorKind,
    message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_symbol(error: ValidationError) -> Self {
        Self::new(ErrorKind::InvalidSymbol, error.to_string())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircuitOpen, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    /// Maps a classified executor outcome to the caller-facing error.
    ///
    /// Returns `None` for [`RequestOutcome::Success`].
    pub fn from_outcome(outcome: RequestOutcome, detail: impl Into<String>) -> Option<Self> {
        let kind = match outcome {
            RequestOutcome::Success => return None,
            RequestOutcome::AuthError => ErrorKind::Auth,
            RequestOutcome::RateLimited => ErrorKind::RateLimited,
            RequestOutcome::ServerError => ErrorKind::Server,
            RequestOutcome::ClientError => ErrorKind::Client,
            RequestOutcome::EmptyResponse => ErrorKind::EmptyResponse,
            RequestOutcome::NetworkError => ErrorKind::Network,
        };
        Some(Self::new(kind, detail))
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn attempted(&self) -> bool {
        self.kind.attempted()
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ErrorKind::InvalidSymbol => "gateway.invalid_symbol",
            ErrorKind::InvalidRequest => "gateway.invalid_request",
            ErrorKind::CircuitOpen => "gateway.circuit_open",
            ErrorKind::Auth => "gateway.auth",
            ErrorKind::RateLimited => "gateway.rate_limited",
            ErrorKind::Server => "gateway.server",
            ErrorKind::Client => "gateway.client",
            ErrorKind::EmptyResponse => "gateway.empty_response",
            ErrorKind::Network => "gateway.network",
            ErrorKind::DeadlineExceeded => "gateway.deadline_exceeded",
        }
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_outcome_maps_to_no_error() {
        assert!(GatewayError::from_outcome(RequestOutcome::Success, "ok").is_none());
    }

    #[test]
    fn auth_outcome_keeps_detail_verbatim() {
        let error = GatewayError::from_outcome(RequestOutcome::AuthError, "bad key")
            .expect("auth is a failure");
        assert_eq!(error.kind(), ErrorKind::Auth);
        assert_eq!(error.message(), "bad key");
        assert!(error.attempted());
    }

    #[test]
    fn circuit_open_is_not_an_attempt() {
        let error = GatewayError::circuit_open("open");
        assert!(!error.attempted());
        assert_eq!(error.code(), "gateway.circuit_open");
    }
}
