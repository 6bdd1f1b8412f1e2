use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Classification of one logical upstream call, after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestOutcome {
    Success,
    AuthError,
    RateLimited,
    ServerError,
    ClientError,
    EmptyResponse,
    NetworkError,
}

impl RequestOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::AuthError => "AUTH_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::ClientError => "CLIENT_ERROR",
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::NetworkError => "NETWORK_ERROR",
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Every non-success outcome counts against circuit health, auth errors included.
    pub const fn is_breaker_failure(self) -> bool {
        !self.is_success()
    }
}

impl Display for RequestOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
