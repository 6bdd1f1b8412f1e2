//! Gateway configuration.
//!
//! Every component config carries serde defaults, so a config file only needs
//! the keys it overrides. Durations are written as integer milliseconds
//! (`*_ms` keys).

use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::rate_limiter::RateLimitConfig;
use crate::retry::RetryConfig;
use crate::{ConfigError, ValidationError};

pub const API_KEY_ENV: &str = "TWELVEDATA_API_KEY";
pub const BASE_URL_ENV: &str = "FERROGATE_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";
pub const MIN_API_KEY_LEN: usize = 20;

/// `Duration` as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as optional integer milliseconds.
pub mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => super::duration_ms::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(deserializer).map(|value| value.map(Duration::from_millis))
    }
}

/// Upstream endpoint and connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub base_url: String,
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Per-attempt budget covering the response head and body.
    #[serde(rename = "read_timeout_ms", with = "duration_ms")]
    pub read_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    #[serde(rename = "pool_idle_timeout_ms", with = "duration_ms")]
    pub pool_idle_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 50,
            pool_idle_timeout: Duration::from_secs(30),
            user_agent: format!("ferrogate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ValidationError::InvalidBaseUrl {
                value: self.base_url.clone(),
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ValidationError::ZeroValue {
                field: "transport.connect_timeout_ms",
            });
        }
        if self.read_timeout.is_zero() {
            return Err(ValidationError::ZeroValue {
                field: "transport.read_timeout_ms",
            });
        }
        if self.pool_max_idle_per_host == 0 {
            return Err(ValidationError::ZeroValue {
                field: "transport.pool_max_idle_per_host",
            });
        }
        Ok(())
    }

    /// Joins the base URL and an endpoint path.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Top-level configuration for one `MarketDataGateway`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub transport: TransportConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    /// Default deadline for calls that do not set their own.
    #[serde(
        rename = "call_timeout_ms",
        with = "option_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub call_timeout: Option<Duration>,
}

impl Debug for GatewayConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("transport", &self.transport)
            .field("rate_limit", &self.rate_limit)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("retry", &self.retry)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl GatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.transport.base_url = base_url.into();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Loads the API key and optional base URL from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`GatewayConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingEnvVar(API_KEY_ENV))?;

        let mut config = Self::new(api_key);
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|value| !value.trim().is_empty()) {
            config.transport.base_url = base_url.trim().to_owned();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file; the environment fills a missing API key.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_file_with(path, |name| std::env::var(name).ok())
    }

    pub fn from_json_file_with<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut config: Self = serde_json::from_str(&raw)?;
        if config.api_key.trim().is_empty() {
            config.api_key = lookup(API_KEY_ENV)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingEnvVar(API_KEY_ENV))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.trim().chars().count() < MIN_API_KEY_LEN {
            return Err(ValidationError::InvalidApiKey {
                min: MIN_API_KEY_LEN,
            });
        }
        self.transport.validate()?;
        self.rate_limit.validate()?;
        self.circuit_breaker.validate()?;
        if self.call_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ValidationError::ZeroValue {
                field: "call_timeout_ms",
            });
        }
        Ok(())
    }

    pub fn masked_api_key(&self) -> String {
        mask_api_key(&self.api_key)
    }
}

/// First eight and last four characters of a credential, for logs.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.len() < 12 {
        return String::from("***");
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    const KEY: &str = "abcdefgh1234567890wxyz";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn env_config_requires_api_key() {
        let err = GatewayConfig::from_lookup(lookup(&[])).expect_err("missing key");
        assert!(matches!(err, ConfigError::MissingEnvVar(API_KEY_ENV)));
    }

    #[test]
    fn env_config_rejects_short_key() {
        let err = GatewayConfig::from_lookup(lookup(&[(API_KEY_ENV, "short")]))
            .expect_err("short key");
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::InvalidApiKey { min: 20 })
        ));
    }

    #[test]
    fn env_config_applies_base_url_override() {
        let config = GatewayConfig::from_lookup(lookup(&[
            (API_KEY_ENV, KEY),
            (BASE_URL_ENV, "http://127.0.0.1:9000/"),
        ]))
        .expect("valid env");

        assert_eq!(
            config.transport.endpoint_url("/price"),
            "http://127.0.0.1:9000/price"
        );
        assert_eq!(config.rate_limit, RateLimitConfig::default());
    }

    #[test]
    fn json_file_overrides_defaults_and_takes_key_from_env() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"rate_limit":{{"max_per_minute":120}},"circuit_breaker":{{"open_duration_ms":1000}},"call_timeout_ms":2500}}"#
        )
        .expect("write config");

        let config = GatewayConfig::from_json_file_with(file.path(), lookup(&[(API_KEY_ENV, KEY)]))
            .expect("valid config file");

        assert_eq!(config.api_key, KEY);
        assert_eq!(config.rate_limit.max_per_minute, 120);
        assert_eq!(config.rate_limit.burst_limit, 50);
        assert_eq!(config.circuit_breaker.open_duration, Duration::from_secs(1));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.call_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn json_file_with_zero_limit_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"api_key":"{KEY}","rate_limit":{{"max_per_minute":0}}}}"#)
            .expect("write config");

        let err = GatewayConfig::from_json_file_with(file.path(), lookup(&[]))
            .expect_err("zero limit");
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::ZeroValue { .. })
        ));
    }

    #[test]
    fn api_key_is_masked_in_debug_and_never_serialized() {
        let config = GatewayConfig::new(KEY);

        let debug = format!("{config:?}");
        assert!(debug.contains("abcdefgh...wxyz"));
        assert!(!debug.contains(KEY));

        let json = serde_json::to_string(&config).expect("serialize");
        assert!(!json.contains(KEY));
        assert_eq!(mask_api_key("tiny"), "***");
    }
}
