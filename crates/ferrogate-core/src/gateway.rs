//! Request orchestration.
//!
//! Every operation runs the same sequence: normalize the symbol, ask the
//! circuit breaker for admission, wait for the rate limiter, execute, record
//! the outcome on the breaker, then decode the payload. The breaker check
//! comes first so a rejected call never consumes a rate-limit slot.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerStatus};
use crate::config::GatewayConfig;
use crate::executor::HttpExecutor;
use crate::http_client::{ApiKeyAuth, HttpClient, HttpRequest, ReqwestHttpClient};
use crate::outcome::RequestOutcome;
use crate::provider::{self, UnexpectedPayload};
use crate::rate_limiter::{RateLimitStatus, RateLimiter};
use crate::request::{
    BatchQuoteRequest, Endpoint, PriceRequest, QueryParams, QuoteRequest, TimeSeriesRequest,
    MAX_LISTING_SIZE,
};
use crate::response::{ErrorBody, HealthReport, HealthStatus, MarketProbe, PoolStatus};
use crate::{
    BatchQuotes, ConfigError, ErrorKind, FetchedAt, GatewayError, PriceData, QuoteData, Symbol,
    SymbolListing, TimeSeries, ValidationError, SAUDI_EXCHANGE_CODE,
};

/// Symbols probed by [`MarketDataGateway::health_check`].
pub const HEALTH_PROBE_US: &str = "AAPL";
pub const HEALTH_PROBE_SAUDI: &str = "4261";

/// Resilient client for the market-data provider.
///
/// Construct once and share behind an [`Arc`]; breaker, limiter, and
/// connection pool state are per instance.
pub struct MarketDataGateway {
    config: GatewayConfig,
    auth: ApiKeyAuth,
    executor: HttpExecutor,
    circuit_breaker: CircuitBreaker,
    rate_limiter: RateLimiter,
    requests_dispatched: AtomicU64,
}

impl std::fmt::Debug for MarketDataGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataGateway")
            .field("config", &self.config)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl MarketDataGateway {
    /// Validates `config` and builds the pooled production transport.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = ReqwestHttpClient::from_config(&config.transport)?;
        info!(
            base_url = %config.transport.base_url,
            api_key = %config.masked_api_key(),
            max_per_minute = config.rate_limit.max_per_minute,
            burst_limit = config.rate_limit.burst_limit,
            "market data gateway ready"
        );
        Ok(Self::with_http_client(config, Arc::new(client)))
    }

    /// Uses a caller-supplied transport; `config` is taken as already validated.
    pub fn with_http_client(config: GatewayConfig, client: Arc<dyn HttpClient>) -> Self {
        Self {
            auth: ApiKeyAuth::new(config.api_key.as_str()),
            executor: HttpExecutor::new(client, config.retry.clone()),
            circuit_breaker: CircuitBreaker::new(config.circuit_breaker),
            rate_limiter: RateLimiter::new(config.rate_limit),
            requests_dispatched: AtomicU64::new(0),
            config,
        }
    }

    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn get_real_time_price(
        &self,
        request: PriceRequest,
    ) -> Result<PriceData, GatewayError> {
        self.traced(Endpoint::Price, &request.symbol, async {
            let symbol = normalize(&request.symbol)?;
            let body = self
                .call(Endpoint::Price, request.params(&symbol), request.timeout)
                .await?;
            provider::decode_price(&body, &symbol).map_err(unexpected_payload)
        })
        .await
    }

    pub async fn get_quote(&self, request: QuoteRequest) -> Result<QuoteData, GatewayError> {
        self.traced(Endpoint::Quote, &request.symbol, async {
            let symbol = normalize(&request.symbol)?;
            let body = self
                .call(Endpoint::Quote, request.params(&symbol), request.timeout)
                .await?;
            provider::decode_quote(&body, &symbol).map_err(unexpected_payload)
        })
        .await
    }

    pub async fn get_time_series(
        &self,
        request: TimeSeriesRequest,
    ) -> Result<TimeSeries, GatewayError> {
        self.traced(Endpoint::TimeSeries, &request.symbol, async {
            let symbol = normalize(&request.symbol)?;
            request
                .validate()
                .map_err(|error| GatewayError::invalid_request(error.to_string()))?;

            let timezone = request.effective_timezone(&symbol).to_owned();
            let body = self
                .call(Endpoint::TimeSeries, request.params(&symbol), request.timeout)
                .await?;
            provider::decode_time_series(&body, &symbol, request.interval, &timezone)
                .map_err(unexpected_payload)
        })
        .await
    }

    /// Quotes up to 100 symbols in one upstream call; longer lists are cut.
    pub async fn get_batch_quotes(
        &self,
        request: BatchQuoteRequest,
    ) -> Result<BatchQuotes, GatewayError> {
        let label = format!("batch[{}]", request.symbols.len());
        self.traced(Endpoint::BatchQuote, &label, async {
            let (symbols, truncated_from) = request.prepare().map_err(|error| match error {
                ValidationError::EmptyBatch => GatewayError::invalid_request(error.to_string()),
                other => GatewayError::invalid_symbol(other),
            })?;

            let body = self
                .call(Endpoint::BatchQuote, request.params(&symbols), request.timeout)
                .await?;
            let quotes = provider::decode_batch(&body, &symbols).map_err(unexpected_payload)?;

            Ok(BatchQuotes {
                symbols: symbols.iter().map(|symbol| symbol.as_str().to_owned()).collect(),
                count: quotes.len(),
                quotes,
                truncated_from,
                fetched_at: FetchedAt::now(),
            })
        })
        .await
    }

    /// Lists instruments traded on the Saudi exchange, at most 1000.
    pub async fn list_saudi_symbols(&self, limit: u32) -> Result<SymbolListing, GatewayError> {
        self.traced(Endpoint::Stocks, SAUDI_EXCHANGE_CODE, async {
            if limit == 0 {
                return Err(GatewayError::invalid_request(
                    ValidationError::ZeroValue { field: "limit" }.to_string(),
                ));
            }
            let params: QueryParams = vec![
                ("exchange", SAUDI_EXCHANGE_CODE.to_owned()),
                ("country", String::from("Saudi Arabia")),
                ("outputsize", limit.min(MAX_LISTING_SIZE).to_string()),
            ];
            let body = self.call(Endpoint::Stocks, params, None).await?;
            let symbols = provider::decode_listing(&body).map_err(unexpected_payload)?;

            Ok(SymbolListing {
                exchange: SAUDI_EXCHANGE_CODE.to_owned(),
                count: symbols.len(),
                symbols,
            })
        })
        .await
    }

    /// Probes one US and one Saudi symbol through the full call path.
    pub async fn health_check(&self) -> HealthReport {
        let (us, saudi) = tokio::join!(
            self.get_real_time_price(PriceRequest::new(HEALTH_PROBE_US)),
            self.get_real_time_price(PriceRequest::new(HEALTH_PROBE_SAUDI)),
        );
        let us_market = probe(HEALTH_PROBE_US, us);
        let saudi_market = probe(HEALTH_PROBE_SAUDI, saudi);

        let (status, message) = match (us_market.ok, saudi_market.ok) {
            (true, true) => (HealthStatus::Healthy, String::from("provider API is accessible")),
            (true, false) | (false, true) => (
                HealthStatus::Degraded,
                format!(
                    "one market probe failed - US: {}, Saudi: {}",
                    probe_summary(&us_market),
                    probe_summary(&saudi_market)
                ),
            ),
            (false, false) => (
                HealthStatus::Unhealthy,
                format!(
                    "both market probes failed - US: {}, Saudi: {}",
                    probe_summary(&us_market),
                    probe_summary(&saudi_market)
                ),
            ),
        };

        HealthReport {
            status,
            message,
            us_market,
            saudi_market,
            api_key_configured: !self.config.api_key.trim().is_empty(),
            auth_method: String::from("header"),
            circuit_breaker: self.circuit_breaker_status(),
            rate_limit: self.rate_limit_status(),
        }
    }

    pub fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.circuit_breaker.status()
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.status()
    }

    pub fn connection_pool_status(&self) -> PoolStatus {
        let transport = &self.config.transport;
        let requests_dispatched = self.requests_dispatched.load(Ordering::Relaxed);
        PoolStatus {
            active: requests_dispatched > 0,
            requests_dispatched,
            base_url: transport.base_url.clone(),
            max_idle_per_host: transport.pool_max_idle_per_host,
            idle_timeout_secs: transport.pool_idle_timeout.as_secs_f64(),
            connect_timeout_secs: transport.connect_timeout.as_secs_f64(),
            read_timeout_secs: transport.read_timeout.as_secs_f64(),
        }
    }

    /// Forces the circuit breaker CLOSED.
    pub fn reset_circuit_breaker(&self) {
        self.circuit_breaker.reset();
    }

    async fn traced<T, F>(&self, endpoint: Endpoint, symbol: &str, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let span = info_span!(
            "gateway_call",
            request_id = %Uuid::new_v4(),
            endpoint = endpoint.as_str(),
            symbol = %symbol,
        );
        async move {
            let result = call.await;
            match &result {
                Ok(_) => debug!("gateway call succeeded"),
                Err(error) => warn!(
                    kind = %error.kind(),
                    attempted = error.attempted(),
                    error = %error.message(),
                    "gateway call failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn call(
        &self,
        endpoint: Endpoint,
        params: QueryParams,
        timeout: Option<Duration>,
    ) -> Result<Value, GatewayError> {
        let permit = self
            .circuit_breaker
            .admit()
            .map_err(|rejection| GatewayError::circuit_open(rejection.to_string()))?;

        let request = self.build_request(endpoint, params);
        let attempt = async {
            self.rate_limiter.acquire().await;
            self.requests_dispatched.fetch_add(1, Ordering::Relaxed);
            self.executor.send(request).await
        };

        let execution = match timeout.or(self.config.call_timeout) {
            Some(budget) => {
                let deadline = tokio::time::Instant::now() + budget;
                match tokio::time::timeout_at(deadline, attempt).await {
                    Ok(execution) => execution,
                    Err(_) => {
                        permit.record(RequestOutcome::NetworkError);
                        return Err(GatewayError::deadline_exceeded(format!(
                            "call exceeded its {}ms deadline",
                            budget.as_millis()
                        )));
                    }
                }
            }
            None => attempt.await,
        };

        permit.record(execution.outcome);
        if let Some(error) = GatewayError::from_outcome(execution.outcome, execution.detail) {
            return Err(error);
        }
        debug!(attempts = execution.attempts, "upstream call succeeded");
        execution.body.ok_or_else(|| {
            GatewayError::new(ErrorKind::Server, "unexpected payload shape: missing body")
        })
    }

    fn build_request(&self, endpoint: Endpoint, params: QueryParams) -> HttpRequest {
        let url = self.config.transport.endpoint_url(endpoint.path());
        params
            .iter()
            .fold(HttpRequest::get(url), |request, (name, value)| {
                request.with_query(name, value)
            })
            .with_query("format", "json")
            .with_header("accept", "application/json")
            .with_auth(&self.auth)
            .with_timeout(self.config.transport.read_timeout)
    }
}

fn normalize(raw: &str) -> Result<Symbol, GatewayError> {
    Symbol::normalize(raw).map_err(GatewayError::invalid_symbol)
}

fn unexpected_payload(error: UnexpectedPayload) -> GatewayError {
    GatewayError::new(ErrorKind::Server, error.to_string())
}

fn probe(symbol: &str, result: Result<PriceData, GatewayError>) -> MarketProbe {
    match result {
        Ok(price) => MarketProbe {
            symbol: symbol.to_owned(),
            ok: true,
            price: Some(price.price),
            error: None,
        },
        Err(error) => MarketProbe {
            symbol: symbol.to_owned(),
            ok: false,
            price: None,
            error: Some(ErrorBody::from(&error)),
        },
    }
}

fn probe_summary(probe: &MarketProbe) -> &str {
    match &probe.error {
        Some(error) => &error.message,
        None => "ok",
    }
}
