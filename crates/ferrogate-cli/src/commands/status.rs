use ferrogate_core::{
    CircuitBreakerStatus, MarketDataGateway, PoolStatus, RateLimitStatus,
};
use serde::Serialize;

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct StatusSnapshot {
    circuit_breaker: CircuitBreakerStatus,
    rate_limit: RateLimitStatus,
    connection_pool: PoolStatus,
}

/// Health is a success unless both market probes failed.
pub async fn health(gateway: &MarketDataGateway) -> Result<CommandResult, CliError> {
    let report = gateway.health_check().await;
    let healthy = report.is_healthy();
    let mut result = CommandResult::ok(&report)?;
    result.success = healthy;
    Ok(result)
}

pub fn snapshot(gateway: &MarketDataGateway) -> Result<CommandResult, CliError> {
    CommandResult::ok(StatusSnapshot {
        circuit_breaker: gateway.circuit_breaker_status(),
        rate_limit: gateway.rate_limit_status(),
        connection_pool: gateway.connection_pool_status(),
    })
}
