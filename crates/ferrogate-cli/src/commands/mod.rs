mod market;
mod status;

use ferrogate_core::{GatewayResponse, MarketDataGateway};
use serde::Serialize;
use serde_json::Value;

use crate::cli::Command;
use crate::error::CliError;

/// Rendered command output plus whether the gateway call succeeded.
#[derive(Debug)]
pub struct CommandResult {
    pub data: Value,
    pub success: bool,
}

impl CommandResult {
    pub fn ok(data: impl Serialize) -> Result<Self, CliError> {
        Ok(Self {
            data: serde_json::to_value(data)?,
            success: true,
        })
    }

    /// Wraps a gateway response; `success` mirrors the envelope flag.
    pub fn from_response<T: Serialize>(response: GatewayResponse<T>) -> Result<Self, CliError> {
        let success = response.success;
        Ok(Self {
            data: serde_json::to_value(response)?,
            success,
        })
    }
}

pub async fn run(command: &Command, gateway: &MarketDataGateway) -> Result<CommandResult, CliError> {
    match command {
        Command::Price(args) => market::price(args, gateway).await,
        Command::Quote(args) => market::quote(args, gateway).await,
        Command::Series(args) => market::series(args, gateway).await,
        Command::Batch(args) => market::batch(args, gateway).await,
        Command::Symbols(args) => market::symbols(args, gateway).await,
        Command::Health => status::health(gateway).await,
        Command::Status => status::snapshot(gateway),
    }
}
