mod cli;
mod commands;
mod error;
mod output;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use ferrogate_core::{GatewayConfig, MarketDataGateway};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let gateway = MarketDataGateway::new(load_config(&cli)?)?;
    let result = commands::run(&cli.command, &gateway).await?;
    output::render(&result.data, cli.pretty)?;

    if !result.success {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(cli: &Cli) -> Result<GatewayConfig, CliError> {
    let config = match &cli.config {
        Some(path) => GatewayConfig::from_json_file(path)?,
        None => GatewayConfig::from_env()?,
    };
    Ok(match cli.timeout_ms {
        Some(timeout_ms) => config.with_call_timeout(Duration::from_millis(timeout_ms)),
        None => config,
    })
}

/// Logs go to stderr so stdout stays machine-readable JSON.
fn init_logging(level: &str) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|error| CliError::Logging(error.to_string()))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .map_err(|error| CliError::Logging(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn config_file_and_timeout_flag_combine() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"api_key":"file-key-0123456789abcdef","rate_limit":{{"max_per_minute":100}}}}"#
        )
        .expect("write config");
        let path = file.path().to_string_lossy().into_owned();

        let cli = Cli::try_parse_from([
            "ferrogate",
            "--config",
            path.as_str(),
            "--timeout-ms",
            "750",
            "status",
        ])
        .expect("valid arguments");
        let config = load_config(&cli).expect("config loads");

        assert_eq!(config.rate_limit.max_per_minute, 100);
        assert_eq!(config.call_timeout, Some(Duration::from_millis(750)));
        assert_eq!(config.masked_api_key(), "file-key...cdef");
    }

    #[test]
    fn unreadable_config_file_is_a_config_error() {
        let cli = Cli::try_parse_from(["ferrogate", "--config", "/nonexistent/ferrogate.json", "health"])
            .expect("valid arguments");

        let error = load_config(&cli).expect_err("missing file");
        assert_eq!(error.exit_code(), 6);
    }
}
