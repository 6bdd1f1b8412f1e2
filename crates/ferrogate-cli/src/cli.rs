//! CLI argument definitions for ferrogate.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `price` | Latest trade price for one symbol |
//! | `quote` | Full quote for one symbol |
//! | `series` | Historical OHLCV series |
//! | `batch` | Quotes for up to 100 symbols in one call |
//! | `symbols` | Saudi exchange listing |
//! | `health` | Probe one US and one Saudi symbol |
//! | `status` | Circuit breaker, rate limiter, and pool status |
//!
//! # Examples
//!
//! ```bash
//! # Aramco daily series in Riyadh time
//! ferrogate series 2222 --interval 1day --output-size 30 --pretty
//!
//! # Batch quote with a per-call deadline
//! ferrogate batch AAPL MSFT 1120 --timeout-ms 5000
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Resilient market-data gateway client.
///
/// Reads the API key from TWELVEDATA_API_KEY unless --config points at a
/// JSON configuration file.
#[derive(Debug, Parser)]
#[command(name = "ferrogate", author, version, about = "Resilient market-data gateway client")]
pub struct Cli {
    /// Gateway configuration file (JSON).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Per-call deadline in milliseconds, including rate-limit waits.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "ferrogate=info,ferrogate_core=info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the latest trade price.
    ///
    ///   ferrogate price AAPL
    ///   ferrogate price 2222
    Price(SymbolArgs),

    /// Fetch a full quote.
    Quote(QuoteArgs),

    /// Fetch a historical OHLCV series.
    Series(SeriesArgs),

    /// Fetch quotes for several symbols in one upstream call.
    ///
    /// Lists longer than 100 symbols are truncated.
    Batch(BatchArgs),

    /// List instruments traded on the Saudi exchange.
    Symbols(SymbolsArgs),

    /// Run the two-market health probe.
    Health,

    /// Show circuit breaker, rate limiter, and connection pool status.
    Status,
}

#[derive(Debug, Args)]
pub struct SymbolArgs {
    /// Market symbol (e.g. AAPL, 2222, 1180.SAU).
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    pub symbol: String,

    /// Quote interval (1min, 5min, 1h, 1day, ...).
    #[arg(long, default_value = "1min")]
    pub interval: String,
}

#[derive(Debug, Args)]
pub struct SeriesArgs {
    pub symbol: String,

    #[arg(long, default_value = "1day")]
    pub interval: String,

    /// Number of rows, clamped to 1..=5000.
    #[arg(long, default_value_t = 365)]
    pub output_size: u32,

    /// IANA timezone; Saudi symbols always use Asia/Riyadh.
    #[arg(long, default_value = "UTC")]
    pub timezone: String,

    /// First date to include (YYYY-MM-DD).
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last date to include (YYYY-MM-DD).
    #[arg(long)]
    pub end_date: Option<String>,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    #[arg(long, default_value = "1min")]
    pub interval: String,
}

#[derive(Debug, Args)]
pub struct SymbolsArgs {
    /// Maximum number of listings, capped at 1000.
    #[arg(long, default_value_t = 100)]
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parses_series_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ferrogate",
            "series",
            "2222",
            "--interval",
            "1week",
            "--timeout-ms",
            "2500",
            "--pretty",
        ])
        .expect("valid arguments");

        assert_eq!(cli.timeout_ms, Some(2500));
        assert!(cli.pretty);
        match cli.command {
            Command::Series(args) => {
                assert_eq!(args.symbol, "2222");
                assert_eq!(args.interval, "1week");
                assert_eq!(args.output_size, 365);
                assert_eq!(args.timezone, "UTC");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn batch_requires_at_least_one_symbol() {
        assert!(Cli::try_parse_from(["ferrogate", "batch"]).is_err());
    }

    #[test]
    fn status_takes_no_arguments() {
        let cli = Cli::try_parse_from(["ferrogate", "status"]).expect("valid arguments");
        assert!(matches!(cli.command, Command::Status));
        assert!(cli.config.is_none());
    }
}
