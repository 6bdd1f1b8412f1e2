use std::str::FromStr;

use ferrogate_core::{
    BatchQuoteRequest, GatewayResponse, Interval, MarketDataGateway, PriceRequest, QuoteRequest,
    TimeSeriesRequest,
};

use crate::cli::{BatchArgs, QuoteArgs, SeriesArgs, SymbolArgs, SymbolsArgs};
use crate::error::CliError;

use super::CommandResult;

pub async fn price(
    args: &SymbolArgs,
    gateway: &MarketDataGateway,
) -> Result<CommandResult, CliError> {
    let result = gateway
        .get_real_time_price(PriceRequest::new(args.symbol.as_str()))
        .await;
    CommandResult::from_response(GatewayResponse::from(result))
}

pub async fn quote(
    args: &QuoteArgs,
    gateway: &MarketDataGateway,
) -> Result<CommandResult, CliError> {
    let request =
        QuoteRequest::new(args.symbol.as_str()).with_interval(Interval::from_str(&args.interval)?);
    CommandResult::from_response(GatewayResponse::from(gateway.get_quote(request).await))
}

pub async fn series(
    args: &SeriesArgs,
    gateway: &MarketDataGateway,
) -> Result<CommandResult, CliError> {
    let mut request = TimeSeriesRequest::new(args.symbol.as_str())
        .with_interval(Interval::from_str(&args.interval)?)
        .with_output_size(args.output_size)
        .with_timezone(args.timezone.as_str());
    if let Some(start_date) = &args.start_date {
        request = request.with_start_date(start_date.as_str());
    }
    if let Some(end_date) = &args.end_date {
        request = request.with_end_date(end_date.as_str());
    }

    CommandResult::from_response(GatewayResponse::from(
        gateway.get_time_series(request).await,
    ))
}

pub async fn batch(
    args: &BatchArgs,
    gateway: &MarketDataGateway,
) -> Result<CommandResult, CliError> {
    let request = BatchQuoteRequest::new(args.symbols.iter().map(String::as_str))
        .with_interval(Interval::from_str(&args.interval)?);
    CommandResult::from_response(GatewayResponse::from(
        gateway.get_batch_quotes(request).await,
    ))
}

pub async fn symbols(
    args: &SymbolsArgs,
    gateway: &MarketDataGateway,
) -> Result<CommandResult, CliError> {
    CommandResult::from_response(GatewayResponse::from(
        gateway.list_saudi_symbols(args.limit).await,
    ))
}
