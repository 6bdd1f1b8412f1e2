use serde::{Deserialize, Serialize};

use crate::{FetchedAt, Market};

/// Latest trade price for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    pub symbol: String,
    pub original_symbol: String,
    pub price: f64,
    pub market: Market,
    pub fetched_at: FetchedAt,
}

/// Fifty-two week range block attached to quotes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FiftyTwoWeek {
    pub low: f64,
    pub high: f64,
    pub low_change: f64,
    pub high_change: f64,
    pub low_change_percent: f64,
    pub high_change_percent: f64,
    pub range: String,
}

/// Normalized OHLC/volume quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteData {
    pub symbol: String,
    pub original_symbol: String,
    pub name: String,
    pub exchange: String,
    pub currency: String,
    pub datetime: String,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub previous_close: f64,
    pub change: f64,
    pub percent_change: f64,
    pub average_volume: u64,
    pub is_market_open: bool,
    pub fifty_two_week: Option<FiftyTwoWeek>,
    pub market: Market,
    pub fetched_at: FetchedAt,
}

/// One OHLCV row of a time series, in provider order (newest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesValue {
    pub datetime: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

/// Historical series with the provider's metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub symbol: String,
    pub original_symbol: String,
    pub interval: String,
    pub currency: String,
    pub exchange: String,
    pub instrument_type: String,
    pub timezone: String,
    pub values: Vec<TimeSeriesValue>,
    pub market: Market,
    pub fetched_at: FetchedAt,
}

/// Quotes fetched through one batch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchQuotes {
    /// Symbols dispatched upstream, after truncation.
    pub symbols: Vec<String>,
    pub quotes: Vec<QuoteData>,
    pub count: usize,
    /// Original request size when the list was cut to the batch limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_from: Option<usize>,
    pub fetched_at: FetchedAt,
}

/// Listing entry from the exchange symbol catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedSymbol {
    pub symbol: String,
    pub name: String,
    pub currency: String,
    pub exchange: String,
    pub country: String,
    pub instrument_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolListing {
    pub exchange: String,
    pub symbols: Vec<ListedSymbol>,
    pub count: usize,
}
