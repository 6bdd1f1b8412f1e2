//! # Domain Models
//!
//! Canonical domain types for gateway requests and normalized payloads.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Normalized ticker tagged with its [`Market`] |
//! | [`Interval`] | Provider interval (`1min` .. `1month`) |
//! | [`PriceData`] | Latest trade price |
//! | [`QuoteData`] | OHLC/volume quote with 52-week range |
//! | [`TimeSeries`] | Historical OHLCV rows with metadata |
//! | [`BatchQuotes`] | Quotes returned by one batch call |
//! | [`SymbolListing`] | Exchange symbol catalogue |
//! | [`FetchedAt`] | when a payload was fetched |
//!
//! ## Symbol normalization
//!
//! ```rust
//! use ferrogate_core::{Market, Symbol};
//!
//! let aramco = Symbol::normalize("2222").unwrap();
//! assert_eq!(aramco.as_str(), "2222:Tadawul");
//! assert_eq!(aramco.market(), Market::Saudi);
//!
//! let apple = Symbol::normalize("aapl").unwrap();
//! assert_eq!(apple.as_str(), "AAPL");
//! ```

mod interval;
mod models;
mod symbol;
mod timestamp;

pub use interval::Interval;
pub use models::{
    BatchQuotes, FiftyTwoWeek, ListedSymbol, PriceData, QuoteData, SymbolListing, TimeSeries,
    TimeSeriesValue,
};
pub use symbol::{
    is_saudi_code, Market, Symbol, DEFAULT_CURRENCY, SAUDI_CURRENCY, SAUDI_EXCHANGE_CODE,
    SAUDI_EXCHANGE_TAG, SAUDI_TIMEZONE,
};
pub use timestamp::FetchedAt;
