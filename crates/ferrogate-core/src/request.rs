//! Gateway request types.
//!
//! Requests carry the caller's raw input; the gateway normalizes the symbol
//! as the first step of every call and then asks the request for its
//! upstream query parameters.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use time::{Date, PrimitiveDateTime};
use tracing::warn;

use crate::{Interval, Symbol, ValidationError, SAUDI_TIMEZONE};

/// Upper bound on symbols per batch call.
pub const MAX_BATCH_SYMBOLS: usize = 100;
/// Upper bound on rows per time-series call.
pub const MAX_OUTPUT_SIZE: u32 = 5000;
pub const DEFAULT_OUTPUT_SIZE: u32 = 365;
pub const DEFAULT_TIMEZONE: &str = "UTC";
/// Upper bound on rows per symbol-listing call.
pub const MAX_LISTING_SIZE: u32 = 1000;

/// Upstream endpoints used by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Price,
    Quote,
    TimeSeries,
    BatchQuote,
    Stocks,
}

impl Endpoint {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Quote | Self::BatchQuote => "quote",
            Self::TimeSeries => "time_series",
            Self::Stocks => "stocks",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Quote => "quote",
            Self::TimeSeries => "time_series",
            Self::BatchQuote => "batch_quote",
            Self::Stocks => "stocks",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) type QueryParams = Vec<(&'static str, String)>;

/// Latest-price request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub symbol: String,
    pub timeout: Option<Duration>,
}

impl PriceRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn params(&self, symbol: &Symbol) -> QueryParams {
        vec![("symbol", symbol.as_str().to_owned())]
    }
}

/// Single-symbol quote request. Saudi symbols are quoted in Riyadh time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub symbol: String,
    pub interval: Interval,
    pub timeout: Option<Duration>,
}

impl QuoteRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: Interval::OneMinute,
            timeout: None,
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn params(&self, symbol: &Symbol) -> QueryParams {
        let mut params = vec![
            ("symbol", symbol.as_str().to_owned()),
            ("interval", self.interval.as_str().to_owned()),
        ];
        if symbol.is_saudi() {
            params.push(("timezone", SAUDI_TIMEZONE.to_owned()));
        }
        params
    }
}

/// Historical series request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesRequest {
    pub symbol: String,
    pub interval: Interval,
    pub output_size: u32,
    pub timezone: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub timeout: Option<Duration>,
}

impl TimeSeriesRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: Interval::OneDay,
            output_size: DEFAULT_OUTPUT_SIZE,
            timezone: DEFAULT_TIMEZONE.to_owned(),
            start_date: None,
            end_date: None,
            timeout: None,
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_output_size(mut self, output_size: u32) -> Self {
        self.output_size = output_size;
        self
    }

    /// Ignored for Saudi symbols, which always use `Asia/Riyadh`.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_start_date(mut self, start_date: impl Into<String>) -> Self {
        self.start_date = Some(start_date.into());
        self
    }

    pub fn with_end_date(mut self, end_date: impl Into<String>) -> Self {
        self.end_date = Some(end_date.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Output size clamped into `1..=5000`.
    pub fn effective_output_size(&self) -> u32 {
        self.output_size.clamp(1, MAX_OUTPUT_SIZE)
    }

    /// Timezone sent upstream for `symbol`.
    pub fn effective_timezone<'a>(&'a self, symbol: &Symbol) -> &'a str {
        if symbol.is_saudi() {
            SAUDI_TIMEZONE
        } else if self.timezone.trim().is_empty() {
            DEFAULT_TIMEZONE
        } else {
            self.timezone.trim()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let start = self.start_date.as_deref().map(parse_date).transpose()?;
        let end = self.end_date.as_deref().map(parse_date).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ValidationError::InvertedDateRange {
                    start: self.start_date.clone().unwrap_or_default(),
                    end: self.end_date.clone().unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn params(&self, symbol: &Symbol) -> QueryParams {
        let output_size = self.effective_output_size();
        if output_size != self.output_size {
            warn!(
                requested = self.output_size,
                applied = output_size,
                "time series output size clamped"
            );
        }

        let mut params = vec![
            ("symbol", symbol.as_str().to_owned()),
            ("interval", self.interval.as_str().to_owned()),
            ("outputsize", output_size.to_string()),
            ("timezone", self.effective_timezone(symbol).to_owned()),
        ];
        if let Some(start_date) = &self.start_date {
            params.push(("start_date", start_date.trim().to_owned()));
        }
        if let Some(end_date) = &self.end_date {
            params.push(("end_date", end_date.trim().to_owned()));
        }
        params
    }
}

/// Multi-symbol quote request served by one upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuoteRequest {
    pub symbols: Vec<String>,
    pub interval: Interval,
    pub timeout: Option<Duration>,
}

impl BatchQuoteRequest {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            interval: Interval::OneMinute,
            timeout: None,
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Normalizes the first [`MAX_BATCH_SYMBOLS`] symbols.
    ///
    /// Returns the normalized symbols and, when the list was cut, the
    /// original length.
    pub fn prepare(&self) -> Result<(Vec<Symbol>, Option<usize>), ValidationError> {
        if self.symbols.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        let truncated_from = (self.symbols.len() > MAX_BATCH_SYMBOLS).then_some(self.symbols.len());
        if let Some(requested) = truncated_from {
            warn!(
                requested,
                limit = MAX_BATCH_SYMBOLS,
                "batch quote request truncated"
            );
        }

        let symbols = self
            .symbols
            .iter()
            .take(MAX_BATCH_SYMBOLS)
            .map(|raw| Symbol::normalize(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((symbols, truncated_from))
    }

    pub(crate) fn params(&self, symbols: &[Symbol]) -> QueryParams {
        let joined = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        vec![
            ("symbol", joined),
            ("interval", self.interval.as_str().to_owned()),
        ]
    }
}

fn parse_date(value: &str) -> Result<PrimitiveDateTime, ValidationError> {
    let invalid = || ValidationError::InvalidDate {
        value: value.to_owned(),
    };
    let value = value.trim();

    let date_format =
        time::format_description::parse("[year]-[month]-[day]").map_err(|_| invalid())?;
    if let Ok(date) = Date::parse(value, &date_format) {
        return Ok(date.midnight());
    }

    let datetime_format =
        time::format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .map_err(|_| invalid())?;
    PrimitiveDateTime::parse(value, &datetime_format).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(params: &'a QueryParams, name: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn quote_adds_riyadh_timezone_for_saudi_symbols() {
        let saudi = Symbol::normalize("2222").expect("valid symbol");
        let params = QuoteRequest::new("2222")
            .with_interval(Interval::OneDay)
            .params(&saudi);
        assert_eq!(param(&params, "timezone"), Some("Asia/Riyadh"));
        assert_eq!(param(&params, "interval"), Some("1day"));

        let generic = Symbol::normalize("AAPL").expect("valid symbol");
        let params = QuoteRequest::new("AAPL").params(&generic);
        assert_eq!(param(&params, "timezone"), None);
        assert_eq!(param(&params, "interval"), Some("1min"));
    }

    #[test]
    fn time_series_clamps_output_size() {
        assert_eq!(
            TimeSeriesRequest::new("AAPL")
                .with_output_size(9_000)
                .effective_output_size(),
            5000
        );
        assert_eq!(
            TimeSeriesRequest::new("AAPL")
                .with_output_size(0)
                .effective_output_size(),
            1
        );
        assert_eq!(TimeSeriesRequest::new("AAPL").effective_output_size(), 365);
    }

    #[test]
    fn time_series_timezone_defaults_and_saudi_override() {
        let generic = Symbol::normalize("MSFT").expect("valid symbol");
        let saudi = Symbol::normalize("1120.SR").expect("valid symbol");
        let request = TimeSeriesRequest::new("x").with_timezone("America/New_York");

        assert_eq!(request.effective_timezone(&generic), "America/New_York");
        assert_eq!(request.effective_timezone(&saudi), "Asia/Riyadh");
        assert_eq!(TimeSeriesRequest::new("x").effective_timezone(&generic), "UTC");
    }

    #[test]
    fn time_series_date_range_is_validated() {
        let ok = TimeSeriesRequest::new("AAPL")
            .with_start_date("2024-01-01")
            .with_end_date("2024-02-01 16:00:00");
        assert!(ok.validate().is_ok());

        let inverted = TimeSeriesRequest::new("AAPL")
            .with_start_date("2024-03-01")
            .with_end_date("2024-02-01");
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::InvertedDateRange { .. })
        ));

        let garbage = TimeSeriesRequest::new("AAPL").with_start_date("yesterday");
        assert!(matches!(
            garbage.validate(),
            Err(ValidationError::InvalidDate { .. })
        ));
    }

    #[test]
    fn batch_truncates_to_limit_and_joins_symbols() {
        let raw: Vec<String> = (0..150).map(|i| format!("T{i}")).collect();
        let request = BatchQuoteRequest::new(raw);

        let (symbols, truncated_from) = request.prepare().expect("valid batch");
        assert_eq!(symbols.len(), MAX_BATCH_SYMBOLS);
        assert_eq!(truncated_from, Some(150));

        let params = request.params(&symbols[..2]);
        assert_eq!(param(&params, "symbol"), Some("T0,T1"));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let request = BatchQuoteRequest::new(Vec::<String>::new());
        assert_eq!(request.prepare(), Err(ValidationError::EmptyBatch));
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(Endpoint::BatchQuote.path(), "quote");
        assert_eq!(Endpoint::TimeSeries.path(), "time_series");
        assert_eq!(Endpoint::BatchQuote.as_str(), "batch_quote");
    }
}
