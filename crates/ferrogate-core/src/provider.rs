//! Provider payload decoding.
//!
//! The upstream sends most numbers as strings and omits fields freely, so the
//! raw structs below accept either form and fall back to zero.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{
    FetchedAt, FiftyTwoWeek, Interval, ListedSymbol, PriceData, QuoteData, Symbol, TimeSeries,
    TimeSeriesValue,
};

/// A 200 payload that does not have the shape the endpoint promises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnexpectedPayload(pub String);

impl std::fmt::Display for UnexpectedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unexpected payload shape: {}", self.0)
    }
}

impl std::error::Error for UnexpectedPayload {}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn as_number(value: &Value) -> Option<f64> {
        let number = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        number.filter(|number| number.is_finite())
    }

    pub fn opt_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Value>::deserialize(deserializer)?
            .as_ref()
            .and_then(as_number))
    }

    pub fn float<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        opt_float(deserializer).map(|value| value.unwrap_or(0.0))
    }

    pub fn opt_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_float(deserializer)?
            .filter(|value| *value >= 0.0)
            .map(|value| value as u64))
    }

    pub fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        opt_count(deserializer).map(|value| value.unwrap_or(0))
    }

    pub fn integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        opt_float(deserializer).map(|value| value.map_or(0, |value| value as i64))
    }

    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Bool(flag)) => flag,
            Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
            Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        })
    }

    pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(text)) => text,
            Some(Value::Number(number)) => number.to_string(),
            _ => String::new(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    #[serde(default, deserialize_with = "lenient::opt_float")]
    price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFiftyTwoWeek {
    #[serde(default, deserialize_with = "lenient::float")]
    low: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    high: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    low_change: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    high_change: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    low_change_percent: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    high_change_percent: f64,
    #[serde(default, deserialize_with = "lenient::text")]
    range: String,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    exchange: String,
    #[serde(default, deserialize_with = "lenient::text")]
    currency: String,
    #[serde(default, deserialize_with = "lenient::text")]
    datetime: String,
    #[serde(default, deserialize_with = "lenient::integer")]
    timestamp: i64,
    #[serde(default, deserialize_with = "lenient::float")]
    open: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    high: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    low: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    close: f64,
    #[serde(default, deserialize_with = "lenient::count")]
    volume: u64,
    #[serde(default, deserialize_with = "lenient::float")]
    previous_close: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    change: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    percent_change: f64,
    #[serde(default, deserialize_with = "lenient::count")]
    average_volume: u64,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_market_open: bool,
    #[serde(default)]
    fifty_two_week: Option<RawFiftyTwoWeek>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    interval: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default, rename = "type")]
    instrument_type: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    exchange_timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBar {
    #[serde(default, deserialize_with = "lenient::text")]
    datetime: String,
    #[serde(default, deserialize_with = "lenient::float")]
    open: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    high: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    low: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    close: f64,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    volume: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawTimeSeries {
    #[serde(default)]
    meta: Option<RawMeta>,
    #[serde(default)]
    values: Option<Vec<RawBar>>,
}

#[derive(Debug, Deserialize)]
struct RawListedSymbol {
    #[serde(default, deserialize_with = "lenient::text")]
    symbol: String,
    #[serde(default, deserialize_with = "lenient::text")]
    name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    currency: String,
    #[serde(default, deserialize_with = "lenient::text")]
    exchange: String,
    #[serde(default, deserialize_with = "lenient::text")]
    country: String,
    #[serde(default, rename = "type", deserialize_with = "lenient::text")]
    instrument_type: String,
}

fn non_empty(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.trim().is_empty() {
        fallback()
    } else {
        value
    }
}

fn shape_error(endpoint: &str, error: impl std::fmt::Display) -> UnexpectedPayload {
    UnexpectedPayload(format!("{endpoint}: {error}"))
}

pub fn decode_price(body: &Value, symbol: &Symbol) -> Result<PriceData, UnexpectedPayload> {
    let raw = RawPrice::deserialize(body).map_err(|error| shape_error("price", error))?;
    let price = raw
        .price
        .ok_or_else(|| UnexpectedPayload(String::from("price: missing numeric 'price' field")))?;

    Ok(PriceData {
        symbol: symbol.as_str().to_owned(),
        original_symbol: symbol.raw().to_owned(),
        price,
        market: symbol.market(),
        fetched_at: FetchedAt::now(),
    })
}

pub fn decode_quote(body: &Value, symbol: &Symbol) -> Result<QuoteData, UnexpectedPayload> {
    let raw = RawQuote::deserialize(body).map_err(|error| shape_error("quote", error))?;
    if raw.symbol.is_none() {
        return Err(UnexpectedPayload(String::from(
            "quote: missing 'symbol' field",
        )));
    }
    Ok(quote_from_raw(raw, symbol))
}

fn quote_from_raw(raw: RawQuote, symbol: &Symbol) -> QuoteData {
    QuoteData {
        symbol: symbol.as_str().to_owned(),
        original_symbol: symbol.raw().to_owned(),
        name: non_empty(raw.name, || symbol.raw().to_owned()),
        exchange: non_empty(raw.exchange, || symbol.exchange().to_owned()),
        currency: non_empty(raw.currency, || symbol.currency().to_owned()),
        datetime: raw.datetime,
        timestamp: raw.timestamp,
        open: raw.open,
        high: raw.high,
        low: raw.low,
        close: raw.close,
        volume: raw.volume,
        previous_close: raw.previous_close,
        change: raw.change,
        percent_change: raw.percent_change,
        average_volume: raw.average_volume,
        is_market_open: raw.is_market_open,
        fifty_two_week: raw.fifty_two_week.map(|week| FiftyTwoWeek {
            low: week.low,
            high: week.high,
            low_change: week.low_change,
            high_change: week.high_change,
            low_change_percent: week.low_change_percent,
            high_change_percent: week.high_change_percent,
            range: week.range,
        }),
        market: symbol.market(),
        fetched_at: FetchedAt::now(),
    }
}

pub fn decode_time_series(
    body: &Value,
    symbol: &Symbol,
    interval: Interval,
    timezone: &str,
) -> Result<TimeSeries, UnexpectedPayload> {
    let raw =
        RawTimeSeries::deserialize(body).map_err(|error| shape_error("time_series", error))?;
    let values = raw
        .values
        .ok_or_else(|| UnexpectedPayload(String::from("time_series: missing 'values' array")))?;
    let meta = raw.meta.unwrap_or_default();

    Ok(TimeSeries {
        symbol: meta
            .symbol
            .map(|provider| canonical_symbol(&provider, symbol))
            .unwrap_or_else(|| symbol.as_str().to_owned()),
        original_symbol: symbol.raw().to_owned(),
        interval: meta
            .interval
            .unwrap_or_else(|| interval.as_str().to_owned()),
        currency: meta
            .currency
            .filter(|currency| !currency.is_empty())
            .unwrap_or_else(|| symbol.currency().to_owned()),
        exchange: meta
            .exchange
            .unwrap_or_else(|| symbol.exchange().to_owned()),
        instrument_type: meta.instrument_type.unwrap_or_default(),
        timezone: meta
            .timezone
            .or(meta.exchange_timezone)
            .unwrap_or_else(|| timezone.to_owned()),
        values: values
            .into_iter()
            .map(|bar| TimeSeriesValue {
                datetime: bar.datetime,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })
            .collect(),
        market: symbol.market(),
        fetched_at: FetchedAt::now(),
    })
}

/// Batch responses come back as one object, an array, or a map keyed by symbol.
pub fn decode_batch(
    body: &Value,
    requested: &[Symbol],
) -> Result<Vec<QuoteData>, UnexpectedPayload> {
    let entries: Vec<&Value> = match body {
        Value::Object(map) if map.contains_key("symbol") => vec![body],
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        other => {
            return Err(UnexpectedPayload(format!(
                "batch_quote: expected object or array, got {}",
                json_kind(other)
            )))
        }
    };

    let mut quotes = Vec::with_capacity(entries.len());
    for (position, entry) in entries.into_iter().enumerate() {
        if entry.get("status").and_then(Value::as_str) == Some("error") {
            let message = entry.get("message").and_then(Value::as_str).unwrap_or("");
            warn!(position, message, "batch entry rejected by provider");
            continue;
        }
        let raw = RawQuote::deserialize(entry).map_err(|error| shape_error("batch_quote", error))?;
        let Some(returned) = raw.symbol.clone() else {
            return Err(UnexpectedPayload(String::from(
                "batch_quote: entry without 'symbol' field",
            )));
        };

        let matched = requested
            .iter()
            .find(|symbol| {
                symbol.as_str().eq_ignore_ascii_case(&returned)
                    || symbol.base().eq_ignore_ascii_case(&returned)
            })
            .cloned();

        match matched {
            Some(symbol) => quotes.push(quote_from_raw(raw, &symbol)),
            None => warn!(
                position,
                symbol = %returned,
                "batch entry matches no requested symbol; skipped"
            ),
        }
    }
    Ok(quotes)
}

pub fn decode_listing(body: &Value) -> Result<Vec<ListedSymbol>, UnexpectedPayload> {
    let items = match body {
        Value::Object(map) => map.get("data").ok_or_else(|| {
            UnexpectedPayload(String::from("stocks: missing 'data' array"))
        })?,
        Value::Array(_) => body,
        other => {
            return Err(UnexpectedPayload(format!(
                "stocks: expected object or array, got {}",
                json_kind(other)
            )))
        }
    };

    let raw = Vec::<RawListedSymbol>::deserialize(items)
        .map_err(|error| shape_error("stocks", error))?;
    Ok(raw
        .into_iter()
        .map(|item| ListedSymbol {
            symbol: item.symbol,
            name: item.name,
            currency: item.currency,
            exchange: item.exchange,
            country: item.country,
            instrument_type: item.instrument_type,
        })
        .collect())
}

/// Keeps the canonical exchange tag when the provider echoes the bare code.
fn canonical_symbol(provider: &str, requested: &Symbol) -> String {
    if requested.base().eq_ignore_ascii_case(provider) {
        requested.as_str().to_owned()
    } else {
        provider.to_owned()
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Market;

    fn symbol(raw: &str) -> Symbol {
        Symbol::normalize(raw).expect("valid symbol")
    }

    #[test]
    fn price_accepts_string_and_number() {
        let aramco = symbol("2222");
        let from_string = decode_price(&json!({"price": "27.95"}), &aramco).expect("price");
        assert!((from_string.price - 27.95).abs() < 1e-9);
        assert_eq!(from_string.symbol, "2222:Tadawul");
        assert_eq!(from_string.original_symbol, "2222");
        assert_eq!(from_string.market, Market::Saudi);

        let from_number = decode_price(&json!({"price": 189.5}), &symbol("AAPL")).expect("price");
        assert!((from_number.price - 189.5).abs() < 1e-9);
    }

    #[test]
    fn price_without_value_is_a_shape_error() {
        assert!(decode_price(&json!({"last": "1"}), &symbol("AAPL")).is_err());
        assert!(decode_price(&json!({"price": "n/a"}), &symbol("AAPL")).is_err());
    }

    #[test]
    fn quote_fills_defaults_for_missing_fields() {
        let quote = decode_quote(
            &json!({
                "symbol": "2222",
                "open": "27.10",
                "volume": "1500000",
                "is_market_open": true,
                "fifty_two_week": {"low": "25.00", "high": "35.5", "range": "25.00 - 35.50"}
            }),
            &symbol("2222"),
        )
        .expect("quote");

        assert_eq!(quote.currency, "SAR");
        assert_eq!(quote.exchange, "XSAU");
        assert_eq!(quote.name, "2222");
        assert!((quote.open - 27.10).abs() < 1e-9);
        assert_eq!(quote.close, 0.0);
        assert_eq!(quote.volume, 1_500_000);
        assert!(quote.is_market_open);
        let week = quote.fifty_two_week.expect("range block");
        assert!((week.high - 35.5).abs() < 1e-9);
    }

    #[test]
    fn quote_requires_symbol_field() {
        assert!(decode_quote(&json!({"open": "1"}), &symbol("AAPL")).is_err());
    }

    #[test]
    fn time_series_keeps_rows_and_meta() {
        let series = decode_time_series(
            &json!({
                "meta": {"symbol": "2222", "interval": "1day", "currency": "SAR",
                         "exchange_timezone": "Asia/Riyadh", "exchange": "Tadawul", "type": "Common Stock"},
                "values": [
                    {"datetime": "2024-05-02", "open": "30.1", "high": "30.5", "low": "29.9", "close": "30.2", "volume": "100"},
                    {"datetime": "2024-05-01", "open": "30.0", "high": "30.4", "low": "29.8", "close": "30.1"}
                ],
                "status": "ok"
            }),
            &symbol("2222"),
            Interval::OneDay,
            "Asia/Riyadh",
        )
        .expect("series");

        assert_eq!(series.symbol, "2222:Tadawul");
        assert_eq!(series.timezone, "Asia/Riyadh");
        assert_eq!(series.instrument_type, "Common Stock");
        assert_eq!(series.values.len(), 2);
        assert_eq!(series.values[0].volume, Some(100));
        assert_eq!(series.values[1].volume, None);
    }

    #[test]
    fn batch_accepts_object_array_and_keyed_map() {
        let requested = vec![symbol("AAPL"), symbol("2222")];

        let single = decode_batch(&json!({"symbol": "AAPL", "close": "1"}), &requested).expect("single");
        assert_eq!(single.len(), 1);

        let array = decode_batch(
            &json!([{"symbol": "AAPL"}, {"symbol": "2222"}]),
            &requested,
        )
        .expect("array");
        assert_eq!(array[1].symbol, "2222:Tadawul");
        assert_eq!(array[1].original_symbol, "2222");

        let keyed = decode_batch(
            &json!({"AAPL": {"symbol": "AAPL"}, "2222:Tadawul": {"symbol": "2222"}}),
            &requested,
        )
        .expect("keyed");
        assert_eq!(keyed.len(), 2);

        assert!(decode_batch(&json!("nope"), &requested).is_err());
    }

    #[test]
    fn batch_skips_entries_the_provider_rejected() {
        let requested = vec![symbol("AAPL"), symbol("ZZZZZZ")];
        let quotes = decode_batch(
            &json!({
                "AAPL": {"symbol": "AAPL"},
                "ZZZZZZ": {"code": 404, "message": "not found", "status": "error"}
            }),
            &requested,
        )
        .expect("partial batch");
        assert_eq!(quotes.len(), 1);
    }

    #[test]
    fn batch_entry_for_unrequested_symbol_is_skipped() {
        let requested = vec![symbol("AAPL"), symbol("MSFT")];
        let quotes = decode_batch(
            &json!([{"symbol": "TSLA", "close": "200"}, {"symbol": "MSFT", "close": "410"}]),
            &requested,
        )
        .expect("batch decodes");

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "MSFT");
    }

    #[test]
    fn listing_accepts_data_envelope_or_array() {
        let wrapped = decode_listing(&json!({"data": [{"symbol": "2222", "name": "Saudi Aramco", "type": "Common Stock"}]}))
            .expect("wrapped");
        assert_eq!(wrapped[0].name, "Saudi Aramco");
        assert_eq!(wrapped[0].instrument_type, "Common Stock");

        let bare = decode_listing(&json!([{"symbol": "1120"}])).expect("bare");
        assert_eq!(bare[0].symbol, "1120");
    }
}
