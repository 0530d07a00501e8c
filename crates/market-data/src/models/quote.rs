use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Upstream source a quote was produced by.
///
/// This is a closed set: every quote carries the identity of the provider
/// that actually produced it, and there is no "unknown" escape hatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteSource {
    TwelveData,
    AlphaVantage,
}

impl QuoteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwelveData => "TWELVE_DATA",
            Self::AlphaVantage => "ALPHA_VANTAGE",
        }
    }
}

impl std::fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of quote, used for dispatch and cache key scoping.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum QuoteKind {
    Stock,
    Forex,
    Index,
}

impl QuoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Forex => "forex",
            Self::Index => "index",
        }
    }
}

impl std::fmt::Display for QuoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equity quote.
///
/// `price`, `change` and `change_percent` are required; the remaining
/// market fields are provider-specific and optional. `cached == true`
/// means the data was served from a cache tier rather than fetched on
/// this call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub symbol: String,

    pub price: Decimal,

    /// Absolute change versus the previous close.
    pub change: Decimal,

    /// Percentage change versus the previous close.
    pub change_percent: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    pub source: QuoteSource,

    pub cached: bool,

    /// Capture time, epoch milliseconds on the wire.
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Foreign exchange rate for a currency pair such as "USD/KRW".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForexRate {
    pub pair: String,

    pub rate: Decimal,

    pub change: Decimal,

    pub change_percent: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,

    pub source: QuoteSource,

    pub cached: bool,

    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Market index level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexQuote {
    pub symbol: String,

    pub value: Decimal,

    pub change: Decimal,

    pub change_percent: Decimal,

    pub source: QuoteSource,

    pub cached: bool,

    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Any canonical quote, tagged by kind.
///
/// Quotes are value types: cloned freely, no shared mutable ownership.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Quote {
    Stock(StockQuote),
    Forex(ForexRate),
    Index(IndexQuote),
}

impl Quote {
    pub fn kind(&self) -> QuoteKind {
        match self {
            Self::Stock(_) => QuoteKind::Stock,
            Self::Forex(_) => QuoteKind::Forex,
            Self::Index(_) => QuoteKind::Index,
        }
    }

    /// Symbol or pair identifying the quote.
    pub fn symbol(&self) -> &str {
        match self {
            Self::Stock(q) => &q.symbol,
            Self::Forex(q) => &q.pair,
            Self::Index(q) => &q.symbol,
        }
    }

    pub fn source(&self) -> QuoteSource {
        match self {
            Self::Stock(q) => q.source,
            Self::Forex(q) => q.source,
            Self::Index(q) => q.source,
        }
    }

    pub fn is_cached(&self) -> bool {
        match self {
            Self::Stock(q) => q.cached,
            Self::Forex(q) => q.cached,
            Self::Index(q) => q.cached,
        }
    }

    /// Flag the quote as served from cache rather than freshly fetched.
    pub fn mark_cached(&mut self) {
        match self {
            Self::Stock(q) => q.cached = true,
            Self::Forex(q) => q.cached = true,
            Self::Index(q) => q.cached = true,
        }
    }

    pub fn into_stock(self) -> Option<StockQuote> {
        match self {
            Self::Stock(q) => Some(q),
            _ => None,
        }
    }

    pub fn into_forex(self) -> Option<ForexRate> {
        match self {
            Self::Forex(q) => Some(q),
            _ => None,
        }
    }

    pub fn into_index(self) -> Option<IndexQuote> {
        match self {
            Self::Index(q) => Some(q),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_stock() -> StockQuote {
        StockQuote {
            symbol: "AAPL".to_string(),
            price: dec!(187.44),
            change: dec!(1.23),
            change_percent: dec!(0.66),
            open: Some(dec!(186.00)),
            high: Some(dec!(188.10)),
            low: Some(dec!(185.52)),
            volume: Some(dec!(52345678)),
            market_cap: None,
            currency: Some("USD".to_string()),
            source: QuoteSource::TwelveData,
            cached: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_source_as_str() {
        assert_eq!(QuoteSource::TwelveData.as_str(), "TWELVE_DATA");
        assert_eq!(QuoteSource::AlphaVantage.as_str(), "ALPHA_VANTAGE");
    }

    #[test]
    fn test_quote_accessors() {
        let quote = Quote::Stock(sample_stock());
        assert_eq!(quote.kind(), QuoteKind::Stock);
        assert_eq!(quote.symbol(), "AAPL");
        assert_eq!(quote.source(), QuoteSource::TwelveData);
        assert!(!quote.is_cached());
    }

    #[test]
    fn test_mark_cached() {
        let mut quote = Quote::Stock(sample_stock());
        quote.mark_cached();
        assert!(quote.is_cached());
    }

    #[test]
    fn test_timestamp_serializes_as_epoch_millis() {
        let mut stock = sample_stock();
        stock.timestamp = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();

        let json = serde_json::to_value(&stock).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000_123i64);
    }

    #[test]
    fn test_quote_tagged_roundtrip() {
        let quote = Quote::Forex(ForexRate {
            pair: "USD/KRW".to_string(),
            rate: dec!(1324.50),
            change: dec!(-2.10),
            change_percent: dec!(-0.16),
            bid: Some(dec!(1324.40)),
            ask: Some(dec!(1324.60)),
            source: QuoteSource::AlphaVantage,
            cached: false,
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        });

        let json = serde_json::to_string(&quote).unwrap();
        assert!(json.contains("\"kind\":\"forex\""));
        assert!(json.contains("\"source\":\"ALPHA_VANTAGE\""));

        let back: Quote = serde_json::from_str(&json).unwrap();
        assert_eq!(back, quote);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let mut stock = sample_stock();
        stock.open = None;
        stock.market_cap = None;

        let json = serde_json::to_value(&stock).unwrap();
        assert!(json.get("open").is_none());
        assert!(json.get("market_cap").is_none());
        assert!(json.get("high").is_some());
    }
}
