//! Twelve Data quote provider implementation.
//!
//! This module provides quotes from the Twelve Data API:
//! - Equities, indices and FX pairs via the /quote endpoint
//! - Native batch quotes via comma-separated symbols in one call
//!
//! Numeric fields arrive as JSON strings and are parsed strictly: a
//! missing or unparsable required field fails the quote rather than
//! producing a zero-filled one. API-level errors come back as an
//! `{code, message, status}` envelope with HTTP 200, so the envelope is
//! checked before any field parsing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::errors::FeedError;
use crate::models::{ForexRate, IndexQuote, QuoteSource, StockQuote};
use crate::provider::{parse_decimal, QuoteProvider};

const BASE_URL: &str = "https://api.twelvedata.com/quote";
const PROVIDER_ID: &str = "TWELVE_DATA";

/// Default request timeout; a hung call must not block the caller.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Twelve Data quote provider.
///
/// Supports equities, indices and FX pairs, and batches multiple equity
/// symbols into a single call.
pub struct TwelveDataProvider {
    client: Client,
    api_key: String,
}

// ============================================================================
// Response structures for the Twelve Data API
// ============================================================================

/// /quote response body.
///
/// The same object position carries either quote fields or the error
/// envelope (`code`/`message`/`status`), so everything is optional and
/// the envelope is inspected first.
#[derive(Debug, Deserialize)]
struct QuotePayload {
    symbol: Option<String>,
    currency: Option<String>,
    open: Option<String>,
    high: Option<String>,
    low: Option<String>,
    close: Option<String>,
    volume: Option<String>,
    change: Option<String>,
    percent_change: Option<String>,
    #[serde(default)]
    market_cap: Option<String>,
    /// Unix seconds of the quote.
    timestamp: Option<i64>,

    // Error envelope
    code: Option<i64>,
    message: Option<String>,
    status: Option<String>,
}

impl QuotePayload {
    /// Map the API error envelope to a typed failure, if present.
    fn api_error(&self) -> Option<FeedError> {
        if self.status.as_deref() != Some("error") {
            return None;
        }

        let message = self.message.clone().unwrap_or_default();
        let lowered = message.to_lowercase();

        let error = match self.code {
            Some(429) => FeedError::ProviderRateLimited {
                provider: PROVIDER_ID.to_string(),
            },
            Some(401) | Some(403) => FeedError::AuthFailed {
                provider: PROVIDER_ID.to_string(),
            },
            Some(404) => FeedError::SymbolNotFound(message),
            _ if lowered.contains("credit") || lowered.contains("limit") => {
                FeedError::ProviderRateLimited {
                    provider: PROVIDER_ID.to_string(),
                }
            }
            _ if lowered.contains("apikey") || lowered.contains("api key") => {
                FeedError::AuthFailed {
                    provider: PROVIDER_ID.to_string(),
                }
            }
            _ => FeedError::ProviderCallFailed {
                provider: PROVIDER_ID.to_string(),
                message,
            },
        };

        Some(error)
    }

    fn capture_time(&self) -> DateTime<Utc> {
        self.timestamp
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .unwrap_or_else(Utc::now)
    }

    /// Required field, or a typed parse failure.
    fn require(&self, field: &str, value: &Option<String>) -> Result<String, FeedError> {
        value.clone().ok_or_else(|| FeedError::ParseFailed {
            provider: PROVIDER_ID.to_string(),
            message: format!("missing required field '{}'", field),
        })
    }

    fn require_decimal(
        &self,
        field: &str,
        value: &Option<String>,
    ) -> Result<rust_decimal::Decimal, FeedError> {
        let raw = self.require(field, value)?;
        parse_decimal(&raw).ok_or_else(|| FeedError::ParseFailed {
            provider: PROVIDER_ID.to_string(),
            message: format!("unparsable value '{}' for field '{}'", raw, field),
        })
    }

    fn to_stock_quote(&self, symbol: &str) -> Result<StockQuote, FeedError> {
        Ok(StockQuote {
            symbol: self.symbol.clone().unwrap_or_else(|| symbol.to_string()),
            price: self.require_decimal("close", &self.close)?,
            change: self.require_decimal("change", &self.change)?,
            change_percent: self.require_decimal("percent_change", &self.percent_change)?,
            open: self.open.as_deref().and_then(parse_decimal),
            high: self.high.as_deref().and_then(parse_decimal),
            low: self.low.as_deref().and_then(parse_decimal),
            volume: self.volume.as_deref().and_then(parse_decimal),
            market_cap: self.market_cap.as_deref().and_then(parse_decimal),
            currency: self.currency.clone(),
            source: QuoteSource::TwelveData,
            cached: false,
            timestamp: self.capture_time(),
        })
    }

    fn to_forex_rate(&self, pair: &str) -> Result<ForexRate, FeedError> {
        Ok(ForexRate {
            pair: self.symbol.clone().unwrap_or_else(|| pair.to_string()),
            rate: self.require_decimal("close", &self.close)?,
            change: self.require_decimal("change", &self.change)?,
            change_percent: self.require_decimal("percent_change", &self.percent_change)?,
            bid: None,
            ask: None,
            source: QuoteSource::TwelveData,
            cached: false,
            timestamp: self.capture_time(),
        })
    }

    fn to_index_quote(&self, symbol: &str) -> Result<IndexQuote, FeedError> {
        Ok(IndexQuote {
            symbol: self.symbol.clone().unwrap_or_else(|| symbol.to_string()),
            value: self.require_decimal("close", &self.close)?,
            change: self.require_decimal("change", &self.change)?,
            change_percent: self.require_decimal("percent_change", &self.percent_change)?,
            source: QuoteSource::TwelveData,
            cached: false,
            timestamp: self.capture_time(),
        })
    }
}

// ============================================================================
// TwelveDataProvider implementation
// ============================================================================

impl TwelveDataProvider {
    /// Create a new Twelve Data provider with the given API key.
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, api_key }
    }

    /// Make a /quote request for the given symbol expression.
    async fn fetch(&self, symbol: &str) -> Result<String, FeedError> {
        let params = [("symbol", symbol), ("apikey", self.api_key.as_str())];

        let url = reqwest::Url::parse_with_params(BASE_URL, &params).map_err(|e| {
            FeedError::ProviderCallFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to build URL: {}", e),
            }
        })?;

        debug!(
            "twelve data request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FeedError::Timeout {
                    provider: PROVIDER_ID.to_string(),
                }
            } else {
                FeedError::ProviderCallFailed {
                    provider: PROVIDER_ID.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::ProviderRateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FeedError::AuthFailed {
                provider: PROVIDER_ID.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FeedError::ProviderCallFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FeedError::ProviderCallFailed {
                provider: PROVIDER_ID.to_string(),
                message: e.to_string(),
            })
    }

    /// Fetch and validate a single /quote payload.
    async fn fetch_payload(&self, symbol: &str) -> Result<QuotePayload, FeedError> {
        let text = self.fetch(symbol).await?;
        let payload: QuotePayload =
            serde_json::from_str(&text).map_err(|e| FeedError::ParseFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to parse response: {}", e),
            })?;

        if let Some(error) = payload.api_error() {
            return Err(error);
        }

        Ok(payload)
    }

    /// Parse a batch response body into per-symbol results.
    ///
    /// The batch endpoint returns an object keyed by requested symbol; an
    /// embedded error envelope for one symbol stays isolated to that
    /// symbol. A top-level envelope (e.g. out of credits) fails the batch
    /// mechanism as a whole.
    fn parse_batch(
        text: &str,
        symbols: &[String],
    ) -> Result<Vec<(String, Result<StockQuote, FeedError>)>, FeedError> {
        // A top-level error envelope is a flat object with status: "error".
        if let Ok(envelope) = serde_json::from_str::<QuotePayload>(text) {
            if let Some(error) = envelope.api_error() {
                return Err(error);
            }
        }

        let map: HashMap<String, serde_json::Value> =
            serde_json::from_str(text).map_err(|e| FeedError::ParseFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to parse batch response: {}", e),
            })?;

        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let result = match map.get(symbol) {
                Some(value) => serde_json::from_value::<QuotePayload>(value.clone())
                    .map_err(|e| FeedError::ParseFailed {
                        provider: PROVIDER_ID.to_string(),
                        message: format!("failed to parse entry for {}: {}", symbol, e),
                    })
                    .and_then(|payload| match payload.api_error() {
                        Some(error) => Err(error),
                        None => payload.to_stock_quote(symbol),
                    }),
                None => Err(FeedError::SymbolNotFound(symbol.clone())),
            };
            results.push((symbol.clone(), result));
        }

        Ok(results)
    }
}

#[async_trait]
impl QuoteProvider for TwelveDataProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn source(&self) -> QuoteSource {
        QuoteSource::TwelveData
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn stock_quote(&self, symbol: &str) -> Result<StockQuote, FeedError> {
        let payload = self.fetch_payload(symbol).await?;
        payload.to_stock_quote(symbol)
    }

    async fn forex_rate(&self, pair: &str) -> Result<ForexRate, FeedError> {
        let payload = self.fetch_payload(pair).await?;
        payload.to_forex_rate(pair)
    }

    async fn index_quote(&self, symbol: &str) -> Result<IndexQuote, FeedError> {
        let payload = self.fetch_payload(symbol).await?;
        payload.to_index_quote(symbol)
    }

    async fn stock_quotes(
        &self,
        symbols: &[String],
    ) -> Result<Vec<(String, Result<StockQuote, FeedError>)>, FeedError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        // The batch shape only appears for two or more symbols.
        if symbols.len() == 1 {
            let symbol = &symbols[0];
            return Ok(vec![(symbol.clone(), self.stock_quote(symbol).await)]);
        }

        let expression = symbols.join(",");
        debug!(
            "twelve data batch request for {} symbols",
            symbols.len()
        );

        let text = self.fetch(&expression).await?;
        Self::parse_batch(&text, symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const QUOTE_JSON: &str = r#"{
        "symbol": "AAPL",
        "name": "Apple Inc",
        "exchange": "NASDAQ",
        "currency": "USD",
        "open": "186.00",
        "high": "188.10",
        "low": "185.52",
        "close": "187.44",
        "volume": "52345678",
        "previous_close": "186.21",
        "change": "1.23",
        "percent_change": "0.66",
        "timestamp": 1700000000
    }"#;

    #[test]
    fn test_parse_stock_quote() {
        let payload: QuotePayload = serde_json::from_str(QUOTE_JSON).unwrap();
        assert!(payload.api_error().is_none());

        let quote = payload.to_stock_quote("AAPL").unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.price, dec!(187.44));
        assert_eq!(quote.change, dec!(1.23));
        assert_eq!(quote.change_percent, dec!(0.66));
        assert_eq!(quote.open, Some(dec!(186.00)));
        assert_eq!(quote.volume, Some(dec!(52345678)));
        assert_eq!(quote.market_cap, None);
        assert_eq!(quote.currency.as_deref(), Some("USD"));
        assert_eq!(quote.source, QuoteSource::TwelveData);
        assert!(!quote.cached);
        assert_eq!(quote.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_missing_close_is_parse_failure() {
        let json = r#"{"symbol": "AAPL", "change": "1.0", "percent_change": "0.5"}"#;
        let payload: QuotePayload = serde_json::from_str(json).unwrap();

        let result = payload.to_stock_quote("AAPL");
        assert!(matches!(result, Err(FeedError::ParseFailed { .. })));
    }

    #[test]
    fn test_unparsable_close_is_parse_failure() {
        let json =
            r#"{"symbol": "AAPL", "close": "n/a", "change": "1.0", "percent_change": "0.5"}"#;
        let payload: QuotePayload = serde_json::from_str(json).unwrap();

        let result = payload.to_stock_quote("AAPL");
        assert!(matches!(result, Err(FeedError::ParseFailed { .. })));
    }

    #[test]
    fn test_credit_envelope_is_rate_limited() {
        let json = r#"{
            "code": 429,
            "message": "You have run out of API credits for the current minute.",
            "status": "error"
        }"#;
        let payload: QuotePayload = serde_json::from_str(json).unwrap();

        assert!(matches!(
            payload.api_error(),
            Some(FeedError::ProviderRateLimited { .. })
        ));
    }

    #[test]
    fn test_auth_envelope() {
        let json = r#"{
            "code": 401,
            "message": "apikey parameter is incorrect or not specified",
            "status": "error"
        }"#;
        let payload: QuotePayload = serde_json::from_str(json).unwrap();

        assert!(matches!(
            payload.api_error(),
            Some(FeedError::AuthFailed { .. })
        ));
    }

    #[test]
    fn test_not_found_envelope() {
        let json = r#"{
            "code": 404,
            "message": "symbol not found: ZZZZ",
            "status": "error"
        }"#;
        let payload: QuotePayload = serde_json::from_str(json).unwrap();

        assert!(matches!(
            payload.api_error(),
            Some(FeedError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn test_parse_forex_rate() {
        let json = r#"{
            "symbol": "USD/KRW",
            "close": "1324.50",
            "change": "-2.10",
            "percent_change": "-0.16",
            "timestamp": 1700000000
        }"#;
        let payload: QuotePayload = serde_json::from_str(json).unwrap();

        let rate = payload.to_forex_rate("USD/KRW").unwrap();
        assert_eq!(rate.pair, "USD/KRW");
        assert_eq!(rate.rate, dec!(1324.50));
        assert_eq!(rate.bid, None);
        assert_eq!(rate.source, QuoteSource::TwelveData);
    }

    #[test]
    fn test_parse_batch_with_embedded_error() {
        let symbols = vec!["AAPL".to_string(), "ZZZZ".to_string()];
        let text = format!(
            r#"{{
                "AAPL": {},
                "ZZZZ": {{"code": 404, "message": "symbol not found", "status": "error"}}
            }}"#,
            QUOTE_JSON
        );

        let results = TwelveDataProvider::parse_batch(&text, &symbols).unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].0, "AAPL");
        assert!(results[0].1.is_ok());

        assert_eq!(results[1].0, "ZZZZ");
        assert!(matches!(
            results[1].1,
            Err(FeedError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn test_parse_batch_missing_symbol_is_isolated() {
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let text = format!(r#"{{"AAPL": {}}}"#, QUOTE_JSON);

        let results = TwelveDataProvider::parse_batch(&text, &symbols).unwrap();
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(FeedError::SymbolNotFound(_))));
    }

    #[test]
    fn test_parse_batch_top_level_envelope_fails_batch() {
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let text = r#"{
            "code": 429,
            "message": "You have run out of API credits for the current day.",
            "status": "error"
        }"#;

        let result = TwelveDataProvider::parse_batch(text, &symbols);
        assert!(matches!(
            result,
            Err(FeedError::ProviderRateLimited { .. })
        ));
    }

    #[test]
    fn test_provider_identity() {
        let provider = TwelveDataProvider::new("test_key".to_string());
        assert_eq!(provider.id(), "TWELVE_DATA");
        assert_eq!(provider.source(), QuoteSource::TwelveData);
        assert!(provider.supports_batch());
    }
}
