//! Alpha Vantage quote provider implementation.
//!
//! This module provides quotes from the Alpha Vantage API:
//! - Equities and indices via the GLOBAL_QUOTE endpoint
//! - FX rates via the CURRENCY_EXCHANGE_RATE endpoint
//!
//! Alpha Vantage names payload fields with numbered labels
//! ("05. price", "10. change percent"), returns API-level problems as a
//! "Note"/"Information" body with HTTP 200, and has no bulk endpoint.
//! Free tier is limited to 25 API calls per day.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::errors::FeedError;
use crate::models::{ForexRate, IndexQuote, QuoteSource, StockQuote};
use crate::provider::{parse_decimal, parse_percent, split_pair, QuoteProvider};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Alpha Vantage quote provider.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

// ============================================================================
// Response structures for the Alpha Vantage API
// ============================================================================

/// GLOBAL_QUOTE response envelope.
#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

/// Quote fields, numbered-label naming as shipped by the API.
#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "02. open")]
    open: Option<String>,
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
    // Note: "07. latest trading day" and "08. previous close" exist but are not used
}

/// CURRENCY_EXCHANGE_RATE response envelope.
#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    exchange_rate: Option<ExchangeRate>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRate {
    #[serde(rename = "1. From_Currency Code")]
    from_currency: Option<String>,
    #[serde(rename = "3. To_Currency Code")]
    to_currency: Option<String>,
    #[serde(rename = "5. Exchange Rate")]
    rate: Option<String>,
    #[serde(rename = "8. Bid Price")]
    bid: Option<String>,
    #[serde(rename = "9. Ask Price")]
    ask: Option<String>,
}

// ============================================================================
// AlphaVantageProvider implementation
// ============================================================================

impl AlphaVantageProvider {
    /// Create a new Alpha Vantage provider with the given API key.
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, api_key }
    }

    /// Make a request to the Alpha Vantage API.
    async fn fetch(&self, params: &[(&str, &str)]) -> Result<String, FeedError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(BASE_URL, &all_params).map_err(|e| {
            FeedError::ProviderCallFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to build URL: {}", e),
            }
        })?;

        debug!(
            "alpha vantage request: {}",
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

    /// Check for API-level errors reported in the response body.
    ///
    /// Alpha Vantage reports rate limiting as a "Note" or "Information"
    /// message with HTTP 200; those must be classified as a retryable
    /// rate-limit failure, not a generic error.
    fn check_api_error(
        error_message: &Option<String>,
        note: &Option<String>,
        information: &Option<String>,
    ) -> Result<(), FeedError> {
        if let Some(msg) = error_message {
            let lowered = msg.to_lowercase();
            if lowered.contains("apikey") || lowered.contains("api key") {
                return Err(FeedError::AuthFailed {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            if lowered.contains("invalid api call") || lowered.contains("not found") {
                return Err(FeedError::SymbolNotFound(msg.clone()));
            }
            return Err(FeedError::ProviderCallFailed {
                provider: PROVIDER_ID.to_string(),
                message: msg.clone(),
            });
        }

        for body in [note, information].into_iter().flatten() {
            let lowered = body.to_lowercase();
            if lowered.contains("call frequency")
                || lowered.contains("rate limit")
                || lowered.contains("premium")
            {
                return Err(FeedError::ProviderRateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            warn!("alpha vantage note: {}", body);
        }

        Ok(())
    }

    /// Fetch and validate a GLOBAL_QUOTE payload.
    async fn fetch_global_quote(&self, symbol: &str) -> Result<GlobalQuote, FeedError> {
        let params = [("function", "GLOBAL_QUOTE"), ("symbol", symbol)];
        let text = self.fetch(&params).await?;

        let response: GlobalQuoteResponse =
            serde_json::from_str(&text).map_err(|e| FeedError::ParseFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to parse response: {}", e),
            })?;

        Self::check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        // An empty "Global Quote" object is how the API signals an unknown
        // symbol.
        match response.global_quote {
            Some(quote) if quote.price.is_some() => Ok(quote),
            _ => Err(FeedError::SymbolNotFound(symbol.to_string())),
        }
    }

    fn require_decimal(field: &str, value: &Option<String>) -> Result<rust_decimal::Decimal, FeedError> {
        value
            .as_deref()
            .and_then(parse_decimal)
            .ok_or_else(|| FeedError::ParseFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("missing or unparsable field '{}'", field),
            })
    }
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn source(&self) -> QuoteSource {
        QuoteSource::AlphaVantage
    }

    async fn stock_quote(&self, symbol: &str) -> Result<StockQuote, FeedError> {
        let quote = self.fetch_global_quote(symbol).await?;

        let change_percent = quote
            .change_percent
            .as_deref()
            .and_then(parse_percent)
            .ok_or_else(|| FeedError::ParseFailed {
                provider: PROVIDER_ID.to_string(),
                message: "missing or unparsable field '10. change percent'".to_string(),
            })?;

        Ok(StockQuote {
            symbol: quote.symbol.clone().unwrap_or_else(|| symbol.to_string()),
            price: Self::require_decimal("05. price", &quote.price)?,
            change: Self::require_decimal("09. change", &quote.change)?,
            change_percent,
            open: quote.open.as_deref().and_then(parse_decimal),
            high: quote.high.as_deref().and_then(parse_decimal),
            low: quote.low.as_deref().and_then(parse_decimal),
            volume: quote.volume.as_deref().and_then(parse_decimal),
            market_cap: None,
            currency: None,
            source: QuoteSource::AlphaVantage,
            cached: false,
            timestamp: Utc::now(),
        })
    }

    async fn forex_rate(&self, pair: &str) -> Result<ForexRate, FeedError> {
        let (from, to) = split_pair(pair).ok_or_else(|| {
            FeedError::SymbolNotFound(format!("cannot parse currency pair: {}", pair))
        })?;

        let params = [
            ("function", "CURRENCY_EXCHANGE_RATE"),
            ("from_currency", from),
            ("to_currency", to),
        ];
        let text = self.fetch(&params).await?;

        let response: ExchangeRateResponse =
            serde_json::from_str(&text).map_err(|e| FeedError::ParseFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to parse response: {}", e),
            })?;

        Self::check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        let rate = response
            .exchange_rate
            .ok_or_else(|| FeedError::SymbolNotFound(pair.to_string()))?;

        let pair_name = match (&rate.from_currency, &rate.to_currency) {
            (Some(f), Some(t)) => format!("{}/{}", f, t),
            _ => format!("{}/{}", from, to),
        };

        // The endpoint reports a spot rate with no previous close, so there
        // is nothing to derive change figures from.
        Ok(ForexRate {
            pair: pair_name,
            rate: Self::require_decimal("5. Exchange Rate", &rate.rate)?,
            change: rust_decimal::Decimal::ZERO,
            change_percent: rust_decimal::Decimal::ZERO,
            bid: rate.bid.as_deref().and_then(parse_decimal),
            ask: rate.ask.as_deref().and_then(parse_decimal),
            source: QuoteSource::AlphaVantage,
            cached: false,
            timestamp: Utc::now(),
        })
    }

    async fn index_quote(&self, symbol: &str) -> Result<IndexQuote, FeedError> {
        let quote = self.fetch_global_quote(symbol).await?;

        let change_percent = quote
            .change_percent
            .as_deref()
            .and_then(parse_percent)
            .ok_or_else(|| FeedError::ParseFailed {
                provider: PROVIDER_ID.to_string(),
                message: "missing or unparsable field '10. change percent'".to_string(),
            })?;

        Ok(IndexQuote {
            symbol: quote.symbol.clone().unwrap_or_else(|| symbol.to_string()),
            value: Self::require_decimal("05. price", &quote.price)?,
            change: Self::require_decimal("09. change", &quote.change)?,
            change_percent,
            source: QuoteSource::AlphaVantage,
            cached: false,
            timestamp: Utc::now(),
        })
    }
}
