//! Quote provider trait definition.

use async_trait::async_trait;

use crate::errors::FeedError;
use crate::models::{ForexRate, IndexQuote, QuoteSource, StockQuote};

/// Trait for upstream quote providers.
///
/// Implement this trait to add support for a new quote source. Each
/// method performs one network call and either returns a fully populated
/// canonical quote or a typed failure - a missing required field is a
/// [`FeedError::ParseFailed`], never a zero-value quote.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// A constant string like "TWELVE_DATA" or "ALPHA_VANTAGE", used for
    /// logging and error attribution.
    fn id(&self) -> &'static str;

    /// The source tag stamped onto quotes produced by this provider.
    fn source(&self) -> QuoteSource;

    /// Whether [`stock_quotes`](Self::stock_quotes) issues one bulk call.
    ///
    /// Providers without a bulk endpoint keep the default sequential
    /// implementation.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Fetch the latest quote for an equity symbol.
    async fn stock_quote(&self, symbol: &str) -> Result<StockQuote, FeedError>;

    /// Fetch the latest rate for a currency pair (e.g. "USD/KRW").
    async fn forex_rate(&self, pair: &str) -> Result<ForexRate, FeedError>;

    /// Fetch the latest level for a market index.
    async fn index_quote(&self, symbol: &str) -> Result<IndexQuote, FeedError>;

    /// Fetch quotes for several equity symbols.
    ///
    /// The outer `Result` is the batch mechanism itself; the inner results
    /// are per-symbol, so one bad symbol cannot abort the others. The
    /// default implementation calls [`stock_quote`](Self::stock_quote)
    /// sequentially, which preserves that isolation for providers without
    /// a bulk endpoint.
    async fn stock_quotes(
        &self,
        symbols: &[String],
    ) -> Result<Vec<(String, Result<StockQuote, FeedError>)>, FeedError> {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            results.push((symbol.clone(), self.stock_quote(symbol).await));
        }
        Ok(results)
    }
}
