//! Quote aggregation service.
//!
//! Orchestrates cache lookup, primary-provider call, secondary-provider
//! failover, stale-cache fallback, and write-back:
//!
//! ```text
//! caller -> cache (fresh read) -> [miss]
//!        -> primary provider   -> [failure]
//!        -> secondary provider -> [failure]
//!        -> cache (stale read) -> [miss]
//!        -> AllProvidersFailed
//! ```
//!
//! Serving display data a few extra minutes stale is preferable to an
//! error screen, so the stale-cache step is on by default; it never
//! fabricates a quote when nothing is cached at all.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;

use finboard_shared_store::SharedStore;

use crate::cache::{CacheStats, TieredCache};
use crate::errors::FeedError;
use crate::models::{ForexRate, IndexQuote, Quote, QuoteKind, StockQuote};
use crate::provider::QuoteProvider;
use crate::telemetry::ErrorMonitor;

/// Index basket shown on the Korean market board.
pub const KOREAN_MARKET_INDICES: &[&str] = &["KOSPI", "KOSDAQ"];

/// Large-cap basket shown on the Korean market board:
/// Samsung Electronics, SK hynix, NAVER, Hyundai Motor, LG Chem.
pub const KOREAN_MARKET_STOCKS: &[&str] = &[
    "005930.KS",
    "000660.KS",
    "035420.KS",
    "005380.KS",
    "051910.KS",
];

/// Major currency pairs shown on the forex board.
pub const MAJOR_FOREX_PAIRS: &[&str] = &[
    "USD/KRW",
    "EUR/USD",
    "USD/JPY",
    "GBP/USD",
    "EUR/KRW",
    "JPY/KRW",
];

/// Known-good symbol used by the health probe.
const HEALTH_PROBE_SYMBOL: &str = "AAPL";

/// Aggregation service configuration.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Interval of the background refresh task, when enabled.
    pub refresh_interval: Duration,
    /// Time-to-live for cached quotes.
    pub cache_ttl: Duration,
    /// Recognized for configuration compatibility. The fetch path performs
    /// a single attempt per provider and then fails over; this field is
    /// not consumed by a retry loop.
    pub max_retries: u32,
    /// Whether the stale-cache fallback step runs after both providers
    /// have failed.
    pub fallback_to_cache: bool,
    /// Whether [`MarketDataService::spawn_refresh_task`] starts the
    /// periodic background refresh.
    pub enable_realtime: bool,
    /// Ceiling on any single provider call.
    pub provider_timeout: Duration,
    /// Bound on the local cache tier's entry count.
    pub local_cache_max_entries: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            cache_ttl: crate::cache::DEFAULT_TTL,
            max_retries: 3,
            fallback_to_cache: true,
            enable_realtime: false,
            provider_timeout: Duration::from_secs(10),
            local_cache_max_entries: crate::cache::DEFAULT_MAX_ENTRIES,
        }
    }
}

/// A symbol that could not be resolved, with the reason.
#[derive(Clone, Debug, Serialize)]
pub struct SymbolError {
    pub symbol: String,
    pub error: String,
}

/// Outcome of a multi-symbol fetch. Partial success is the expected,
/// reported shape - resolved quotes alongside per-symbol errors.
#[derive(Debug, Serialize)]
pub struct BatchQuoteResponse {
    pub quotes: Vec<StockQuote>,
    pub errors: Vec<SymbolError>,
}

/// Korean market board snapshot.
#[derive(Debug, Serialize)]
pub struct MarketSnapshot {
    pub indices: Vec<IndexQuote>,
    pub stocks: Vec<StockQuote>,
    pub errors: Vec<SymbolError>,
}

/// Major forex board snapshot.
#[derive(Debug, Serialize)]
pub struct ForexSnapshot {
    pub rates: Vec<ForexRate>,
    pub errors: Vec<SymbolError>,
}

/// Health of a single provider as seen by the probe.
#[derive(Debug, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated health/status report.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub primary: ProviderHealth,
    pub secondary: ProviderHealth,
    pub cache: CacheStats,
}

/// The financial data aggregation service.
///
/// "Primary" and "secondary" are policy: both fields hold the same trait
/// object type and can be swapped at construction.
pub struct MarketDataService {
    primary: Arc<dyn QuoteProvider>,
    secondary: Arc<dyn QuoteProvider>,
    cache: TieredCache,
    monitor: Arc<ErrorMonitor>,
    config: ServiceConfig,
}

impl MarketDataService {
    /// Build the service.
    ///
    /// The shared store is the optional capability decided once at
    /// startup; `None` yields local-only caching.
    pub fn new(
        primary: Arc<dyn QuoteProvider>,
        secondary: Arc<dyn QuoteProvider>,
        shared_store: Option<Arc<dyn SharedStore>>,
        monitor: Arc<ErrorMonitor>,
        config: ServiceConfig,
    ) -> Self {
        let cache = match shared_store {
            Some(store) => TieredCache::with_shared(
                config.local_cache_max_entries,
                config.cache_ttl,
                store,
            ),
            None => TieredCache::new(config.local_cache_max_entries, config.cache_ttl),
        };

        Self {
            primary,
            secondary,
            cache,
            monitor,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Get a single stock quote.
    pub async fn stock_quote(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> Result<StockQuote, FeedError> {
        let quote = self
            .fetch_quote(QuoteKind::Stock, symbol, force_refresh)
            .await?;
        quote.into_stock().ok_or_else(|| kind_mismatch(symbol))
    }

    /// Get a single forex rate.
    pub async fn forex_rate(
        &self,
        pair: &str,
        force_refresh: bool,
    ) -> Result<ForexRate, FeedError> {
        let quote = self
            .fetch_quote(QuoteKind::Forex, pair, force_refresh)
            .await?;
        quote.into_forex().ok_or_else(|| kind_mismatch(pair))
    }

    /// Get a single index quote.
    pub async fn index_quote(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> Result<IndexQuote, FeedError> {
        let quote = self
            .fetch_quote(QuoteKind::Index, symbol, force_refresh)
            .await?;
        quote.into_index().ok_or_else(|| kind_mismatch(symbol))
    }

    /// Get quotes for several stock symbols.
    ///
    /// One batched primary call is attempted for the symbols the cache
    /// cannot answer; if the batch mechanism fails as a whole (or a
    /// symbol fails inside it), the affected symbols are decomposed into
    /// independent single-symbol fetches through the full failover chain,
    /// so one bad symbol cannot sink the others.
    pub async fn stock_quotes(
        &self,
        symbols: &[String],
        force_refresh: bool,
    ) -> BatchQuoteResponse {
        let mut quotes = Vec::with_capacity(symbols.len());
        let mut errors = Vec::new();
        let mut remaining: Vec<String> = Vec::new();

        if force_refresh {
            remaining.extend(symbols.iter().cloned());
        } else {
            for symbol in symbols {
                match self.cache.get(QuoteKind::Stock, symbol).await {
                    Some(mut quote) => {
                        quote.mark_cached();
                        match quote.into_stock() {
                            Some(stock) => quotes.push(stock),
                            None => remaining.push(symbol.clone()),
                        }
                    }
                    None => remaining.push(symbol.clone()),
                }
            }
        }

        if remaining.is_empty() {
            return BatchQuoteResponse { quotes, errors };
        }

        if self.primary.supports_batch() {
            let operation = format!("stocks[{}]", remaining.len());
            let batch_call = async {
                match tokio::time::timeout(
                    self.config.provider_timeout,
                    self.primary.stock_quotes(&remaining),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FeedError::Timeout {
                        provider: self.primary.id().to_string(),
                    }),
                }
            };

            match self
                .monitor
                .observe(self.primary.id(), &operation, batch_call)
                .await
            {
                Ok(results) => {
                    let mut fallback = Vec::new();
                    for (symbol, result) in results {
                        match result {
                            Ok(stock) => {
                                self.cache
                                    .set(
                                        QuoteKind::Stock,
                                        &symbol,
                                        &Quote::Stock(stock.clone()),
                                    )
                                    .await;
                                quotes.push(stock);
                            }
                            Err(e) => {
                                debug!(
                                    "batch entry for {} failed ({}), retrying individually",
                                    symbol, e
                                );
                                fallback.push(symbol);
                            }
                        }
                    }
                    remaining = fallback;
                }
                Err(e) => {
                    warn!(
                        "batch fetch failed, decomposing into {} single calls: {}",
                        remaining.len(),
                        e
                    );
                }
            }
        }

        if !remaining.is_empty() {
            let singles = join_all(
                remaining
                    .iter()
                    .map(|symbol| self.stock_quote(symbol, force_refresh)),
            )
            .await;

            for (symbol, result) in remaining.iter().zip(singles) {
                match result {
                    Ok(stock) => quotes.push(stock),
                    Err(e) => errors.push(SymbolError {
                        symbol: symbol.clone(),
                        error: e.to_string(),
                    }),
                }
            }
        }

        BatchQuoteResponse { quotes, errors }
    }

    /// Snapshot of the Korean market board basket.
    pub async fn korean_market_snapshot(&self, force_refresh: bool) -> MarketSnapshot {
        let mut indices = Vec::with_capacity(KOREAN_MARKET_INDICES.len());
        let mut errors = Vec::new();

        let index_results = join_all(
            KOREAN_MARKET_INDICES
                .iter()
                .map(|symbol| self.index_quote(symbol, force_refresh)),
        )
        .await;

        for (symbol, result) in KOREAN_MARKET_INDICES.iter().zip(index_results) {
            match result {
                Ok(index) => indices.push(index),
                Err(e) => errors.push(SymbolError {
                    symbol: symbol.to_string(),
                    error: e.to_string(),
                }),
            }
        }

        let stock_symbols: Vec<String> = KOREAN_MARKET_STOCKS
            .iter()
            .map(|s| s.to_string())
            .collect();
        let batch = self.stock_quotes(&stock_symbols, force_refresh).await;
        errors.extend(batch.errors);

        MarketSnapshot {
            indices,
            stocks: batch.quotes,
            errors,
        }
    }

    /// Snapshot of the major forex pairs basket.
    pub async fn major_forex_snapshot(&self, force_refresh: bool) -> ForexSnapshot {
        let results = join_all(
            MAJOR_FOREX_PAIRS
                .iter()
                .map(|pair| self.forex_rate(pair, force_refresh)),
        )
        .await;

        let mut rates = Vec::with_capacity(MAJOR_FOREX_PAIRS.len());
        let mut errors = Vec::new();

        for (pair, result) in MAJOR_FOREX_PAIRS.iter().zip(results) {
            match result {
                Ok(rate) => rates.push(rate),
                Err(e) => errors.push(SymbolError {
                    symbol: pair.to_string(),
                    error: e.to_string(),
                }),
            }
        }

        ForexSnapshot { rates, errors }
    }

    /// Probe both providers concurrently and report cache statistics.
    ///
    /// Total latency is bounded by the slower of the two probes, not
    /// their sum; each probe is bounded by the provider timeout.
    pub async fn health_status(&self) -> HealthStatus {
        let (primary, secondary) = tokio::join!(
            self.probe(&self.primary),
            self.probe(&self.secondary)
        );

        HealthStatus {
            primary,
            secondary,
            cache: self.cache.stats(),
        }
    }

    /// Start the periodic background refresh, when enabled.
    ///
    /// The task runs independently of foreground request handling and
    /// calls the same fetch path with `force_refresh`. Abort the returned
    /// handle at shutdown.
    pub fn spawn_refresh_task(
        self: &Arc<Self>,
        symbols: Vec<String>,
    ) -> Option<JoinHandle<()>> {
        if !self.config.enable_realtime {
            return None;
        }

        let service = Arc::clone(self);
        info!(
            "starting background refresh every {:?} for {} symbols",
            service.config.refresh_interval,
            symbols.len()
        );

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.config.refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                for symbol in &symbols {
                    if let Err(e) = service.stock_quote(symbol, true).await {
                        debug!("background refresh failed for {}: {}", symbol, e);
                    }
                }
            }
        }))
    }

    /// The failover chain for one quote.
    async fn fetch_quote(
        &self,
        kind: QuoteKind,
        id: &str,
        force_refresh: bool,
    ) -> Result<Quote, FeedError> {
        if !force_refresh {
            if let Some(mut quote) = self.cache.get(kind, id).await {
                debug!("cache hit for {}:{}", kind, id);
                quote.mark_cached();
                return Ok(quote);
            }
        }

        let operation = format!("{}:{}", kind, id);

        match self
            .monitor
            .observe(
                self.primary.id(),
                &operation,
                self.call_provider(&self.primary, kind, id),
            )
            .await
        {
            Ok(quote) => {
                self.cache.set(kind, id, &quote).await;
                return Ok(quote);
            }
            Err(e) => debug!("primary failed for {}, failing over: {}", operation, e),
        }

        match self
            .monitor
            .observe(
                self.secondary.id(),
                &operation,
                self.call_provider(&self.secondary, kind, id),
            )
            .await
        {
            Ok(quote) => {
                self.cache.set(kind, id, &quote).await;
                return Ok(quote);
            }
            Err(e) => debug!("secondary failed for {}: {}", operation, e),
        }

        if self.config.fallback_to_cache {
            if let Some(mut quote) = self.cache.get_stale(kind, id) {
                warn!(
                    "all providers failed for {}, serving stale cache entry",
                    operation
                );
                quote.mark_cached();
                return Ok(quote);
            }
        }

        let error = FeedError::AllProvidersFailed {
            symbol: id.to_string(),
        };
        self.monitor.record("aggregator", &error, &operation);
        Err(error)
    }

    /// One provider call, bounded by the configured timeout.
    async fn call_provider(
        &self,
        provider: &Arc<dyn QuoteProvider>,
        kind: QuoteKind,
        id: &str,
    ) -> Result<Quote, FeedError> {
        let call = async {
            match kind {
                QuoteKind::Stock => provider.stock_quote(id).await.map(Quote::Stock),
                QuoteKind::Forex => provider.forex_rate(id).await.map(Quote::Forex),
                QuoteKind::Index => provider.index_quote(id).await.map(Quote::Index),
            }
        };

        match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(FeedError::Timeout {
                provider: provider.id().to_string(),
            }),
        }
    }

    async fn probe(&self, provider: &Arc<dyn QuoteProvider>) -> ProviderHealth {
        let start = Instant::now();
        let result = tokio::time::timeout(
            self.config.provider_timeout,
            provider.stock_quote(HEALTH_PROBE_SYMBOL),
        )
        .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let error = match result {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("health probe timed out".to_string()),
        };

        ProviderHealth {
            provider: provider.id().to_string(),
            healthy: error.is_none(),
            latency_ms,
            error,
        }
    }
}

/// Safety net for the cache returning a quote of the wrong kind; keys are
/// kind-scoped, so this does not happen in practice.
fn kind_mismatch(id: &str) -> FeedError {
    FeedError::ProviderCallFailed {
        provider: "cache".to_string(),
        message: format!("unexpected quote kind cached for {}", id),
    }
}
