//! Finboard Market Data Crate
//!
//! This crate provides the financial data aggregation service behind the
//! finboard dashboard: canonical quote models, two upstream provider
//! clients, a two-tier cache, and the error/telemetry sink.
//!
//! # Overview
//!
//! The crate supports:
//! - Stock quotes, forex rates and index quotes from two independent
//!   providers (Twelve Data, Alpha Vantage)
//! - Transparent failover from the primary to the secondary provider
//! - Two-tier caching: fast in-process tier plus an optional shared
//!   store, with stale-cache fallback when both providers are down
//! - Structured error classification with rolling per-code statistics
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |     Caller       |  (dashboard widgets, periodic refresh)
//! +------------------+
//!          |
//!          v
//! +------------------+     +---------------------+
//! | MarketDataService| --> |     TieredCache     |  local + shared tier
//! +------------------+     +---------------------+
//!          |
//!          v
//! +------------------+     +---------------------+
//! |  QuoteProvider   | --> |       Quote         |  canonical model
//! +------------------+     +---------------------+
//!   (primary, then
//!    secondary)
//! ```
//!
//! # Wiring
//!
//! ```ignore
//! use std::sync::Arc;
//! use finboard_market_data::{
//!     AlphaVantageProvider, ErrorMonitor, FeedConfig, MarketDataService,
//!     TwelveDataProvider,
//! };
//!
//! let config = FeedConfig::from_env();
//! let shared_store = config.open_shared_store().await;
//!
//! let service = MarketDataService::new(
//!     Arc::new(TwelveDataProvider::new(config.twelve_data_api_key.clone().unwrap())),
//!     Arc::new(AlphaVantageProvider::new(config.alpha_vantage_api_key.clone().unwrap())),
//!     shared_store,
//!     Arc::new(ErrorMonitor::new()),
//!     config.service.clone(),
//! );
//! ```

pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod provider;
pub mod service;
pub mod telemetry;

// Re-export all public types from models
pub use models::{ForexRate, IndexQuote, Quote, QuoteKind, QuoteSource, StockQuote};

// Re-export error types
pub use errors::FeedError;

// Re-export provider types
pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::twelve_data::TwelveDataProvider;
pub use provider::QuoteProvider;

// Re-export cache types
pub use cache::{CacheEntry, CacheStats, TieredCache};

// Re-export service types
pub use service::{
    BatchQuoteResponse, ForexSnapshot, HealthStatus, MarketDataService, MarketSnapshot,
    ProviderHealth, ServiceConfig, SymbolError, KOREAN_MARKET_INDICES, KOREAN_MARKET_STOCKS,
    MAJOR_FOREX_PAIRS,
};

// Re-export telemetry types
pub use telemetry::{classify, AlertSink, ConsoleAlertSink, ErrorMonitor, ErrorStats, Severity};

// Re-export configuration
pub use config::FeedConfig;
