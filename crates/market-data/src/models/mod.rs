//! Canonical market data models
//!
//! This module contains the provider-agnostic quote types:
//! - `quote` - StockQuote, ForexRate, IndexQuote and the Quote wrapper,
//!   plus the QuoteSource and QuoteKind enums

mod quote;

pub use quote::{ForexRate, IndexQuote, Quote, QuoteKind, QuoteSource, StockQuote};
