//! Quote provider abstractions and implementations.
//!
//! This module contains:
//! - The `QuoteProvider` trait that both upstream clients implement
//! - Concrete provider implementations (Twelve Data, Alpha Vantage)
//!
//! Providers are stateless adapters: given a symbol or pair, perform one
//! network call and translate the provider's proprietary response shape
//! into the canonical quote model, or return a typed failure. Which
//! provider is "primary" and which is "secondary" is aggregation-service
//! policy, not a property of the providers themselves.

mod traits;

pub mod alpha_vantage;
pub mod twelve_data;

pub use traits::QuoteProvider;

use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a decimal from a provider string field.
///
/// Providers ship numeric fields as JSON strings; an unparsable value is
/// treated the same as a missing one by callers.
pub(crate) fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s.trim()).ok()
}

/// Parse a percentage field, tolerating a trailing `%`.
pub(crate) fn parse_percent(s: &str) -> Option<Decimal> {
    parse_decimal(s.trim().trim_end_matches('%'))
}

/// Split a currency pair like "USD/KRW" or "USDKRW" into (from, to).
pub(crate) fn split_pair(pair: &str) -> Option<(&str, &str)> {
    if let Some((from, to)) = pair.split_once('/') {
        if !from.is_empty() && !to.is_empty() {
            return Some((from, to));
        }
        return None;
    }

    if pair.len() == 6 && pair.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some((&pair[..3], &pair[3..]));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("187.44"), Some(dec!(187.44)));
        assert_eq!(parse_decimal(" 1324.5 "), Some(dec!(1324.5)));
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal(""), None);
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("0.6571%"), Some(dec!(0.6571)));
        assert_eq!(parse_percent("-1.2"), Some(dec!(-1.2)));
        assert_eq!(parse_percent("%"), None);
    }

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("USD/KRW"), Some(("USD", "KRW")));
        assert_eq!(split_pair("EURUSD"), Some(("EUR", "USD")));
        assert_eq!(split_pair("USD/"), None);
        assert_eq!(split_pair("GOLD"), None);
    }
}
