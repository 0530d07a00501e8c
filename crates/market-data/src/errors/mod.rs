//! Error types for the market data crate.
//!
//! [`FeedError`] is the single error enum for all quote operations. Each
//! variant carries a stable uppercase [`code`](FeedError::code) used by the
//! telemetry sink for severity classification and per-code statistics.
//!
//! Only `AllProvidersFailed` is surfaced to ultimate callers; everything
//! else is absorbed by the next fallback step or degrades service quality
//! silently (see the service and cache modules).

use thiserror::Error;

/// Errors that can occur during quote operations.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The provider does not know the requested symbol.
    /// Terminal for this provider; failover may still succeed.
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// The provider call exceeded the request timeout.
    #[error("timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider reported a rate limit or exhausted quota.
    /// Distinct from a generic failure: retryable, informs backoff policy.
    #[error("rate limited: {provider}")]
    ProviderRateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The provider rejected our credentials.
    #[error("authentication rejected: {provider}")]
    AuthFailed {
        /// The provider that rejected the API key
        provider: String,
    },

    /// Network or HTTP-level failure talking to the provider.
    #[error("provider error: {provider} - {message}")]
    ProviderCallFailed {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The provider responded, but a required field was missing or
    /// unparsable. Never produces a partially-filled quote.
    #[error("invalid payload from {provider}: {message}")]
    ParseFailed {
        /// The provider whose payload failed validation
        provider: String,
        /// Description of the validation failure
        message: String,
    },

    /// Both providers and the stale-cache fallback failed.
    /// Terminal for a single fetch, non-fatal for the service.
    #[error("all providers failed: {symbol}")]
    AllProvidersFailed {
        /// The symbol the fetch was for
        symbol: String,
    },

    /// A cache tier was unreachable. Never surfaced to callers; the cache
    /// degrades to the remaining tier instead.
    #[error("cache store unavailable: {0}")]
    CacheUnavailable(String),
}

impl FeedError {
    /// Stable uppercase code for telemetry and severity rules.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SymbolNotFound(_) => "SYMBOL_NOT_FOUND",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ProviderRateLimited { .. } => "RATE_LIMITED",
            Self::AuthFailed { .. } => "AUTH_FAILED",
            Self::ProviderCallFailed { .. } => "PROVIDER_ERROR",
            Self::ParseFailed { .. } => "PARSE_FAILED",
            Self::AllProvidersFailed { .. } => "ALL_PROVIDERS_FAILED",
            Self::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
        }
    }

    /// Whether a later attempt against the same provider could succeed.
    ///
    /// The fetch path does not retry (it fails over), but the distinction
    /// is kept so a backoff policy can be layered on without reclassifying
    /// errors.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ProviderRateLimited { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let cases: Vec<(FeedError, &str)> = vec![
            (
                FeedError::SymbolNotFound("XXXX".to_string()),
                "SYMBOL_NOT_FOUND",
            ),
            (
                FeedError::Timeout {
                    provider: "TWELVE_DATA".to_string(),
                },
                "TIMEOUT",
            ),
            (
                FeedError::ProviderRateLimited {
                    provider: "ALPHA_VANTAGE".to_string(),
                },
                "RATE_LIMITED",
            ),
            (
                FeedError::AuthFailed {
                    provider: "TWELVE_DATA".to_string(),
                },
                "AUTH_FAILED",
            ),
            (
                FeedError::AllProvidersFailed {
                    symbol: "AAPL".to_string(),
                },
                "ALL_PROVIDERS_FAILED",
            ),
        ];

        for (error, code) in cases {
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FeedError::Timeout {
            provider: "TWELVE_DATA".to_string()
        }
        .is_retryable());
        assert!(FeedError::ProviderRateLimited {
            provider: "TWELVE_DATA".to_string()
        }
        .is_retryable());

        assert!(!FeedError::SymbolNotFound("XXXX".to_string()).is_retryable());
        assert!(!FeedError::ParseFailed {
            provider: "ALPHA_VANTAGE".to_string(),
            message: "missing price".to_string(),
        }
        .is_retryable());
        assert!(!FeedError::AllProvidersFailed {
            symbol: "AAPL".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = FeedError::ProviderCallFailed {
            provider: "TWELVE_DATA".to_string(),
            message: "HTTP 502".to_string(),
        };
        assert_eq!(format!("{}", error), "provider error: TWELVE_DATA - HTTP 502");

        let error = FeedError::AllProvidersFailed {
            symbol: "USD/KRW".to_string(),
        };
        assert_eq!(format!("{}", error), "all providers failed: USD/KRW");
    }
}
