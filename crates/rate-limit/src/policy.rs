//! Rate limit policy tiers.

use std::time::Duration;

/// Limit and window for one endpoint class.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitPolicy {
    /// Maximum requests allowed within one window.
    pub limit: u32,
    /// Fixed window length.
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Generic pages: generous.
    pub fn generic() -> Self {
        Self::new(300, Duration::from_secs(60))
    }

    /// Data-read endpoints: moderate.
    pub fn data_read() -> Self {
        Self::new(30, Duration::from_secs(60))
    }

    /// Sensitive submission endpoints (consultation forms): strict.
    pub fn submission() -> Self {
        Self::new(5, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_defaults() {
        assert_eq!(RateLimitPolicy::generic().limit, 300);
        assert_eq!(RateLimitPolicy::generic().window, Duration::from_secs(60));

        assert_eq!(RateLimitPolicy::data_read().limit, 30);

        assert_eq!(RateLimitPolicy::submission().limit, 5);
        assert_eq!(
            RateLimitPolicy::submission().window,
            Duration::from_secs(3600)
        );
    }
}
