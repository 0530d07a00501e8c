//! The rate limiter itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use finboard_shared_store::{MemoryStore, SharedStore, WindowCount};

use crate::key::{KeyStrategy, RequestContext};
use crate::policy::RateLimitPolicy;

/// Outcome of a rate limit check.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Instant at which the window resets.
    pub reset_at: DateTime<Utc>,
    pub limit: u32,
}

impl RateLimitDecision {
    /// How long a denied client should wait before retrying.
    pub fn retry_after(&self) -> Duration {
        (self.reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Fixed-window request gate for one endpoint class.
///
/// Counts in the shared store when one is configured, so the limit holds
/// across service instances; falls back to the process-local store when
/// the shared store is absent or erroring. Infrastructure trouble always
/// degrades to counting locally (and ultimately to allowing the request),
/// never to rejecting it.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    strategy: KeyStrategy,
    shared: Option<Arc<dyn SharedStore>>,
    local: MemoryStore,
}

impl RateLimiter {
    /// Local-only limiter.
    pub fn new(policy: RateLimitPolicy, strategy: KeyStrategy) -> Self {
        Self {
            policy,
            strategy,
            shared: None,
            local: MemoryStore::new(),
        }
    }

    /// Limiter counting through a shared store.
    pub fn with_shared_store(
        policy: RateLimitPolicy,
        strategy: KeyStrategy,
        store: Arc<dyn SharedStore>,
    ) -> Self {
        Self {
            shared: Some(store),
            ..Self::new(policy, strategy)
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Check (and count) one request.
    pub async fn check(&self, ctx: &RequestContext<'_>) -> RateLimitDecision {
        let key = self.strategy.derive(ctx);

        let counted = match &self.shared {
            Some(store) => match store.incr_with_ttl(&key, self.policy.window).await {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!(
                        "shared rate limit store failed for {}, counting locally: {}",
                        key, e
                    );
                    None
                }
            },
            None => None,
        };

        let count = match counted {
            Some(count) => count,
            None => match self.local.incr_with_ttl(&key, self.policy.window).await {
                Ok(count) => count,
                Err(e) => {
                    // No working store at all: allow and log rather than
                    // fail closed on infrastructure trouble.
                    warn!("rate limit store unavailable, allowing {}: {}", key, e);
                    return self.allow_unchecked();
                }
            },
        };

        self.decide(&key, count)
    }

    fn decide(&self, key: &str, count: WindowCount) -> RateLimitDecision {
        let allowed = count.count <= u64::from(self.policy.limit);
        let remaining = u64::from(self.policy.limit)
            .saturating_sub(count.count)
            .min(u64::from(self.policy.limit)) as u32;

        if !allowed {
            debug!(
                "rate limit exceeded for {}: {} of {} in window",
                key, count.count, self.policy.limit
            );
        }

        RateLimitDecision {
            allowed,
            remaining,
            reset_at: count.reset_at,
            limit: self.policy.limit,
        }
    }

    fn allow_unchecked(&self) -> RateLimitDecision {
        let window = chrono::Duration::from_std(self.policy.window)
            .unwrap_or_else(|_| chrono::Duration::zero());

        RateLimitDecision {
            allowed: true,
            remaining: self.policy.limit,
            reset_at: Utc::now() + window,
            limit: self.policy.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finboard_shared_store::StoreError;

    fn policy(limit: u32, window: Duration) -> RateLimitPolicy {
        RateLimitPolicy::new(limit, window)
    }

    #[tokio::test]
    async fn test_first_request_allowed() {
        let limiter = RateLimiter::new(
            policy(5, Duration::from_secs(60)),
            KeyStrategy::ByAddress,
        );
        let ctx = RequestContext::new("203.0.113.7", "/");

        let decision = limiter.check(&ctx).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.limit, 5);
        assert!(decision.reset_at > Utc::now());
    }

    #[tokio::test]
    async fn test_sixth_request_denied() {
        let limiter = RateLimiter::new(
            policy(5, Duration::from_secs(60)),
            KeyStrategy::ByAddress,
        );
        let ctx = RequestContext::new("203.0.113.7", "/");

        for _ in 0..5 {
            assert!(limiter.check(&ctx).await.allowed);
        }

        let sixth = limiter.check(&ctx).await;
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert!(sixth.retry_after() > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_window_reset_starts_fresh() {
        let limiter = RateLimiter::new(
            policy(2, Duration::from_millis(80)),
            KeyStrategy::ByAddress,
        );
        let ctx = RequestContext::new("203.0.113.7", "/");

        assert!(limiter.check(&ctx).await.allowed);
        assert!(limiter.check(&ctx).await.allowed);
        assert!(!limiter.check(&ctx).await.allowed);

        tokio::time::sleep(Duration::from_millis(120)).await;

        let fresh = limiter.check(&ctx).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let limiter = RateLimiter::new(
            policy(1, Duration::from_secs(60)),
            KeyStrategy::ByAddress,
        );

        let first = RequestContext::new("203.0.113.7", "/");
        let second = RequestContext::new("198.51.100.2", "/");

        assert!(limiter.check(&first).await.allowed);
        assert!(!limiter.check(&first).await.allowed);
        assert!(limiter.check(&second).await.allowed);
    }

    /// Store stub whose every operation fails.
    struct FailingStore;

    #[async_trait]
    impl SharedStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Connection("store is down".to_string()))
        }
        async fn set_with_ttl(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Connection("store is down".to_string()))
        }
        async fn incr_with_ttl(
            &self,
            _key: &str,
            _window: Duration,
        ) -> Result<WindowCount, StoreError> {
            Err(StoreError::Connection("store is down".to_string()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Connection("store is down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_shared_store_failure_degrades_to_local() {
        let limiter = RateLimiter::with_shared_store(
            policy(2, Duration::from_secs(60)),
            KeyStrategy::ByAddress,
            Arc::new(FailingStore),
        );
        let ctx = RequestContext::new("203.0.113.7", "/");

        // The request path never errors; counting continues locally and
        // the limit still holds.
        assert!(limiter.check(&ctx).await.allowed);
        assert!(limiter.check(&ctx).await.allowed);
        assert!(!limiter.check(&ctx).await.allowed);
    }

    #[tokio::test]
    async fn test_shared_store_counts_across_limiters() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());

        // Two limiter instances simulate two service instances sharing
        // one counting store.
        let a = RateLimiter::with_shared_store(
            policy(2, Duration::from_secs(60)),
            KeyStrategy::ByAddress,
            Arc::clone(&store),
        );
        let b = RateLimiter::with_shared_store(
            policy(2, Duration::from_secs(60)),
            KeyStrategy::ByAddress,
            store,
        );
        let ctx = RequestContext::new("203.0.113.7", "/");

        assert!(a.check(&ctx).await.allowed);
        assert!(b.check(&ctx).await.allowed);
        assert!(!a.check(&ctx).await.allowed);
    }

    #[tokio::test]
    async fn test_identity_strategy_separates_users() {
        let limiter = RateLimiter::new(
            policy(1, Duration::from_secs(3600)),
            KeyStrategy::ByAddressAndIdentity,
        );

        let alice = RequestContext::new("203.0.113.7", "/api/consult").with_identity("alice");
        let bob = RequestContext::new("203.0.113.7", "/api/consult").with_identity("bob");

        assert!(limiter.check(&alice).await.allowed);
        assert!(!limiter.check(&alice).await.allowed);
        assert!(limiter.check(&bob).await.allowed);
    }
}
