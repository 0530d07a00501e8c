//! Request throttling gate for the finboard service endpoints.
//!
//! Fixed-window rate limiting keyed by client identity. Counting prefers
//! the shared store (correct across service instances) and falls back to
//! a process-local store when the shared store is absent or failing - a
//! store failure never blocks or crashes the request path. The gate only
//! fails closed on a genuine exceeded-limit determination.
//!
//! One [`RateLimiter`] is constructed per endpoint class, so different
//! classes combine their own [`RateLimitPolicy`] tier with their own
//! [`KeyStrategy`] granularity without touching the limiter's logic:
//!
//! ```ignore
//! use finboard_rate_limit::{KeyStrategy, RateLimiter, RateLimitPolicy, RequestContext};
//!
//! let data_gate = RateLimiter::with_shared_store(
//!     RateLimitPolicy::data_read(),
//!     KeyStrategy::ByAddressAndPath,
//!     shared_store,
//! );
//!
//! let decision = data_gate
//!     .check(&RequestContext::new("203.0.113.7", "/api/quotes"))
//!     .await;
//! if !decision.allowed {
//!     // surface "too many requests" with decision.retry_after()
//! }
//! ```

mod key;
mod limiter;
mod policy;

pub use key::{KeyStrategy, RequestContext};
pub use limiter::{RateLimitDecision, RateLimiter};
pub use policy::RateLimitPolicy;
