//! Shared key-value store capability for the finboard workspace.
//!
//! Both the quote cache's shared tier and the rate limiter's counting store
//! speak the same minimal protocol: get, set-with-TTL, and atomic
//! increment-with-TTL. Any store satisfying [`SharedStore`] is acceptable;
//! the workspace ships two:
//!
//! - [`MemoryStore`] - process-local, used as the rate limiter's fallback
//!   and in tests
//! - [`RedisStore`] - cross-process, wired up when a connection endpoint is
//!   configured at startup
//!
//! The store is deliberately optional infrastructure. Components hold an
//! `Option<Arc<dyn SharedStore>>` decided once at construction; absence
//! degrades behavior (local-only caching, local-only counting) but is never
//! an error.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors from the shared store.
///
/// Callers treat every variant as a degradation signal, not a failure:
/// a store error downgrades service quality (reduced cache hit rate,
/// local-only rate limiting) and is never surfaced to end callers.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not reach the store.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// A store command failed or timed out.
    #[error("store operation failed: {0}")]
    Operation(String),
}

/// Result of an atomic counter increment.
#[derive(Clone, Copy, Debug)]
pub struct WindowCount {
    /// Counter value after the increment, starting at 1 for a new window.
    pub count: u64,
    /// Instant at which the window resets and the counter is discarded.
    pub reset_at: DateTime<Utc>,
}

/// Minimal key-value protocol shared by the cache tier and the rate limiter.
///
/// Values are opaque strings; callers own serialization. Implementations
/// must expire entries at their TTL and must make `incr_with_ttl` atomic
/// under concurrent callers hitting the same key (no lost updates).
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Fetch a value, or `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically increment a windowed counter.
    ///
    /// The first increment of a key opens a window of `window` length;
    /// subsequent increments within the window bump the same counter.
    /// Once the window elapses the counter is discarded and the next
    /// increment starts a fresh one at 1.
    async fn incr_with_ttl(&self, key: &str, window: Duration)
        -> Result<WindowCount, StoreError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}
