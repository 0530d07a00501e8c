//! Two-tier quote cache.
//!
//! Reads check the fast process-local tier first, then the optional
//! shared store; shared hits are backfilled into the local tier. Writes
//! populate the local tier synchronously (which decides the operation's
//! success) and the shared tier as a detached best-effort task. The
//! shared tier's complete absence degrades to local-only caching without
//! errors - only the hit rate across instances suffers.
//!
//! Cache keys carry a one-minute time bucket
//! (`quote:{kind}:{ID}:{bucket}`) so near-simultaneous requests for the
//! same symbol collapse onto the same entry.

mod local;

pub use local::{CacheEntry, LocalCache};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use finboard_shared_store::SharedStore;

use crate::models::{Quote, QuoteKind};

/// Default time-to-live for cached quotes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default bound on the local tier's entry count.
pub const DEFAULT_MAX_ENTRIES: usize = 500;

/// Build the cache key for a quote at a given instant.
///
/// The minute bucket is `timestamp_millis / 60_000`; the identifier is
/// uppercased so "aapl" and "AAPL" share an entry.
pub fn cache_key(kind: QuoteKind, id: &str, at: DateTime<Utc>) -> String {
    format!(
        "quote:{}:{}:{}",
        kind.as_str(),
        id.to_uppercase(),
        at.timestamp_millis() / 60_000
    )
}

/// Key prefix shared by every bucket generation of one quote.
fn key_prefix(kind: QuoteKind, id: &str) -> String {
    format!("quote:{}:{}:", kind.as_str(), id.to_uppercase())
}

/// Bucketed keys to probe in the shared tier, newest first.
///
/// The shared store evicts entries at their TTL, so only buckets young
/// enough to still be alive are worth probing.
fn shared_candidate_keys(
    kind: QuoteKind,
    id: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Vec<String> {
    let buckets_back = (ttl.as_secs() / 60).min(10);
    (0..=buckets_back as i64)
        .map(|back| cache_key(kind, id, now - chrono::Duration::minutes(back)))
        .collect()
}

/// Cache statistics reported by the health-status query.
#[derive(Clone, Debug, Serialize)]
pub struct CacheStats {
    pub local_entries: usize,
    pub local_capacity: usize,
    pub shared_configured: bool,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Two-tier cache: local always, shared when configured.
pub struct TieredCache {
    local: LocalCache,
    shared: Option<Arc<dyn SharedStore>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TieredCache {
    /// Local-only cache.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            local: LocalCache::new(max_entries),
            shared: None,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache backed by a shared store.
    pub fn with_shared(max_entries: usize, ttl: Duration, store: Arc<dyn SharedStore>) -> Self {
        Self {
            shared: Some(store),
            ..Self::new(max_entries, ttl)
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh read: local tier, then shared tier with local backfill.
    pub async fn get(&self, kind: QuoteKind, id: &str) -> Option<Quote> {
        let prefix = key_prefix(kind, id);

        if let Some(quote) = self.local.get_fresh(&prefix) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(quote);
        }

        if let Some(store) = &self.shared {
            let now = Utc::now();
            for key in shared_candidate_keys(kind, id, now, self.ttl) {
                match store.get(&key).await {
                    Ok(Some(payload)) => match serde_json::from_str::<CacheEntry>(&payload) {
                        Ok(entry) if entry.is_fresh(now) => {
                            debug!("shared cache hit for {}, backfilling local tier", key);
                            self.local.insert(key, entry.clone());
                            self.hits.fetch_add(1, Ordering::Relaxed);
                            return Some(entry.quote);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("discarding undecodable shared cache entry {}: {}", key, e);
                        }
                    },
                    Ok(None) => {}
                    Err(e) => {
                        // Shared tier trouble is a degradation, not an error;
                        // stop probing and fall through to a miss.
                        warn!("shared cache read failed for {}: {}", key, e);
                        break;
                    }
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write a quote into both tiers.
    ///
    /// The local write is synchronous and sufficient for the operation to
    /// succeed; the shared write is detached and best-effort.
    pub async fn set(&self, kind: QuoteKind, id: &str, quote: &Quote) {
        self.set_at(kind, id, quote, Utc::now());
    }

    fn set_at(&self, kind: QuoteKind, id: &str, quote: &Quote, now: DateTime<Utc>) {
        let key = cache_key(kind, id, now);
        let expires_at = now
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let entry = CacheEntry::new(quote.clone(), expires_at);

        if let Some(store) = &self.shared {
            match serde_json::to_string(&entry) {
                Ok(payload) => {
                    let store = Arc::clone(store);
                    let shared_key = key.clone();
                    let ttl = self.ttl;
                    tokio::spawn(async move {
                        if let Err(e) = store.set_with_ttl(&shared_key, &payload, ttl).await {
                            warn!("shared cache write failed for {}: {}", shared_key, e);
                        }
                    });
                }
                Err(e) => warn!("failed to serialize cache entry for {}: {}", key, e),
            }
        }

        self.local.insert(key, entry);
    }

    /// Stale read: newest local entry for the quote, expired or not.
    ///
    /// Used only by the aggregation service's last-resort fallback. The
    /// shared tier evicts at TTL and cannot participate.
    pub fn get_stale(&self, kind: QuoteKind, id: &str) -> Option<Quote> {
        self.local.get_stale(&key_prefix(kind, id))
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            local_entries: self.local.len(),
            local_capacity: self.local.capacity(),
            shared_configured: self.shared.is_some(),
            hits,
            misses,
            hit_rate,
        }
    }

    #[cfg(test)]
    fn insert_local(&self, key: String, entry: CacheEntry) {
        self.local.insert(key, entry);
    }
}
