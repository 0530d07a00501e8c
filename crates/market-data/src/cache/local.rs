//! Process-local cache tier.
//!
//! A bounded map of [`CacheEntry`] values. Entries are kept past their
//! expiry (until evicted for capacity) so the aggregation service's
//! last-resort stale read has something to fall back on; freshness is
//! checked at read time, not by eviction.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::Quote;

/// A cached quote plus its absolute expiry instant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub quote: Quote,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(quote: Quote, expires_at: DateTime<Utc>) -> Self {
        Self { quote, expires_at }
    }

    /// Whether the entry may still be served as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Bounded in-process cache map.
pub struct LocalCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl LocalCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Lock the entry map, recovering from poison.
    ///
    /// Worst case after recovery is a stale or missing entry, which every
    /// caller already tolerates.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("local cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Insert an entry, evicting the entry closest to (or past) expiry
    /// when the map is full.
    pub fn insert(&self, key: String, entry: CacheEntry) {
        let mut entries = self.lock();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest_key) = oldest {
                entries.remove(&oldest_key);
            }
        }

        entries.insert(key, entry);
    }

    /// Newest fresh entry whose key starts with `prefix`.
    ///
    /// Keys carry a minute bucket, so a fresh entry for a symbol may live
    /// under an earlier bucket than the current one; the scan covers all
    /// generations still resident.
    pub fn get_fresh(&self, prefix: &str) -> Option<Quote> {
        let now = Utc::now();
        let entries = self.lock();

        entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.is_fresh(now))
            .max_by_key(|(_, e)| e.expires_at)
            .map(|(_, e)| e.quote.clone())
    }

    /// Newest entry whose key starts with `prefix`, expired or not.
    ///
    /// This is the explicit stale-read path used only when all providers
    /// have failed; it is deliberately not the same function as
    /// [`get_fresh`](Self::get_fresh).
    pub fn get_stale(&self, prefix: &str) -> Option<Quote> {
        let entries = self.lock();

        entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .max_by_key(|(_, e)| e.expires_at)
            .map(|(_, e)| e.quote.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexQuote, QuoteSource};
    use rust_decimal_macros::dec;

    fn entry(symbol: &str, expires_in_secs: i64) -> CacheEntry {
        CacheEntry::new(
            Quote::Index(IndexQuote {
                symbol: symbol.to_string(),
                value: dec!(2500.12),
                change: dec!(10.5),
                change_percent: dec!(0.42),
                source: QuoteSource::TwelveData,
                cached: false,
                timestamp: Utc::now(),
            }),
            Utc::now() + chrono::Duration::seconds(expires_in_secs),
        )
    }

    #[test]
    fn test_fresh_hit() {
        let cache = LocalCache::new(10);
        cache.insert("quote:index:KOSPI:100".to_string(), entry("KOSPI", 300));

        let quote = cache.get_fresh("quote:index:KOSPI:");
        assert_eq!(quote.unwrap().symbol(), "KOSPI");
    }

    #[test]
    fn test_expired_entry_not_fresh_but_stale() {
        let cache = LocalCache::new(10);
        cache.insert("quote:index:KOSPI:100".to_string(), entry("KOSPI", -10));

        assert!(cache.get_fresh("quote:index:KOSPI:").is_none());
        assert!(cache.get_stale("quote:index:KOSPI:").is_some());
    }

    #[test]
    fn test_fresh_read_spans_minute_buckets() {
        let cache = LocalCache::new(10);
        // Entry written under an earlier bucket, still within TTL.
        cache.insert("quote:index:KOSPI:99".to_string(), entry("KOSPI", 200));

        assert!(cache.get_fresh("quote:index:KOSPI:").is_some());
    }

    #[test]
    fn test_newest_generation_wins() {
        let cache = LocalCache::new(10);
        cache.insert("quote:index:KOSPI:99".to_string(), entry("old", 100));
        cache.insert("quote:index:KOSPI:100".to_string(), entry("new", 300));

        let quote = cache.get_fresh("quote:index:KOSPI:").unwrap();
        assert_eq!(quote.symbol(), "new");
    }

    #[test]
    fn test_eviction_at_capacity_removes_oldest() {
        let cache = LocalCache::new(2);
        cache.insert("a".to_string(), entry("a", 10));
        cache.insert("b".to_string(), entry("b", 100));
        cache.insert("c".to_string(), entry("c", 200));

        assert_eq!(cache.len(), 2);
        // "a" had the nearest expiry and must be the one evicted.
        assert!(cache.get_stale("a").is_none());
        assert!(cache.get_stale("b").is_some());
        assert!(cache.get_stale("c").is_some());
    }

    #[test]
    fn test_reinsert_existing_key_does_not_evict() {
        let cache = LocalCache::new(2);
        cache.insert("a".to_string(), entry("a", 10));
        cache.insert("b".to_string(), entry("b", 100));
        cache.insert("a".to_string(), entry("a", 300));

        assert_eq!(cache.len(), 2);
        assert!(cache.get_stale("b").is_some());
    }
}
