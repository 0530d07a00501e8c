//! In-memory implementation of the shared store protocol.
//!
//! Used as the rate limiter's fallback when the shared store is absent or
//! failing, and as the store of choice in tests. Entries are expired lazily
//! on access; an explicit [`MemoryStore::purge_expired`] sweep is available
//! for long-lived instances.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;

use crate::{SharedStore, StoreError, WindowCount};

#[derive(Clone, Debug)]
struct ValueEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug)]
struct CounterEntry {
    count: u64,
    reset_at: DateTime<Utc>,
}

/// Process-local shared store.
///
/// Values and counters live in separate maps because their lifecycles
/// differ: values are replaced wholesale, counters are incremented in place
/// and discarded at window reset.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, ValueEntry>>,
    counters: Mutex<HashMap<String, CounterEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the value map, recovering from poison.
    ///
    /// Worst case after recovery is a stale or missing cache entry, which
    /// callers already tolerate.
    fn lock_values(&self) -> MutexGuard<'_, HashMap<String, ValueEntry>> {
        self.values.lock().unwrap_or_else(|poisoned| {
            warn!("memory store value map mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_counters(&self) -> MutexGuard<'_, HashMap<String, CounterEntry>> {
        self.counters.lock().unwrap_or_else(|poisoned| {
            warn!("memory store counter map mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Drop every expired value and counter.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.lock_values().retain(|_, e| e.expires_at > now);
        self.lock_counters().retain(|_, c| c.reset_at > now);
    }

    /// Number of live (unexpired) values, for diagnostics.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.lock_values()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut values = self.lock_values();

        match values.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| StoreError::Operation(format!("ttl out of range: {}", e)))?;

        self.lock_values().insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn incr_with_ttl(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, StoreError> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(window)
            .map_err(|e| StoreError::Operation(format!("window out of range: {}", e)))?;

        let mut counters = self.lock_counters();
        let entry = counters
            .entry(key.to_string())
            .and_modify(|c| {
                if c.reset_at <= now {
                    // Window elapsed: the counter is conceptually a new record.
                    c.count = 1;
                    c.reset_at = now + window;
                } else {
                    c.count += 1;
                }
            })
            .or_insert(CounterEntry {
                count: 1,
                reset_at: now + window,
            });

        Ok(WindowCount {
            count: entry.count,
            reset_at: entry.reset_at,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
