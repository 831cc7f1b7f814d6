//! Per-query result cache with TTL expiry and LRU eviction
//!
//! Time is passed in explicitly so the owning service decides what "now" is.

use crate::types::{CacheFile, CacheValue, DiskEntry, CACHE_FILE_VERSION};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

/// An in-memory cache entry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: CacheValue,
    pub expires_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct ResultCache {
    entries: HashMap<String, CacheEntry>,
    ttl: TimeDelta,
    max_entries: usize,
    persist_debounce: TimeDelta,
    last_persist: Option<DateTime<Utc>>,
}

impl ResultCache {
    pub fn new(ttl: TimeDelta, max_entries: usize, persist_debounce: TimeDelta) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries,
            persist_debounce,
            last_persist: None,
        }
    }

    /// Look up a live entry and mark it as recently used.
    ///
    /// An expired entry is removed on the way out.
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<&CacheValue> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            debug!(key = %key, "Cache entry expired");
            self.entries.remove(key);
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.last_access = now;
        Some(&entry.value)
    }

    /// Store a value with a fresh expiry, replacing any previous entry
    pub fn insert(&mut self, key: impl Into<String>, value: CacheValue, now: DateTime<Utc>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: now
                    .checked_add_signed(self.ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
                last_access: now,
            },
        );
        self.evict_lru();
    }

    /// Drop expired entries, then evict least recently used ones over the cap.
    ///
    /// Returns the number of entries removed.
    pub fn trim(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.evict_lru();
        before - self.entries.len()
    }

    fn evict_lru(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }

        let mut by_access: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.last_access, key.clone()))
            .collect();
        by_access.sort();

        let to_drop = self.entries.len() - self.max_entries;
        for (_, key) in by_access.into_iter().take(to_drop) {
            debug!(key = %key, "Evicted least recently used cache entry");
            self.entries.remove(&key);
        }
    }

    /// Whether a write to disk should happen now
    pub fn persist_due(&self, now: DateTime<Utc>, force: bool) -> bool {
        if force {
            return true;
        }
        match self.last_persist {
            None => true,
            Some(last) => now - last >= self.persist_debounce,
        }
    }

    pub fn mark_persisted(&mut self, now: DateTime<Utc>) {
        self.last_persist = Some(now);
    }

    /// Trim and snapshot the cache into its on-disk shape
    pub fn to_file(&mut self, now: DateTime<Utc>) -> CacheFile {
        self.trim(now);

        let mut entries = std::collections::BTreeMap::new();
        for (key, entry) in &self.entries {
            match serde_json::to_value(&entry.value) {
                Ok(value) => {
                    entries.insert(
                        key.clone(),
                        DiskEntry {
                            expires_at: entry.expires_at,
                            last_access: Some(entry.last_access),
                            value,
                        },
                    );
                }
                Err(e) => warn!(key = %key, error = %e, "Skipping unserializable cache entry"),
            }
        }

        CacheFile {
            version: CACHE_FILE_VERSION,
            ttl_seconds: self.ttl.num_seconds().max(0) as u64,
            saved_at: now,
            entries,
        }
    }

    /// Replace the contents with the live entries of a loaded file
    pub fn load_file(&mut self, file: CacheFile, now: DateTime<Utc>) {
        self.entries.clear();

        for (key, disk) in file.entries {
            if disk.expires_at <= now {
                continue;
            }
            match serde_json::from_value::<CacheValue>(disk.value) {
                Ok(value) => {
                    self.entries.insert(
                        key,
                        CacheEntry {
                            value,
                            expires_at: disk.expires_at,
                            last_access: disk.last_access.unwrap_or(now),
                        },
                    );
                }
                Err(e) => debug!(key = %key, error = %e, "Dropping unreadable cache entry"),
            }
        }

        self.trim(now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}
