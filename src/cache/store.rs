//! Cache Store Module
//!
//! Synchronous map from cache key to memoized dispatch. Expiration is lazy:
//! an expired entry stays in the map until an access names its key or the
//! cache is cleared.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::cache::{CacheEntry, CacheKey, CacheStats, EntryView, ResultHandle};

// == Cache Store ==
/// Key to entry storage with expiration checks and removal bookkeeping.
#[derive(Debug, Default)]
pub struct CacheStore {
    /// Memoized dispatches
    entries: HashMap<CacheKey, CacheEntry>,
    /// Performance statistics
    stats: CacheStats,
    /// Id handed to the next inserted entry
    next_id: u64,
}

impl CacheStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Lookup ==
    /// Returns the entry stored under `key`, live or not.
    pub fn lookup(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Put ==
    /// Stores a handle under `key`, replacing any previous entry.
    ///
    /// The entry expires `timeout_ms` from now, or never when 0. Returns the
    /// id of the new entry.
    pub fn put(&mut self, key: CacheKey, handle: ResultHandle, timeout_ms: u64) -> u64 {
        self.next_id += 1;
        let id = self.next_id;

        self.entries
            .insert(key, CacheEntry::new(handle, id, timeout_ms));
        self.stats.set_total_entries(self.entries.len());

        id
    }

    // == Live Handle ==
    /// Returns the handle under `key` if its entry is live.
    ///
    /// An expired entry found here is removed.
    pub fn live_handle(&mut self, key: &CacheKey) -> Option<ResultHandle> {
        if self.contains_live(key) {
            self.entries.get(key).map(|entry| entry.handle.clone())
        } else {
            None
        }
    }

    // == Contains Live ==
    /// True iff a live entry exists under `key`.
    ///
    /// An expired entry found here is removed.
    pub fn contains_live(&mut self, key: &CacheKey) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                self.entries.remove(key);
                self.stats.record_expiration();
                self.stats.set_total_entries(self.entries.len());
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    // == Delete ==
    /// Removes the entry under `key`. Returns true if one existed.
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    // == Evict Failed ==
    /// Removes the entry under `key` only if it is still entry `id`.
    ///
    /// A failing dispatch must not take down a newer entry installed for the
    /// same key after a delete or clear.
    pub fn evict_failed(&mut self, key: &CacheKey, id: u64) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.id == id => {
                self.entries.remove(key);
                self.stats.record_failure();
                self.stats.set_total_entries(self.entries.len());
                true
            }
            _ => false,
        }
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&mut self) -> bool {
        self.entries.clear();
        self.stats.set_total_entries(0);
        true
    }

    // == Clear Action ==
    /// Removes every entry whose key names `action`. Returns the count removed.
    pub fn clear_action(&mut self, action: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.action_part() != action);
        self.stats.set_total_entries(self.entries.len());
        before - self.entries.len()
    }

    // == Snapshot ==
    /// Returns an owned read-only view of all entries, expired ones included.
    pub fn snapshot(&self) -> CacheState {
        CacheState {
            entries: self
                .entries
                .iter()
                .map(|(key, entry)| (key.to_string(), entry.view()))
                .collect(),
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn record_hit(&mut self) {
        self.stats.record_hit();
    }

    pub fn record_miss(&mut self) {
        self.stats.record_miss();
    }

    pub fn record_bypass(&mut self) {
        self.stats.record_bypass();
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Cache State ==
/// Point-in-time copy of the cache contents, keyed by cache key.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CacheState {
    entries: BTreeMap<String, EntryView>,
}

impl CacheState {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&EntryView> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
