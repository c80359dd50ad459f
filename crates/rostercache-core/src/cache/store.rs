use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::debug;

use super::{CacheEntry, QueryKey, Scope};

type EntrySlot = Option<Arc<CacheEntry>>;

/// Entries and subscribers belonging to one scope.
#[derive(Default)]
struct ScopeCache {
    entries: HashMap<QueryKey, Arc<CacheEntry>>,
    watchers: HashMap<QueryKey, watch::Sender<EntrySlot>>,
}

impl ScopeCache {
    fn notify(&self, key: &QueryKey, slot: EntrySlot) {
        if let Some(tx) = self.watchers.get(key) {
            tx.send_replace(slot);
        }
    }
}

/// In-memory roster cache, partitioned by scope.
///
/// Scopes are created on first write or subscription. Nothing is evicted; an
/// entry lives until it is replaced or the store is cleared.
#[derive(Default)]
pub struct CacheStore {
    scopes: HashMap<Scope, ScopeCache>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope: &Scope, key: &QueryKey) -> Option<Arc<CacheEntry>> {
        self.scopes
            .get(scope)
            .and_then(|s| s.entries.get(key))
            .cloned()
    }

    /// Replace the entry for `key` and notify its subscribers.
    pub fn put(&mut self, scope: &Scope, key: &QueryKey, entry: CacheEntry) -> Arc<CacheEntry> {
        let entry = Arc::new(entry);
        let cache = self.scopes.entry(scope.clone()).or_default();
        cache.entries.insert(key.clone(), Arc::clone(&entry));
        cache.notify(key, Some(Arc::clone(&entry)));
        debug!(scope = %scope, key = %key, records = entry.records().len(), "Cache entry stored");
        entry
    }

    pub fn is_stale(entry: &CacheEntry, now: DateTime<Utc>, threshold: Duration) -> bool {
        entry.is_stale(now, threshold)
    }

    /// Watch one `(scope, key)` pair. The receiver starts with the current
    /// entry, if any, and sees every later `put`.
    pub fn subscribe(&mut self, scope: &Scope, key: &QueryKey) -> watch::Receiver<EntrySlot> {
        let cache = self.scopes.entry(scope.clone()).or_default();
        let current = cache.entries.get(key).cloned();
        cache
            .watchers
            .entry(key.clone())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }

    /// Mark one entry expired. The data stays readable; the next read sees it
    /// as stale and revalidates.
    pub fn invalidate(&mut self, scope: &Scope, key: &QueryKey) -> bool {
        let Some(cache) = self.scopes.get_mut(scope) else {
            return false;
        };
        let Some(current) = cache.entries.get(key) else {
            return false;
        };
        let expired = Arc::new(current.expire());
        cache.entries.insert(key.clone(), Arc::clone(&expired));
        cache.notify(key, Some(expired));
        true
    }

    /// Mark every entry in a scope expired. Returns how many were affected.
    pub fn invalidate_scope(&mut self, scope: &Scope) -> usize {
        let Some(cache) = self.scopes.get_mut(scope) else {
            return 0;
        };
        let keys: Vec<QueryKey> = cache.entries.keys().cloned().collect();
        for key in &keys {
            if let Some(current) = cache.entries.get(key) {
                let expired = Arc::new(current.expire());
                cache.entries.insert(key.clone(), Arc::clone(&expired));
                cache.notify(key, Some(expired));
            }
        }
        debug!(scope = %scope, entries = keys.len(), "Scope invalidated");
        keys.len()
    }

    /// Drop every entry in every scope. Subscribers observe `None` and stay
    /// attached for whatever is written next.
    pub fn clear(&mut self) {
        for cache in self.scopes.values_mut() {
            cache.entries.clear();
            for tx in cache.watchers.values() {
                tx.send_replace(None);
            }
        }
    }

    /// Total number of entries across all scopes.
    pub fn len(&self) -> usize {
        self.scopes.values().map(|s| s.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scope_len(&self, scope: &Scope) -> usize {
        self.scopes.get(scope).map(|s| s.entries.len()).unwrap_or(0)
    }
}
