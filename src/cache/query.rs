//! In-memory query cache with stale-time and garbage-collection policy
//!
//! Entries are keyed by resolved request key (`/api/risks?status=open`).
//! Data younger than the stale time is served without a refetch; entries
//! nobody has read for the GC time are dropped. Invalidation marks entries
//! so the next read goes back to the network. When persistence is enabled
//! every write goes through to [`CacheStorage`] and memory misses hydrate
//! from it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;

use super::key::{key_matches_prefix, key_path, storage_key};
use super::storage::CacheStorage;
use crate::config::CacheSettings;

/// Freshness and retention policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    /// Data younger than this is served without refetching
    pub stale_time: Duration,
    /// Entries unused for this long are dropped
    pub gc_time: Duration,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(60),
            gc_time: Duration::from_secs(10 * 60),
        }
    }
}

impl From<&CacheSettings> for QueryPolicy {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            stale_time: settings.stale_time(),
            gc_time: settings.gc_time(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    data: Value,
    updated_at: Instant,
    last_accessed: Instant,
    invalidated: bool,
}

/// Snapshot of a cached query returned to readers
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuery {
    pub data: Value,
    pub age: Duration,
    /// Older than the stale time
    pub is_stale: bool,
    /// Explicitly invalidated since it was stored
    pub is_invalidated: bool,
}

impl CachedQuery {
    /// Whether the data may be served without going back to the network
    pub fn is_fresh(&self) -> bool {
        !self.is_stale && !self.is_invalidated
    }
}

/// A whole cache entry taken before an optimistic write, so a rollback
/// puts back its age and invalidation mark along with the data.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    entry: Entry,
}

impl QuerySnapshot {
    pub fn data(&self) -> &Value {
        &self.entry.data
    }
}

struct Persistence {
    storage: Mutex<CacheStorage>,
    /// API host the entries belong to
    scope: String,
}

/// Query cache shared by the runtime and the optimistic-update helpers.
pub struct QueryCache {
    policy: QueryPolicy,
    entries: Mutex<HashMap<String, Entry>>,
    persistence: Option<Persistence>,
}

impl QueryCache {
    /// Memory-only cache
    pub fn new(policy: QueryPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Cache that writes through to persistent storage for `scope`
    pub fn with_storage(policy: QueryPolicy, storage: CacheStorage, scope: impl Into<String>) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
            persistence: Some(Persistence {
                storage: Mutex::new(storage),
                scope: scope.into(),
            }),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    /// Look up a query, hydrating from storage on a memory miss.
    pub fn get(&self, key: &str) -> Option<CachedQuery> {
        self.collect_garbage();
        let now = Instant::now();

        {
            let mut entries = self.entries();
            if let Some(entry) = entries.get_mut(key) {
                entry.last_accessed = now;
                return Some(self.view(entry, now));
            }
        }

        let entry = self.hydrate(key, now)?;
        log::debug!("Query cache hydrated from disk: {}", key);
        let cached = self.view(&entry, now);
        self.entries().insert(key.to_string(), entry);
        Some(cached)
    }

    /// Cached data for `key`, regardless of freshness
    pub fn get_data(&self, key: &str) -> Option<Value> {
        self.get(key).map(|q| q.data)
    }

    /// Capture the entry for `key`, hydrating it first if needed
    pub fn snapshot(&self, key: &str) -> Option<QuerySnapshot> {
        self.get(key)?;
        let entry = self.entries().get(key)?.clone();
        Some(QuerySnapshot { entry })
    }

    /// Put a snapshot back in memory as it was taken. Storage is left
    /// alone since optimistic writes never reach it.
    pub fn restore(&self, key: &str, snapshot: QuerySnapshot) {
        let mut entry = snapshot.entry;
        entry.last_accessed = Instant::now();
        self.entries().insert(key.to_string(), entry);
    }

    /// Store fresh data for `key`
    pub fn set(&self, key: &str, data: Value) {
        let now = Instant::now();
        self.persist(key, &data);
        self.entries().insert(
            key.to_string(),
            Entry {
                data,
                updated_at: now,
                last_accessed: now,
                invalidated: false,
            },
        );
    }

    /// Store data for `key` in memory only
    pub fn set_transient(&self, key: &str, data: Value) {
        let now = Instant::now();
        self.entries().insert(
            key.to_string(),
            Entry {
                data,
                updated_at: now,
                last_accessed: now,
                invalidated: false,
            },
        );
    }

    /// Drop one entry
    pub fn remove(&self, key: &str) {
        self.entries().remove(key);
        if let Some(p) = &self.persistence {
            let storage = p.storage.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = storage.delete_by_key(&storage_key(&p.scope, key)) {
                log::warn!("Failed to remove persisted query {}: {}", key, e);
            }
        }
    }

    /// Invalidate `prefix` and every key below it. Returns the number of
    /// in-memory entries marked.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let marked = {
            let mut entries = self.entries();
            let mut marked = 0;
            for (key, entry) in entries.iter_mut() {
                if key_matches_prefix(key, prefix) {
                    entry.invalidated = true;
                    marked += 1;
                }
            }
            marked
        };
        log::debug!("Invalidated {} cached queries under {}", marked, prefix);

        if let Some(p) = &self.persistence {
            let storage = p.storage.lock().unwrap_or_else(PoisonError::into_inner);
            let result = if prefix.contains('?') {
                storage
                    .delete_by_key(&storage_key(&p.scope, prefix))
                    .map(usize::from)
            } else {
                storage.delete_by_prefix(&p.scope, key_path(prefix))
            };
            if let Err(e) = result {
                log::warn!("Failed to invalidate persisted queries under {}: {}", prefix, e);
            }
        }
        marked
    }

    /// Drop every entry, in memory and on disk
    pub fn clear(&self) {
        self.entries().clear();
        if let Some(p) = &self.persistence {
            let storage = p.storage.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = storage.clear_scope(&p.scope) {
                log::warn!("Failed to clear persisted queries: {}", e);
            }
        }
    }

    /// Number of entries held in memory
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries unused for longer than the GC time
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let gc_time = self.policy.gc_time;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.last_accessed) <= gc_time);
        before - entries.len()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn view(&self, entry: &Entry, now: Instant) -> CachedQuery {
        let age = now.duration_since(entry.updated_at);
        CachedQuery {
            data: entry.data.clone(),
            age,
            is_stale: age >= self.policy.stale_time,
            is_invalidated: entry.invalidated,
        }
    }

    fn persist(&self, key: &str, data: &Value) {
        let Some(p) = &self.persistence else {
            return;
        };
        let bytes = match serde_json::to_vec(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Failed to serialize query {}: {}", key, e);
                return;
            }
        };
        let storage = p.storage.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = storage.put(
            &storage_key(&p.scope, key),
            &bytes,
            &p.scope,
            key_path(key),
            self.policy.gc_time,
        ) {
            log::warn!("Failed to persist query {}: {}", key, e);
        }
    }

    fn hydrate(&self, key: &str, now: Instant) -> Option<Entry> {
        let p = self.persistence.as_ref()?;
        let storage = p.storage.lock().unwrap_or_else(PoisonError::into_inner);
        let skey = storage_key(&p.scope, key);

        let stored = match storage.get(&skey) {
            Ok(stored) => stored?,
            Err(e) => {
                log::warn!("Failed to read persisted query {}: {}", key, e);
                return None;
            }
        };
        let data: Value = serde_json::from_slice(&stored.data).ok()?;
        if let Err(e) = storage.touch(&skey, self.policy.gc_time) {
            log::debug!("Failed to extend persisted query {}: {}", key, e);
        }

        let age_secs = (Utc::now().timestamp() - stored.fetched_at).max(0) as u64;
        let updated_at = now
            .checked_sub(Duration::from_secs(age_secs))
            .unwrap_or(now);

        Some(Entry {
            data,
            updated_at,
            last_accessed: now,
            invalidated: false,
        })
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QueryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const SCOPE: &str = "http://localhost:5000/";

    #[tokio::test(start_paused = true)]
    async fn test_fresh_then_stale() {
        let cache = QueryCache::default();
        cache.set("/api/risks", json!([{"id": 1}]));

        let hit = cache.get("/api/risks").unwrap();
        assert!(hit.is_fresh());
        assert_eq!(hit.data, json!([{"id": 1}]));

        tokio::time::advance(Duration::from_secs(61)).await;
        let hit = cache.get("/api/risks").unwrap();
        assert!(hit.is_stale);
        assert!(!hit.is_fresh());
        assert_eq!(hit.age, Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unused_entries_are_collected() {
        let cache = QueryCache::default();
        cache.set("/api/audits", json!([]));

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert!(cache.get("/api/audits").is_some());

        // Reading refreshes last access, so 9 more minutes keeps it
        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert!(cache.get("/api/audits").is_some());

        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        assert!(cache.get("/api/audits").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = QueryCache::default();
        cache.set("/api/risks", json!([]));
        cache.set("/api/risks?status=open", json!([]));
        cache.set("/api/risks/3", json!({}));
        cache.set("/api/controls", json!([]));

        assert_eq!(cache.invalidate("/api/risks"), 3);
        assert!(cache.get("/api/risks").unwrap().is_invalidated);
        assert!(cache.get("/api/risks/3").unwrap().is_invalidated);
        assert!(cache.get("/api/controls").unwrap().is_fresh());
    }

    #[test]
    fn test_set_clears_invalidation() {
        let cache = QueryCache::default();
        cache.set("/api/risks", json!([]));
        cache.invalidate("/api/risks");
        cache.set("/api/risks", json!([{"id": 2}]));
        assert!(cache.get("/api/risks").unwrap().is_fresh());
    }

    #[test]
    fn test_clear_drops_every_entry() {
        let cache = QueryCache::default();
        cache.set("/api/regulations", json!(["SOX", "GDPR"]));
        cache.set("/api/frameworks", json!([]));

        cache.clear();
        assert!(cache.get_data("/api/regulations").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_keeps_age_and_invalidation() {
        let cache = QueryCache::default();
        cache.set("/api/risks", json!([{"id": 1}]));
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.invalidate("/api/risks");

        let snapshot = cache.snapshot("/api/risks").unwrap();
        assert_eq!(snapshot.data(), &json!([{"id": 1}]));
        cache.set_transient("/api/risks", json!([]));
        assert!(cache.get("/api/risks").unwrap().is_fresh());

        cache.restore("/api/risks", snapshot);
        let hit = cache.get("/api/risks").unwrap();
        assert!(hit.is_invalidated);
        assert_eq!(hit.age, Duration::from_secs(30));
        assert_eq!(hit.data, json!([{"id": 1}]));
    }

    #[test]
    fn test_transient_writes_are_not_persisted() {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open_at(dir.path()).unwrap();
        let cache = QueryCache::with_storage(QueryPolicy::default(), storage, SCOPE);
        cache.set_transient("/api/controls", json!([{"id": 1}]));
        assert!(cache.get("/api/controls").is_some());

        let reopened = QueryCache::with_storage(
            QueryPolicy::default(),
            CacheStorage::open_at(dir.path()).unwrap(),
            SCOPE,
        );
        assert!(reopened.get("/api/controls").is_none());
    }

    #[test]
    fn test_persisted_entries_survive_new_cache() {
        let dir = TempDir::new().unwrap();
        {
            let storage = CacheStorage::open_at(dir.path()).unwrap();
            let cache = QueryCache::with_storage(QueryPolicy::default(), storage, SCOPE);
            cache.set("/api/controls", json!([{"id": 9}]));
        }

        let storage = CacheStorage::open_at(dir.path()).unwrap();
        let cache = QueryCache::with_storage(QueryPolicy::default(), storage, SCOPE);
        let hit = cache.get("/api/controls").unwrap();
        assert_eq!(hit.data, json!([{"id": 9}]));
        assert!(!hit.is_invalidated);
    }

    #[test]
    fn test_invalidate_removes_persisted_entries() {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open_at(dir.path()).unwrap();
        let cache = QueryCache::with_storage(QueryPolicy::default(), storage, SCOPE);
        cache.set("/api/risks?status=open", json!([]));
        cache.invalidate("/api/risks");

        let reopened = QueryCache::with_storage(
            QueryPolicy::default(),
            CacheStorage::open_at(dir.path()).unwrap(),
            SCOPE,
        );
        assert!(reopened.get("/api/risks?status=open").is_none());
    }

    #[test]
    fn test_clear_removes_persisted_entries() {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open_at(dir.path()).unwrap();
        let cache = QueryCache::with_storage(QueryPolicy::default(), storage, SCOPE);
        cache.set("/api/audits", json!([]));
        cache.clear();

        let reopened = QueryCache::with_storage(
            QueryPolicy::default(),
            CacheStorage::open_at(dir.path()).unwrap(),
            SCOPE,
        );
        assert!(reopened.get("/api/audits").is_none());
    }
}
