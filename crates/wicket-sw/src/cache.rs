//! Versioned cache buckets and the cache port.
//!
//! ```text
//! CacheStorage (caches)
//!     └── Cache (one per version name)
//!             └── CacheKey (method + URL) → CacheEntry
//! ```

use crate::error::{ServiceWorkerError, SwResult};
use crate::http::{CacheKey, Response, ResponseType};
use async_trait::async_trait;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Response tainting.
    pub response_type: ResponseType,

    /// Whether the stored response followed a redirect.
    pub redirected: bool,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Store a copy of a response under a key.
    pub fn from_response(key: &CacheKey, response: &Response) -> Self {
        Self {
            url: key.url.clone(),
            method: key.method.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            response_type: response.response_type,
            redirected: response.redirected,
            cached_at: now_millis(),
        }
    }

    /// Key this entry is stored under.
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.method, &self.url)
    }
}

/// A cache instance.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries.
    entries: HashMap<CacheKey, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Add entry, replacing any previous one for the same key.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key(), entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Get all keys.
    pub fn keys(&self) -> Vec<&CacheKey> {
        self.entries.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache storage (caches global).
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Get all cache names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Access to named cache buckets.
#[async_trait]
pub trait CachePort: Send + Sync {
    /// Names of every bucket.
    async fn keys(&self) -> SwResult<Vec<String>>;

    /// Whether a bucket exists.
    async fn has(&self, cache: &str) -> SwResult<bool>;

    /// Delete a bucket. Returns false if it did not exist.
    async fn delete(&self, cache: &str) -> SwResult<bool>;

    /// Look up a request in one bucket.
    async fn match_request(&self, cache: &str, key: &CacheKey) -> SwResult<Option<CacheEntry>>;

    /// Store one entry, creating the bucket if needed.
    async fn put(&self, cache: &str, entry: CacheEntry) -> SwResult<()>;

    /// Store a batch of entries as one write.
    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> SwResult<()>;
}

/// In-process cache storage shared behind a lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    inner: Arc<RwLock<CacheStorage>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot a bucket.
    pub async fn snapshot(&self, cache: &str) -> Option<Cache> {
        self.inner.read().await.get(cache).cloned()
    }
}

#[async_trait]
impl CachePort for MemoryCacheStorage {
    async fn keys(&self) -> SwResult<Vec<String>> {
        Ok(self.inner.read().await.keys())
    }

    async fn has(&self, cache: &str) -> SwResult<bool> {
        Ok(self.inner.read().await.has(cache))
    }

    async fn delete(&self, cache: &str) -> SwResult<bool> {
        let removed = self.inner.write().await.delete(cache);
        debug!(cache, removed, "Deleted cache");
        Ok(removed)
    }

    async fn match_request(&self, cache: &str, key: &CacheKey) -> SwResult<Option<CacheEntry>> {
        let storage = self.inner.read().await;
        let entry = storage
            .get(cache)
            .and_then(|c| c.match_request(key))
            .cloned();
        trace!(cache, %key, hit = entry.is_some(), "Cache lookup");
        Ok(entry)
    }

    async fn put(&self, cache: &str, entry: CacheEntry) -> SwResult<()> {
        if entry.method != "GET" {
            return Err(ServiceWorkerError::Cache(format!(
                "cannot store {} request for {}",
                entry.method, entry.url
            )));
        }
        self.inner.write().await.open(cache).put(entry);
        Ok(())
    }

    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> SwResult<()> {
        if let Some(bad) = entries.iter().find(|e| e.method != "GET") {
            return Err(ServiceWorkerError::Cache(format!(
                "cannot store {} request for {}",
                bad.method, bad.url
            )));
        }
        let mut storage = self.inner.write().await;
        let bucket = storage.open(cache);
        let count = entries.len();
        for entry in entries {
            bucket.put(entry);
        }
        debug!(cache, count, "Stored cache batch");
        Ok(())
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &str) -> CacheEntry {
        CacheEntry::from_response(&CacheKey::get(url), &Response::new(200, body))
    }

    #[test]
    fn test_cache() {
        let mut cache = Cache::new("v1");

        cache.put(entry("https://example.com/style.css", "body{}"));

        assert!(cache
            .match_request(&CacheKey::get("https://example.com/style.css"))
            .is_some());
        assert!(cache
            .match_request(&CacheKey::get("https://example.com/other.css"))
            .is_none());
    }

    #[test]
    fn test_cache_put_replaces() {
        let mut cache = Cache::new("v1");
        cache.put(entry("https://example.com/a.js", "old"));
        cache.put(entry("https://example.com/a.js", "new"));

        assert_eq!(cache.len(), 1);
        let stored = cache
            .match_request(&CacheKey::get("https://example.com/a.js"))
            .unwrap();
        assert_eq!(stored.body, b"new");
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("v1");
        let key = CacheKey::get("https://example.com/style.css");

        cache.put(entry(&key.url, ""));
        assert!(cache.delete(&key));
        assert!(cache.match_request(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();

        assert!(!storage.has("v1"));

        storage.open("v1");
        assert!(storage.has("v1"));

        assert!(storage.delete("v1"));
        assert!(!storage.has("v1"));
    }

    #[test]
    fn test_cache_storage_keys_sorted() {
        let mut storage = CacheStorage::new();
        storage.open("v2");
        storage.open("v1");
        assert_eq!(storage.keys(), vec!["v1".to_string(), "v2".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_storage_put_and_match() {
        let storage = MemoryCacheStorage::new();
        storage
            .put("v1", entry("https://example.com/a.js", "a"))
            .await
            .unwrap();

        let hit = storage
            .match_request("v1", &CacheKey::get("https://example.com/a.js"))
            .await
            .unwrap();
        assert_eq!(hit.map(|e| e.body), Some(b"a".to_vec()));

        let other_bucket = storage
            .match_request("v2", &CacheKey::get("https://example.com/a.js"))
            .await
            .unwrap();
        assert!(other_bucket.is_none());
    }

    #[tokio::test]
    async fn test_memory_storage_rejects_non_get() {
        let storage = MemoryCacheStorage::new();
        let key = CacheKey::new("POST", "https://example.com/api/vote");
        let result = storage
            .put("v1", CacheEntry::from_response(&key, &Response::new(200, "")))
            .await;

        assert!(matches!(result, Err(ServiceWorkerError::Cache(_))));
        assert!(!storage.has("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_storage_put_all_is_one_write() {
        let storage = MemoryCacheStorage::new();
        storage
            .put_all(
                "v1",
                vec![entry("https://example.com/", ""), entry("https://example.com/app.js", "")],
            )
            .await
            .unwrap();

        assert_eq!(storage.snapshot("v1").await.map(|c| c.len()), Some(2));
        assert_eq!(storage.keys().await.unwrap(), vec!["v1".to_string()]);
    }
}
