//! In-process answer cache with read-through expiry

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::Result;
use crate::providers::AnswerCache;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    cached_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub max_entries: usize,
}

/// Bounded TTL cache keyed by question hash
pub struct MemoryAnswerCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl MemoryAnswerCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Look up a key, dropping it if its TTL has passed
    pub fn lookup(&self, key: &str) -> Option<String> {
        let now = Utc::now();
        let mut entries = self.entries.write();

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                tracing::debug!("Cache miss (TTL expired): {}", short(key));
                entries.remove(key);
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                tracing::debug!("Cache hit: {}", short(key));
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value; a zero TTL never expires
    pub fn insert(&self, key: &str, value: String, ttl: Duration) {
        let now = Utc::now();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            ChronoDuration::from_std(ttl).ok().map(|d| now + d)
        };

        let mut entries = self.entries.write();
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            entries.retain(|_, e| !e.is_expired(now));
            if entries.len() >= self.max_entries {
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.cached_at)
                    .map(|(k, _)| k.clone())
                {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                cached_at: now,
                expires_at,
            },
        );
        tracing::debug!("Cached answer: {}", short(key));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            max_entries: self.max_entries,
        }
    }
}

fn short(key: &str) -> &str {
    key.get(..14).unwrap_or(key)
}

#[async_trait]
impl AnswerCache for MemoryAnswerCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.insert(key, value.to_string(), ttl);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let cache = MemoryAnswerCache::new(10);
        cache.insert("q:a", "\"answer\"".into(), Duration::from_secs(60));
        assert_eq!(cache.lookup("q:a").as_deref(), Some("\"answer\""));
        assert!(cache.lookup("q:b").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let cache = MemoryAnswerCache::new(10);
        cache.insert("q:a", "x".into(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.lookup("q:a").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let cache = MemoryAnswerCache::new(10);
        cache.insert("q:a", "x".into(), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.lookup("q:a").is_some());
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let cache = MemoryAnswerCache::new(2);
        cache.insert("q:1", "1".into(), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("q:2", "2".into(), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("q:3", "3".into(), Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("q:1").is_none());
        assert!(cache.lookup("q:3").is_some());
    }

    #[tokio::test]
    async fn test_trait_surface() {
        let cache = MemoryAnswerCache::new(4);
        AnswerCache::set(&cache, "q:k", "v", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(AnswerCache::get(&cache, "q:k").await.unwrap().as_deref(), Some("v"));
    }
}
