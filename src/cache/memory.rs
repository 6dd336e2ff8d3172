//! In-memory cache using moka
//!
//! Every entry carries its own TTL through a moka `Expiry` policy, capped at
//! the cache's default TTL. Values are stored as JSON so one cache can hold
//! any serializable type.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default maximum cache capacity (number of entries)
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Default TTL for cache entries (1 hour)
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct CacheEntry {
    /// JSON-serialized value
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value)
            .context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data)
            .context("Failed to deserialize cache value")
    }
}

/// Expires each entry after the TTL it was written with
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    /// Upper bound for any entry's TTL
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    /// 10,000 entries, 1 hour TTL cap
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::with_capacity_and_ttl(max_capacity, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { cache, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Glob-style match: `*` is any run of characters, `?` exactly one
    ///
    /// - `user_stats:*` matches `user_stats:12`
    /// - `online:?` matches `online:7` but not `online:42`
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern_chars: Vec<char> = pattern.chars().collect();
        let key_chars: Vec<char> = key.chars().collect();
        Self::glob_match(&pattern_chars, &key_chars, 0, 0)
    }

    fn glob_match(pattern: &[char], key: &[char], pi: usize, ki: usize) -> bool {
        if pi == pattern.len() {
            return ki == key.len();
        }

        match pattern[pi] {
            '*' => {
                Self::glob_match(pattern, key, pi + 1, ki)
                    || (ki < key.len() && Self::glob_match(pattern, key, pi, ki + 1))
            }
            '?' => ki < key.len() && Self::glob_match(pattern, key, pi + 1, ki + 1),
            c => ki < key.len() && key[ki] == c && Self::glob_match(pattern, key, pi + 1, ki + 1),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => {
                let value = entry.deserialize()?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Overwrites any existing entry and restarts its TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl.min(self.default_ttl))?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    /// Walks every key, fine for the sizes this cache holds
    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let keys_to_delete: Vec<String> = self.cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys_to_delete {
            self.cache.invalidate(&key).await;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}
