//! Redis cache
//!
//! Shared cache for deployments running more than one instance, so chat
//! presence is visible to every node. Entries expire through SETEX and
//! pattern deletes walk the keyspace with SCAN rather than KEYS.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Default TTL for cache entries (1 hour)
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Keys per SCAN round trip in delete_pattern
const SCAN_COUNT: usize = 100;

pub struct RedisCache {
    connection: MultiplexedConnection,
    /// Upper bound for any entry's TTL
    default_ttl: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to `redis_url`, e.g. `redis://localhost:6379`
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_ttl(redis_url, DEFAULT_TTL).await
    }

    pub async fn with_ttl(redis_url: &str, default_ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url)
            .context("Failed to create Redis client")?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            default_ttl,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Whole seconds for SETEX, never zero
    fn ttl_secs(&self, ttl: Duration) -> u64 {
        ttl.min(self.default_ttl).as_secs().max(1)
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();

        let result: Option<String> = conn
            .get(key)
            .await
            .context("Failed to get value from Redis")?;

        match result {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .context("Failed to deserialize cached value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();

        let json = serde_json::to_string(value)
            .context("Failed to serialize cache value")?;

        let _: () = conn.set_ex(key, json, self.ttl_secs(ttl))
            .await
            .context("Failed to set value in Redis")?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();

        let _: () = conn
            .del(key)
            .await
            .context("Failed to delete key from Redis")?;

        Ok(())
    }

    /// Redis speaks the same glob syntax, so the pattern is passed through
    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .context("Failed to scan keys in Redis")?;

            if !keys.is_empty() {
                let _: () = conn
                    .del(&keys)
                    .await
                    .context("Failed to delete keys from Redis")?;
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(())
    }

    /// FLUSHDB: drops every key in the selected database
    async fn clear(&self) -> Result<()> {
        let mut conn = self.connection.clone();

        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .context("Failed to flush Redis database")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    // Run with: cargo test --features redis-cache -- --ignored

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_set_and_get() {
        let cache = RedisCache::new(&get_redis_url()).await.unwrap();
        cache.delete("test:key1").await.unwrap();

        cache.set("test:key1", &"value1".to_string(), Duration::from_secs(60)).await.unwrap();

        let result: Option<String> = cache.get("test:key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));

        cache.delete("test:key1").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_delete_pattern() {
        let cache = RedisCache::new(&get_redis_url()).await.unwrap();

        cache.set("test:user_stats:1", &1i64, Duration::from_secs(60)).await.unwrap();
        cache.set("test:user_stats:2", &2i64, Duration::from_secs(60)).await.unwrap();
        cache.set("test:online:1", &true, Duration::from_secs(60)).await.unwrap();

        cache.delete_pattern("test:user_stats:*").await.unwrap();

        assert_eq!(cache.get::<i64>("test:user_stats:1").await.unwrap(), None);
        assert_eq!(cache.get::<i64>("test:user_stats:2").await.unwrap(), None);
        assert_eq!(cache.get::<bool>("test:online:1").await.unwrap(), Some(true));

        cache.delete("test:online:1").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_ttl_expiration() {
        let cache = RedisCache::new(&get_redis_url()).await.unwrap();

        cache.set("test:ttl_key", &"value".to_string(), Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let result: Option<String> = cache.get("test:ttl_key").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_invalid_url_is_error() {
        assert!(RedisCache::new("not a url").await.is_err());
    }
}
