//! Cache layer
//!
//! Two backends behind one interface:
//! - In-memory cache (moka), the default for a single instance
//! - Redis, behind the `redis-cache` feature, when several instances share state
//!
//! Chat presence and profile stats live here.
//!
//! ```rust,ignore
//! use photosocial::cache::{create_cache, CacheLayer};
//! use photosocial::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default()).await?;
//! cache.set("key", &"value", Duration::from_secs(60)).await?;
//! ```

pub mod memory;
pub mod presence;
#[cfg(feature = "redis-cache")]
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

/// Cache layer trait
///
/// The methods are generic, so this trait is not object safe. Use the
/// `Cache` enum for runtime selection of the backend.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Store a value that expires after `ttl`
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a glob pattern (`*` and `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub use memory::MemoryCache;
pub use presence::{is_user_online, set_user_offline, set_user_online, ONLINE_TTL};
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    #[cfg(feature = "redis-cache")]
    Redis(RedisCache),
}

impl Cache {
    /// Memory-backed cache with default settings, used by tests and tools
    pub fn memory() -> Self {
        Cache::Memory(MemoryCache::new())
    }
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete(key).await,
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete_pattern(pattern).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.clear().await,
        }
    }
}

/// Build the cache selected by configuration
///
/// # Errors
/// - Redis is selected but the `redis-cache` feature is off
/// - Redis is selected without a URL, or the connection fails
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    let ttl = Duration::from_secs(config.ttl_seconds);

    match config.driver {
        CacheDriver::Memory => {
            let cache = MemoryCache::with_capacity_and_ttl(10_000, ttl);
            Ok(Arc::new(Cache::Memory(cache)))
        }
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_ref()
                    .ok_or_else(|| anyhow::anyhow!(
                        "Redis URL is required when using Redis cache driver. \
                         Set 'redis_url' in cache configuration or use PHOTOSOCIAL_CACHE_REDIS_URL environment variable."
                    ))?;

                let cache = RedisCache::with_ttl(redis_url, ttl).await?;
                tracing::info!("Using Redis cache");
                Ok(Arc::new(Cache::Redis(cache)))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "Redis cache driver is configured but the 'redis-cache' feature is not enabled. \
                     Either enable the feature with `--features redis-cache` or use 'memory' cache driver."
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let config = CacheConfig::default();
        let cache = create_cache(&config).await.unwrap();

        cache.set("test_key", &"test_value".to_string(), Duration::from_secs(60)).await.unwrap();
        let result: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));
    }

    #[tokio::test]
    async fn test_create_memory_cache_with_custom_ttl() {
        let config = CacheConfig {
            driver: CacheDriver::Memory,
            redis_url: None,
            ttl_seconds: 1800,
        };
        let cache = create_cache(&config).await.unwrap();

        cache.set("key", &"value".to_string(), Duration::from_secs(60)).await.unwrap();
        let result: Option<String> = cache.get("key").await.unwrap();
        assert_eq!(result, Some("value".to_string()));
    }

    #[tokio::test]
    async fn test_enum_delete_pattern_dispatches() {
        let cache = Cache::memory();
        cache.set("user_stats:1", &1i64, Duration::from_secs(60)).await.unwrap();
        cache.set("user_stats:2", &2i64, Duration::from_secs(60)).await.unwrap();
        cache.set("online:1", &true, Duration::from_secs(60)).await.unwrap();

        cache.delete_pattern("user_stats:*").await.unwrap();

        assert_eq!(cache.get::<i64>("user_stats:1").await.unwrap(), None);
        assert_eq!(cache.get::<i64>("user_stats:2").await.unwrap(), None);
        assert_eq!(cache.get::<bool>("online:1").await.unwrap(), Some(true));
    }

    #[cfg(not(feature = "redis-cache"))]
    #[tokio::test]
    async fn test_create_redis_cache_without_feature() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: Some("redis://localhost:6379".to_string()),
            ttl_seconds: 3600,
        };

        let result = create_cache(&config).await;
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("redis-cache") && err.contains("feature"));
    }

    #[cfg(feature = "redis-cache")]
    #[tokio::test]
    async fn test_create_redis_cache_without_url() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: None,
            ttl_seconds: 3600,
        };

        let result = create_cache(&config).await;
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Redis URL"));
    }
}
