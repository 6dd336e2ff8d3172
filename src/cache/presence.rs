//! Online presence for chat users
//!
//! A user is online while they hold a chat WebSocket. The flag is refreshed
//! on every inbound frame and expires on its own if a socket dies silently.

use super::{Cache, CacheLayer};
use anyhow::Result;
use std::time::Duration;

pub const ONLINE_TTL: Duration = Duration::from_secs(300);

fn online_key(user_id: i64) -> String {
    format!("online:{}", user_id)
}

pub async fn set_user_online(cache: &Cache, user_id: i64) -> Result<()> {
    cache.set(&online_key(user_id), &true, ONLINE_TTL).await
}

pub async fn set_user_offline(cache: &Cache, user_id: i64) -> Result<()> {
    cache.delete(&online_key(user_id)).await
}

pub async fn is_user_online(cache: &Cache, user_id: i64) -> Result<bool> {
    Ok(cache.get::<bool>(&online_key(user_id)).await?.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_online_round_trip() {
        let cache = Cache::memory();
        assert!(!is_user_online(&cache, 7).await.unwrap());

        set_user_online(&cache, 7).await.unwrap();
        assert!(is_user_online(&cache, 7).await.unwrap());
        assert!(!is_user_online(&cache, 8).await.unwrap());

        set_user_offline(&cache, 7).await.unwrap();
        assert!(!is_user_online(&cache, 7).await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_for_unknown_user_is_noop() {
        let cache = Cache::memory();
        set_user_offline(&cache, 42).await.unwrap();
        assert!(!is_user_online(&cache, 42).await.unwrap());
    }
}
