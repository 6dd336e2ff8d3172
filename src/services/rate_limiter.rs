//! Sliding-window request limiter
//!
//! Each key keeps the timestamps of its recent requests. A request is
//! allowed while fewer than `max_requests` fall inside the window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-key request limiter, shared across handlers
pub struct RateLimiter<K = i64> {
    requests: Arc<RwLock<HashMap<K, Vec<DateTime<Utc>>>>>,
    max_requests: usize,
    window: Duration,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// `max_requests` per minute
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::minutes(1))
    }

    /// Record a request for `key` and report whether it is within the limit.
    ///
    /// Rejected requests are not recorded.
    pub async fn check(&self, key: &K) -> bool {
        self.check_at(key, Utc::now()).await
    }

    async fn check_at(&self, key: &K, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let mut requests = self.requests.write().await;

        let times = requests.entry(key.clone()).or_default();
        times.retain(|time| *time > cutoff);

        if times.len() >= self.max_requests {
            return false;
        }
        times.push(now);
        true
    }

    /// Requests still available to `key` in the current window
    pub async fn remaining(&self, key: &K) -> usize {
        let cutoff = Utc::now() - self.window;
        let requests = self.requests.read().await;
        let used = requests
            .get(key)
            .map(|times| times.iter().filter(|t| **t > cutoff).count())
            .unwrap_or(0);
        self.max_requests.saturating_sub(used)
    }

    pub async fn reset(&self, key: &K) {
        self.requests.write().await.remove(key);
    }

    /// Drop expired timestamps and empty keys; run periodically
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut requests = self.requests.write().await;
        requests.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }

    pub async fn tracked_keys(&self) -> usize {
        self.requests.read().await.len()
    }
}
