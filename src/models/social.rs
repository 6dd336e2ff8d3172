//! Follow and block relationships

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: i64,
    pub follower_id: i64,
    pub followed_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: i64,
    pub blocker_id: i64,
    pub blocked_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Counters shown on a public profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub followers_count: i64,
    pub following_count: i64,
    pub photos_count: i64,
}
