//! One-time codes and tokens tied to an email address

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Six digit code mailed after registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailVerification {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub code: String,
    pub is_used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl EmailVerification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Single-use token for the forgotten password flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordReset {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub token: String,
    pub is_used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PasswordReset {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
