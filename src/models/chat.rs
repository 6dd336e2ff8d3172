//! Direct messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub content: String,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub is_read: bool,
    #[serde(skip_serializing)]
    pub is_deleted_by_sender: bool,
    #[serde(skip_serializing)]
    pub is_deleted_by_receiver: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Latest state of a one-to-one conversation, seen from one participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// The other participant
    pub user_id: i64,
    pub username: String,
    pub profile_picture: Option<String>,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: i64,
}
