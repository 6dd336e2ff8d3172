//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment on a photo, optionally replying to another comment.
///
/// Author fields come from the users join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub photo_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub author_profile_picture: Option<String>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A comment with its replies, oldest first at every level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentThread>,
}

#[derive(Debug, Clone)]
pub struct CreateCommentInput {
    pub content: String,
    pub photo_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
}
