//! Shared API response types
//!
//! Handlers convert models into these so the JSON shape stays independent
//! of the storage structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Category, ChatMessage, CommentThread, Photo, User};
use crate::services::photo::PhotoDetails;
use crate::services::user::{PublicProfile, UserProfile};

// ============================================================================
// Users
// ============================================================================

/// The caller's own account
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub is_verified: bool,
    pub is_oauth: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            bio: user.bio,
            profile_picture: user.profile_picture,
            is_verified: user.is_verified,
            is_oauth: user.is_oauth,
            created_at: user.created_at,
        }
    }
}

/// Another user's profile with stats
#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfileResponse {
    pub id: i64,
    pub username: String,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub followers_count: i64,
    pub following_count: i64,
    pub photos_count: i64,
}

impl From<UserProfile> for UserProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.user.id,
            username: profile.user.username,
            bio: profile.user.bio,
            profile_picture: profile.user.profile_picture,
            created_at: profile.user.created_at,
            followers_count: profile.stats.followers_count,
            following_count: profile.stats.following_count,
            photos_count: profile.stats.photos_count,
        }
    }
}

/// Profile plus the viewer's relationship to it
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicProfileResponse {
    #[serde(flatten)]
    pub profile: UserProfileResponse,
    pub is_following: bool,
    pub is_blocked: bool,
}

impl From<PublicProfile> for PublicProfileResponse {
    fn from(p: PublicProfile) -> Self {
        Self {
            profile: UserProfile {
                user: p.user,
                stats: p.stats,
            }
            .into(),
            is_following: p.is_following,
            is_blocked: p.is_blocked,
        }
    }
}

// ============================================================================
// Photos
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

impl From<Category> for CategoryResponse {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
            slug: c.slug,
            description: c.description,
        }
    }
}

/// `{backend_url}/{file_path}`
pub fn file_url(backend_url: &str, file_path: &str) -> String {
    format!(
        "{}/{}",
        backend_url.trim_end_matches('/'),
        file_path.trim_start_matches('/')
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PhotoResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub file_path: String,
    pub file_name: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub owner_id: i64,
    pub owner_username: String,
    pub views_count: i64,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub categories: Vec<CategoryResponse>,
    pub is_liked: bool,
}

impl PhotoResponse {
    pub fn new(details: PhotoDetails, backend_url: &str) -> Self {
        let photo = details.photo;
        Self {
            id: photo.id,
            title: photo.title,
            description: photo.description,
            file_path: file_url(backend_url, &photo.file_path),
            file_name: photo.file_name,
            width: photo.width,
            height: photo.height,
            owner_id: photo.owner_id,
            owner_username: photo.owner_username,
            views_count: photo.views_count,
            likes_count: photo.likes_count,
            comments_count: photo.comments_count,
            created_at: photo.created_at,
            updated_at: photo.updated_at,
            categories: details.categories.into_iter().map(Into::into).collect(),
            is_liked: details.is_liked,
        }
    }
}

/// Compact listing entry
#[derive(Debug, Serialize, Deserialize)]
pub struct PhotoListItem {
    pub id: i64,
    pub title: String,
    pub file_path: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub owner_id: i64,
    pub owner_username: String,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
}

impl PhotoListItem {
    pub fn new(photo: Photo, backend_url: &str) -> Self {
        Self {
            file_path: file_url(backend_url, &photo.file_path),
            id: photo.id,
            title: photo.title,
            width: photo.width,
            height: photo.height,
            owner_id: photo.owner_id,
            owner_username: photo.owner_username,
            likes_count: photo.likes_count,
            comments_count: photo.comments_count,
            created_at: photo.created_at,
        }
    }
}

// ============================================================================
// Comments
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: i64,
    pub content: String,
    pub photo_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub author_profile_picture: Option<String>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub replies: Vec<CommentResponse>,
}

impl From<CommentThread> for CommentResponse {
    fn from(thread: CommentThread) -> Self {
        let c = thread.comment;
        Self {
            id: c.id,
            content: c.content,
            photo_id: c.photo_id,
            author_id: c.author_id,
            author_username: c.author_username,
            author_profile_picture: c.author_profile_picture,
            parent_id: c.parent_id,
            created_at: c.created_at,
            updated_at: c.updated_at,
            replies: thread.replies.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<crate::models::Comment> for CommentResponse {
    fn from(comment: crate::models::Comment) -> Self {
        CommentThread {
            comment,
            replies: Vec::new(),
        }
        .into()
    }
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub id: i64,
    pub content: String,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            content: m.content,
            sender_id: m.sender_id,
            receiver_id: m.receiver_id,
            is_read: m.is_read,
            created_at: m.created_at,
            read_at: m.read_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_joins_once() {
        assert_eq!(
            file_url("http://localhost:8000", "uploads/photos/a.jpg"),
            "http://localhost:8000/uploads/photos/a.jpg"
        );
        assert_eq!(
            file_url("http://localhost:8000/", "/uploads/photos/a.jpg"),
            "http://localhost:8000/uploads/photos/a.jpg"
        );
    }

    #[test]
    fn test_comment_response_nests_replies() {
        let comment = |id, parent_id| crate::models::Comment {
            id,
            content: "hi".into(),
            photo_id: 1,
            author_id: 1,
            author_username: "alice".into(),
            author_profile_picture: None,
            parent_id,
            created_at: Utc::now(),
            updated_at: None,
        };
        let thread = CommentThread {
            comment: comment(1, None),
            replies: vec![CommentThread {
                comment: comment(2, Some(1)),
                replies: vec![],
            }],
        };

        let json = serde_json::to_value(CommentResponse::from(thread)).unwrap();
        assert_eq!(json["replies"][0]["id"], 2);
        assert_eq!(json["replies"][0]["parent_id"], 1);
        assert_eq!(json["replies"][0]["replies"], serde_json::json!([]));
    }
}
