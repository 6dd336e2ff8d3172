//! Photo model and listing filters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded photo.
///
/// `owner_username` is not a column of `photos`; repositories fill it from
/// the owner join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Public upload path, e.g. `uploads/photos/<uuid>.jpg`
    pub file_path: String,
    /// Name of the file as uploaded by the client
    pub file_name: String,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub owner_id: i64,
    pub owner_username: String,
    pub views_count: i64,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Everything needed to insert a photo row
#[derive(Debug, Clone)]
pub struct CreatePhotoInput {
    pub title: String,
    pub description: Option<String>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub owner_id: i64,
    pub category_ids: Vec<i64>,
}

/// Listing filters; all conditions are combined with AND
#[derive(Debug, Clone)]
pub struct PhotoFilter {
    /// Photos in any of these categories
    pub category_ids: Vec<i64>,
    pub owner_id: Option<i64>,
    /// Case-insensitive match on title or description
    pub search: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

impl Default for PhotoFilter {
    fn default() -> Self {
        Self {
            category_ids: Vec::new(),
            owner_id: None,
            search: None,
            skip: 0,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoLike {
    pub id: i64,
    pub photo_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}
