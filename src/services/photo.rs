//! Photo service
//!
//! Uploads go through `ImageService` before a row is written; the stored
//! file is removed again if the insert fails, and when a photo is deleted.

use crate::cache::Cache;
use crate::db::repositories::{CategoryRepository, PhotoRepository};
use crate::models::{Category, CreatePhotoInput, Photo, PhotoFilter, User};
use crate::services::image::{ImageError, ImageKind, ImageService};
use crate::services::user::invalidate_stats;
use anyhow::Context;
use std::sync::Arc;

pub const TITLE_MAX_LEN: usize = 255;
pub const DESCRIPTION_MAX_LEN: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum PhotoServiceError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Photo not found")]
    NotFound,

    #[error("Not authorized to delete this photo")]
    NotAuthorized,

    #[error("Photo already liked")]
    AlreadyLiked,

    #[error("Photo not liked")]
    NotLiked,

    #[error("Photo file not found")]
    FileNotFound,

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Parse a comma separated id list such as `"1, 3,7"`. Blank items are skipped.
pub fn parse_id_list(raw: &str) -> Result<Vec<i64>, PhotoServiceError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = part.parse::<i64>().map_err(|_| {
            PhotoServiceError::ValidationError(format!("Invalid category id: {}", part))
        })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[derive(Debug, Clone)]
pub struct UploadPhotoInput {
    pub title: String,
    pub description: Option<String>,
    pub category_ids: Vec<i64>,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A photo with its categories and whether the viewer liked it
#[derive(Debug, Clone)]
pub struct PhotoDetails {
    pub photo: Photo,
    pub categories: Vec<Category>,
    pub is_liked: bool,
}

pub struct PhotoService {
    photos: Arc<dyn PhotoRepository>,
    categories: Arc<dyn CategoryRepository>,
    images: Arc<ImageService>,
    cache: Arc<Cache>,
}

impl PhotoService {
    pub fn new(
        photos: Arc<dyn PhotoRepository>,
        categories: Arc<dyn CategoryRepository>,
        images: Arc<ImageService>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            photos,
            categories,
            images,
            cache,
        }
    }

    pub async fn categories(&self) -> Result<Vec<Category>, PhotoServiceError> {
        Ok(self
            .categories
            .list()
            .await
            .context("Failed to list categories")?)
    }

    pub async fn upload(
        &self,
        owner: &User,
        input: UploadPhotoInput,
    ) -> Result<PhotoDetails, PhotoServiceError> {
        let title = input.title.trim().to_string();
        let title_len = title.chars().count();
        if title_len == 0 || title_len > TITLE_MAX_LEN {
            return Err(PhotoServiceError::ValidationError(format!(
                "Title must be between 1 and {} characters",
                TITLE_MAX_LEN
            )));
        }
        let description = input.description.filter(|d| !d.trim().is_empty());
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > DESCRIPTION_MAX_LEN)
        {
            return Err(PhotoServiceError::ValidationError(format!(
                "Description must be at most {} characters",
                DESCRIPTION_MAX_LEN
            )));
        }

        let category_ids = if input.category_ids.is_empty() {
            Vec::new()
        } else {
            self.categories
                .existing_ids(&input.category_ids)
                .await
                .context("Failed to check categories")?
        };

        let stored = self
            .images
            .save(ImageKind::Photo, &input.file_name, input.bytes)
            .await?;

        let create = CreatePhotoInput {
            title,
            description,
            file_path: stored.public_path.clone(),
            file_name: input.file_name,
            file_size: stored.file_size,
            width: stored.width,
            height: stored.height,
            owner_id: owner.id,
            category_ids,
        };

        let photo = match self.photos.create(&create).await {
            Ok(photo) => photo,
            Err(e) => {
                self.images.delete(&stored.public_path).await;
                return Err(e.context("Failed to create photo").into());
            }
        };

        invalidate_stats(&self.cache, &[owner.id]).await;
        tracing::info!("User {} uploaded photo {}", owner.id, photo.id);

        let categories = self.photo_categories(photo.id).await?;
        Ok(PhotoDetails {
            photo,
            categories,
            is_liked: false,
        })
    }

    pub async fn list(&self, filter: &PhotoFilter) -> Result<Vec<Photo>, PhotoServiceError> {
        Ok(self
            .photos
            .list(filter)
            .await
            .context("Failed to list photos")?)
    }

    async fn find(&self, id: i64) -> Result<Photo, PhotoServiceError> {
        self.photos
            .get_by_id(id)
            .await
            .context("Failed to get photo")?
            .ok_or(PhotoServiceError::NotFound)
    }

    async fn photo_categories(&self, photo_id: i64) -> Result<Vec<Category>, PhotoServiceError> {
        Ok(self
            .categories
            .list_for_photo(photo_id)
            .await
            .context("Failed to load photo categories")?)
    }

    /// Counts a view, then returns the photo as the viewer sees it
    pub async fn get(
        &self,
        id: i64,
        viewer_id: Option<i64>,
    ) -> Result<PhotoDetails, PhotoServiceError> {
        self.find(id).await?;
        self.photos
            .increment_views(id)
            .await
            .context("Failed to count view")?;
        let photo = self.find(id).await?;

        let is_liked = match viewer_id {
            Some(user_id) => self
                .photos
                .is_liked(id, user_id)
                .await
                .context("Failed to check like")?,
            None => false,
        };
        let categories = self.photo_categories(id).await?;

        Ok(PhotoDetails {
            photo,
            categories,
            is_liked,
        })
    }

    /// Owner only. Removes the stored file as well as the row.
    pub async fn delete(&self, user: &User, id: i64) -> Result<(), PhotoServiceError> {
        let photo = self.find(id).await?;
        if photo.owner_id != user.id {
            return Err(PhotoServiceError::NotAuthorized);
        }

        self.images.delete(&photo.file_path).await;
        self.photos
            .delete(id)
            .await
            .context("Failed to delete photo")?;
        invalidate_stats(&self.cache, &[user.id]).await;
        Ok(())
    }

    pub async fn like(&self, user_id: i64, photo_id: i64) -> Result<(), PhotoServiceError> {
        self.find(photo_id).await?;
        let added = self
            .photos
            .add_like(photo_id, user_id)
            .await
            .context("Failed to like photo")?;
        if !added {
            return Err(PhotoServiceError::AlreadyLiked);
        }
        Ok(())
    }

    pub async fn unlike(&self, user_id: i64, photo_id: i64) -> Result<(), PhotoServiceError> {
        let removed = self
            .photos
            .remove_like(photo_id, user_id)
            .await
            .context("Failed to unlike photo")?;
        if !removed {
            return Err(PhotoServiceError::NotLiked);
        }
        Ok(())
    }

    /// Original file name and the stored bytes
    pub async fn download(&self, id: i64) -> Result<(String, Vec<u8>), PhotoServiceError> {
        let photo = self.find(id).await?;
        let path = self.images.config().disk_path(&photo.file_path);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok((photo.file_name, bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PhotoServiceError::FileNotFound)
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to read {}", path.display()))
                .into()),
        }
    }
}
