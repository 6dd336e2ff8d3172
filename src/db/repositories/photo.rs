//! Photo repository
//!
//! Photos, their category links, likes and the denormalised counters kept
//! on each photo row.

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{CreatePhotoInput, Photo, PhotoFilter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const PHOTO_SELECT: &str = r#"
    SELECT p.id, p.title, p.description, p.file_path, p.file_name, p.file_size,
           p.width, p.height, p.owner_id, u.username AS owner_username,
           p.views_count, p.likes_count, p.comments_count, p.created_at, p.updated_at
    FROM photos p
    INNER JOIN users u ON u.id = p.owner_id
"#;

macro_rules! photo_from_row {
    ($row:expr) => {
        Photo {
            id: $row.get("id"),
            title: $row.get("title"),
            description: $row.get("description"),
            file_path: $row.get("file_path"),
            file_name: $row.get("file_name"),
            file_size: $row.get("file_size"),
            width: $row.get("width"),
            height: $row.get("height"),
            owner_id: $row.get("owner_id"),
            owner_username: $row.get("owner_username"),
            views_count: $row.get("views_count"),
            likes_count: $row.get("likes_count"),
            comments_count: $row.get("comments_count"),
            created_at: $row.get("created_at"),
            updated_at: $row.get("updated_at"),
        }
    };
}

#[async_trait]
pub trait PhotoRepository: Send + Sync {
    /// Insert the photo and link it to `input.category_ids`
    async fn create(&self, input: &CreatePhotoInput) -> Result<Photo>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Photo>>;

    /// Newest first, filtered and paginated
    async fn list(&self, filter: &PhotoFilter) -> Result<Vec<Photo>>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn increment_views(&self, id: i64) -> Result<()>;

    /// Record a like; returns `false` if the user already liked the photo
    async fn add_like(&self, photo_id: i64, user_id: i64) -> Result<bool>;

    /// Remove a like; returns `false` if there was nothing to remove
    async fn remove_like(&self, photo_id: i64, user_id: i64) -> Result<bool>;

    async fn is_liked(&self, photo_id: i64, user_id: i64) -> Result<bool>;

    async fn increment_comments(&self, photo_id: i64) -> Result<()>;

    /// Never drops below zero
    async fn decrement_comments(&self, photo_id: i64) -> Result<()>;
}

pub struct SqlxPhotoRepository {
    pool: DynDatabasePool,
}

impl SqlxPhotoRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PhotoRepository> {
        Arc::new(Self::new(pool))
    }
}

/// WHERE clause for a listing, with placeholders in bind order:
/// owner, search (twice), category ids
fn build_list_sql(filter: &PhotoFilter) -> String {
    let mut sql = format!("{} WHERE 1 = 1", PHOTO_SELECT);

    if filter.owner_id.is_some() {
        sql.push_str(" AND p.owner_id = ?");
    }
    if filter.search.is_some() {
        sql.push_str(
            " AND (LOWER(p.title) LIKE ? OR LOWER(COALESCE(p.description, '')) LIKE ?)",
        );
    }
    if !filter.category_ids.is_empty() {
        let placeholders = vec!["?"; filter.category_ids.len()].join(", ");
        sql.push_str(&format!(
            " AND p.id IN (SELECT pc.photo_id FROM photo_categories pc WHERE pc.category_id IN ({}))",
            placeholders
        ));
    }

    sql.push_str(" ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?");
    sql
}

#[async_trait]
impl PhotoRepository for SqlxPhotoRepository {
    async fn create(&self, input: &CreatePhotoInput) -> Result<Photo> {
        let id = with_pool!(self.pool, db => {
            let mut tx = db.begin().await.context("Failed to begin transaction")?;

            let id = sqlx::query(
                r#"
                INSERT INTO photos (title, description, file_path, file_name, file_size,
                                    width, height, owner_id, views_count, likes_count,
                                    comments_count, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, ?)
                "#,
            )
            .bind(&input.title)
            .bind(&input.description)
            .bind(&input.file_path)
            .bind(&input.file_name)
            .bind(input.file_size)
            .bind(input.width)
            .bind(input.height)
            .bind(input.owner_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .context("Failed to create photo")?
            .inserted_id();

            for category_id in &input.category_ids {
                sqlx::query("INSERT INTO photo_categories (photo_id, category_id) VALUES (?, ?)")
                    .bind(id)
                    .bind(*category_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to link photo category")?;
            }

            tx.commit().await.context("Failed to commit photo")?;
            id
        });

        self.get_by_id(id)
            .await?
            .context("Photo not found after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Photo>> {
        let sql = format!("{} WHERE p.id = ?", PHOTO_SELECT);
        let photo = with_pool!(self.pool, db => {
            sqlx::query(&sql)
                .bind(id)
                .fetch_optional(db)
                .await
                .context("Failed to get photo")?
                .map(|row| photo_from_row!(row))
        });
        Ok(photo)
    }

    async fn list(&self, filter: &PhotoFilter) -> Result<Vec<Photo>> {
        let sql = build_list_sql(filter);
        let pattern = filter
            .search
            .as_ref()
            .map(|s| format!("%{}%", s.to_lowercase()));

        let photos = with_pool!(self.pool, db => {
            let mut query = sqlx::query(&sql);
            if let Some(owner_id) = filter.owner_id {
                query = query.bind(owner_id);
            }
            if let Some(pattern) = &pattern {
                query = query.bind(pattern.as_str()).bind(pattern.as_str());
            }
            for category_id in &filter.category_ids {
                query = query.bind(*category_id);
            }
            query
                .bind(filter.limit)
                .bind(filter.skip)
                .fetch_all(db)
                .await
                .context("Failed to list photos")?
                .iter()
                .map(|row| photo_from_row!(row))
                .collect()
        });
        Ok(photos)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("DELETE FROM photos WHERE id = ?")
                .bind(id)
                .execute(db)
                .await
                .context("Failed to delete photo")?;
        });
        Ok(())
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("UPDATE photos SET views_count = views_count + 1 WHERE id = ?")
                .bind(id)
                .execute(db)
                .await
                .context("Failed to increment views")?;
        });
        Ok(())
    }

    async fn add_like(&self, photo_id: i64, user_id: i64) -> Result<bool> {
        let added = with_pool!(self.pool, db => {
            let mut tx = db.begin().await.context("Failed to begin transaction")?;

            let existing: i64 = sqlx::query(
                "SELECT COUNT(*) AS n FROM photo_likes WHERE photo_id = ? AND user_id = ?",
            )
            .bind(photo_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to check like")?
            .get("n");

            if existing > 0 {
                false
            } else {
                sqlx::query("INSERT INTO photo_likes (photo_id, user_id, created_at) VALUES (?, ?, ?)")
                    .bind(photo_id)
                    .bind(user_id)
                    .bind(Utc::now())
                    .execute(&mut *tx)
                    .await
                    .context("Failed to insert like")?;
                sqlx::query("UPDATE photos SET likes_count = likes_count + 1 WHERE id = ?")
                    .bind(photo_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to increment likes")?;
                tx.commit().await.context("Failed to commit like")?;
                true
            }
        });
        Ok(added)
    }

    async fn remove_like(&self, photo_id: i64, user_id: i64) -> Result<bool> {
        let removed = with_pool!(self.pool, db => {
            let mut tx = db.begin().await.context("Failed to begin transaction")?;

            let deleted = sqlx::query("DELETE FROM photo_likes WHERE photo_id = ? AND user_id = ?")
                .bind(photo_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .context("Failed to delete like")?
                .rows_affected();

            if deleted > 0 {
                sqlx::query(
                    "UPDATE photos SET likes_count = CASE WHEN likes_count > 0 THEN likes_count - 1 ELSE 0 END WHERE id = ?",
                )
                .bind(photo_id)
                .execute(&mut *tx)
                .await
                .context("Failed to decrement likes")?;
            }
            tx.commit().await.context("Failed to commit unlike")?;
            deleted > 0
        });
        Ok(removed)
    }

    async fn is_liked(&self, photo_id: i64, user_id: i64) -> Result<bool> {
        let count: i64 = with_pool!(self.pool, db => {
            sqlx::query("SELECT COUNT(*) AS n FROM photo_likes WHERE photo_id = ? AND user_id = ?")
                .bind(photo_id)
                .bind(user_id)
                .fetch_one(db)
                .await
                .context("Failed to check like")?
                .get("n")
        });
        Ok(count > 0)
    }

    async fn increment_comments(&self, photo_id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("UPDATE photos SET comments_count = comments_count + 1 WHERE id = ?")
                .bind(photo_id)
                .execute(db)
                .await
                .context("Failed to increment comments")?;
        });
        Ok(())
    }

    async fn decrement_comments(&self, photo_id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query(
                "UPDATE photos SET comments_count = CASE WHEN comments_count > 0 THEN comments_count - 1 ELSE 0 END WHERE id = ?",
            )
            .bind(photo_id)
            .execute(db)
            .await
            .context("Failed to decrement comments")?;
        });
        Ok(())
    }
}
