//! Category repository

use crate::db::DynDatabasePool;
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

macro_rules! category_from_row {
    ($row:expr) => {
        Category {
            id: $row.get("id"),
            name: $row.get("name"),
            slug: $row.get("slug"),
            description: $row.get("description"),
            created_at: $row.get("created_at"),
        }
    };
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// All categories ordered by name
    async fn list(&self) -> Result<Vec<Category>>;

    /// Categories attached to a photo, ordered by name
    async fn list_for_photo(&self, photo_id: i64) -> Result<Vec<Category>>;

    /// Subset of `ids` that exist
    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn list(&self) -> Result<Vec<Category>> {
        let categories = with_pool!(self.pool, db => {
            sqlx::query("SELECT id, name, slug, description, created_at FROM categories ORDER BY name")
                .fetch_all(db)
                .await
                .context("Failed to list categories")?
                .iter()
                .map(|row| category_from_row!(row))
                .collect()
        });
        Ok(categories)
    }

    async fn list_for_photo(&self, photo_id: i64) -> Result<Vec<Category>> {
        let categories = with_pool!(self.pool, db => {
            sqlx::query(
                r#"
                SELECT c.id, c.name, c.slug, c.description, c.created_at
                FROM categories c
                INNER JOIN photo_categories pc ON pc.category_id = c.id
                WHERE pc.photo_id = ?
                ORDER BY c.name
                "#,
            )
            .bind(photo_id)
            .fetch_all(db)
            .await
            .context("Failed to list photo categories")?
            .iter()
            .map(|row| category_from_row!(row))
            .collect()
        });
        Ok(categories)
    }

    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id FROM categories WHERE id IN ({}) ORDER BY id",
            placeholders
        );

        let found = with_pool!(self.pool, db => {
            let mut query = sqlx::query(&sql);
            for id in ids {
                query = query.bind(*id);
            }
            query
                .fetch_all(db)
                .await
                .context("Failed to check category ids")?
                .iter()
                .map(|row| row.get::<i64, _>("id"))
                .collect()
        });
        Ok(found)
    }
}
