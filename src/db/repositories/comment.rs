//! Comment repository

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{Comment, CreateCommentInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.content, c.photo_id, c.author_id, u.username AS author_username,
           u.profile_picture AS author_profile_picture, c.parent_id, c.created_at, c.updated_at
    FROM comments c
    INNER JOIN users u ON u.id = c.author_id
"#;

macro_rules! comment_from_row {
    ($row:expr) => {
        Comment {
            id: $row.get("id"),
            content: $row.get("content"),
            photo_id: $row.get("photo_id"),
            author_id: $row.get("author_id"),
            author_username: $row.get("author_username"),
            author_profile_picture: $row.get("author_profile_picture"),
            parent_id: $row.get("parent_id"),
            created_at: $row.get("created_at"),
            updated_at: $row.get("updated_at"),
        }
    };
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Every comment on a photo, oldest first
    async fn list_for_photo(&self, photo_id: i64) -> Result<Vec<Comment>>;

    async fn update_content(&self, id: i64, content: &str) -> Result<Comment>;

    /// Replies go with it through the foreign key cascade
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count_for_photo(&self, photo_id: i64) -> Result<i64>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment> {
        let id = with_pool!(self.pool, db => {
            sqlx::query(
                "INSERT INTO comments (content, photo_id, author_id, parent_id, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&input.content)
            .bind(input.photo_id)
            .bind(input.author_id)
            .bind(input.parent_id)
            .bind(Utc::now())
            .execute(db)
            .await
            .context("Failed to create comment")?
            .inserted_id()
        });

        self.get_by_id(id)
            .await?
            .context("Comment not found after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE c.id = ?", COMMENT_SELECT);
        let comment = with_pool!(self.pool, db => {
            sqlx::query(&sql)
                .bind(id)
                .fetch_optional(db)
                .await
                .context("Failed to get comment")?
                .map(|row| comment_from_row!(row))
        });
        Ok(comment)
    }

    async fn list_for_photo(&self, photo_id: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "{} WHERE c.photo_id = ? ORDER BY c.created_at ASC, c.id ASC",
            COMMENT_SELECT
        );
        let comments = with_pool!(self.pool, db => {
            sqlx::query(&sql)
                .bind(photo_id)
                .fetch_all(db)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(|row| comment_from_row!(row))
                .collect()
        });
        Ok(comments)
    }

    async fn update_content(&self, id: i64, content: &str) -> Result<Comment> {
        with_pool!(self.pool, db => {
            sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
                .bind(content)
                .bind(Utc::now())
                .bind(id)
                .execute(db)
                .await
                .context("Failed to update comment")?;
        });

        self.get_by_id(id).await?.context("Comment not found")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let deleted = with_pool!(self.pool, db => {
            sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(id)
                .execute(db)
                .await
                .context("Failed to delete comment")?
                .rows_affected()
        });
        Ok(deleted > 0)
    }

    async fn count_for_photo(&self, photo_id: i64) -> Result<i64> {
        let count: i64 = with_pool!(self.pool, db => {
            sqlx::query("SELECT COUNT(*) AS n FROM comments WHERE photo_id = ?")
                .bind(photo_id)
                .fetch_one(db)
                .await
                .context("Failed to count comments")?
                .get("n")
        });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        PhotoRepository, SqlxPhotoRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreatePhotoInput, User};

    async fn setup() -> (SqlxCommentRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("writer".into(), "writer@example.com".into(), "h".into()))
            .await
            .unwrap();
        let photo = SqlxPhotoRepository::new(pool.clone())
            .create(&CreatePhotoInput {
                title: "p".into(),
                description: None,
                file_path: "uploads/photos/p.jpg".into(),
                file_name: "p.jpg".into(),
                file_size: 1,
                width: None,
                height: None,
                owner_id: user.id,
                category_ids: vec![],
            })
            .await
            .unwrap();
        (SqlxCommentRepository::new(pool), photo.id, user.id)
    }

    fn input(photo_id: i64, author_id: i64, content: &str, parent_id: Option<i64>) -> CreateCommentInput {
        CreateCommentInput {
            content: content.to_string(),
            photo_id,
            author_id,
            parent_id,
        }
    }

    #[tokio::test]
    async fn test_create_and_list_in_order() {
        let (repo, photo, user) = setup().await;
        let first = repo.create(&input(photo, user, "first", None)).await.unwrap();
        repo.create(&input(photo, user, "reply", Some(first.id))).await.unwrap();

        assert_eq!(first.author_username, "writer");

        let all = repo.list_for_photo(photo).await.unwrap();
        let contents: Vec<&str> = all.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "reply"]);
        assert_eq!(all[1].parent_id, Some(first.id));
        assert_eq!(repo.count_for_photo(photo).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_content_sets_updated_at() {
        let (repo, photo, user) = setup().await;
        let comment = repo.create(&input(photo, user, "old", None)).await.unwrap();
        assert!(comment.updated_at.is_none());

        let updated = repo.update_content(comment.id, "new").await.unwrap();

        assert_eq!(updated.content, "new");
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_replies() {
        let (repo, photo, user) = setup().await;
        let root = repo.create(&input(photo, user, "root", None)).await.unwrap();
        let child = repo.create(&input(photo, user, "child", Some(root.id))).await.unwrap();
        repo.create(&input(photo, user, "grandchild", Some(child.id))).await.unwrap();
        repo.create(&input(photo, user, "other", None)).await.unwrap();

        assert!(repo.delete(root.id).await.unwrap());

        assert_eq!(repo.count_for_photo(photo).await.unwrap(), 1);
        assert!(repo.get_by_id(child.id).await.unwrap().is_none());
        assert!(!repo.delete(root.id).await.unwrap());
    }
}
