//! Comment service
//!
//! Comments nest without a depth limit. Each new comment, top-level or
//! reply, bumps the photo's counter by one and each delete lowers it by one.

use crate::db::repositories::{CommentRepository, PhotoRepository};
use crate::models::{Comment, CommentThread, CreateCommentInput};
use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;

pub const CONTENT_MAX_LEN: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Photo not found")]
    PhotoNotFound,

    #[error("Parent comment not found")]
    ParentNotFound,

    #[error("Comment not found")]
    NotFound,

    #[error("Not authorized to update this comment")]
    NotAuthorizedToUpdate,

    #[error("Not authorized to delete this comment")]
    NotAuthorizedToDelete,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

fn validate_content(content: &str) -> Result<(), CommentServiceError> {
    let len = content.trim().chars().count();
    if len == 0 || content.chars().count() > CONTENT_MAX_LEN {
        return Err(CommentServiceError::ValidationError(format!(
            "Comment must be between 1 and {} characters",
            CONTENT_MAX_LEN
        )));
    }
    Ok(())
}

/// Arrange a flat, oldest-first list into threads. Replies whose parent is
/// missing from the list are dropped.
pub fn build_threads(comments: Vec<Comment>) -> Vec<CommentThread> {
    let mut children: HashMap<Option<i64>, Vec<Comment>> = HashMap::new();
    for comment in comments {
        children.entry(comment.parent_id).or_default().push(comment);
    }

    fn attach(parent: Option<i64>, children: &mut HashMap<Option<i64>, Vec<Comment>>) -> Vec<CommentThread> {
        let level = children.remove(&parent).unwrap_or_default();
        level
            .into_iter()
            .map(|comment| {
                let replies = attach(Some(comment.id), children);
                CommentThread { comment, replies }
            })
            .collect()
    }

    attach(None, &mut children)
}

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    photos: Arc<dyn PhotoRepository>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentRepository>, photos: Arc<dyn PhotoRepository>) -> Self {
        Self { comments, photos }
    }

    async fn ensure_photo(&self, photo_id: i64) -> Result<(), CommentServiceError> {
        self.photos
            .get_by_id(photo_id)
            .await
            .context("Failed to get photo")?
            .ok_or(CommentServiceError::PhotoNotFound)?;
        Ok(())
    }

    async fn find(&self, id: i64) -> Result<Comment, CommentServiceError> {
        self.comments
            .get_by_id(id)
            .await
            .context("Failed to get comment")?
            .ok_or(CommentServiceError::NotFound)
    }

    async fn insert(&self, input: CreateCommentInput) -> Result<Comment, CommentServiceError> {
        let comment = self
            .comments
            .create(&input)
            .await
            .context("Failed to create comment")?;
        self.photos
            .increment_comments(input.photo_id)
            .await
            .context("Failed to update comment count")?;
        Ok(comment)
    }

    pub async fn create(
        &self,
        author_id: i64,
        photo_id: i64,
        content: &str,
    ) -> Result<Comment, CommentServiceError> {
        validate_content(content)?;
        self.ensure_photo(photo_id).await?;

        self.insert(CreateCommentInput {
            content: content.to_string(),
            photo_id,
            author_id,
            parent_id: None,
        })
        .await
    }

    /// Reply to a comment; the reply belongs to the parent's photo
    pub async fn reply(
        &self,
        author_id: i64,
        parent_id: i64,
        content: &str,
    ) -> Result<Comment, CommentServiceError> {
        validate_content(content)?;
        let parent = self
            .comments
            .get_by_id(parent_id)
            .await
            .context("Failed to get parent comment")?
            .ok_or(CommentServiceError::ParentNotFound)?;

        self.insert(CreateCommentInput {
            content: content.to_string(),
            photo_id: parent.photo_id,
            author_id,
            parent_id: Some(parent.id),
        })
        .await
    }

    pub async fn list_for_photo(
        &self,
        photo_id: i64,
    ) -> Result<Vec<CommentThread>, CommentServiceError> {
        self.ensure_photo(photo_id).await?;
        let comments = self
            .comments
            .list_for_photo(photo_id)
            .await
            .context("Failed to list comments")?;
        Ok(build_threads(comments))
    }

    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        content: &str,
    ) -> Result<Comment, CommentServiceError> {
        validate_content(content)?;
        let comment = self.find(id).await?;
        if comment.author_id != user_id {
            return Err(CommentServiceError::NotAuthorizedToUpdate);
        }

        Ok(self
            .comments
            .update_content(id, content)
            .await
            .context("Failed to update comment")?)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), CommentServiceError> {
        let comment = self.find(id).await?;
        if comment.author_id != user_id {
            return Err(CommentServiceError::NotAuthorizedToDelete);
        }

        if self
            .comments
            .delete(id)
            .await
            .context("Failed to delete comment")?
        {
            self.photos
                .decrement_comments(comment.photo_id)
                .await
                .context("Failed to update comment count")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxCommentRepository, SqlxPhotoRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreatePhotoInput, User};
    use chrono::Utc;

    struct Harness {
        service: CommentService,
        photos: Arc<dyn PhotoRepository>,
        alice: i64,
        bob: i64,
        photo_id: i64,
    }

    async fn setup() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let alice = users
            .create(&User::new("alice".into(), "alice@example.com".into(), "h".into()))
            .await
            .unwrap();
        let bob = users
            .create(&User::new("bob".into(), "bob@example.com".into(), "h".into()))
            .await
            .unwrap();

        let photos = SqlxPhotoRepository::boxed(pool.clone());
        let photo = photos
            .create(&CreatePhotoInput {
                title: "Lake".into(),
                description: None,
                file_path: "uploads/photos/lake.jpg".into(),
                file_name: "lake.jpg".into(),
                file_size: 10,
                width: None,
                height: None,
                owner_id: alice.id,
                category_ids: vec![],
            })
            .await
            .unwrap();

        Harness {
            service: CommentService::new(SqlxCommentRepository::boxed(pool), photos.clone()),
            photos,
            alice: alice.id,
            bob: bob.id,
            photo_id: photo.id,
        }
    }

    async fn comments_count(h: &Harness) -> i64 {
        h.photos.get_by_id(h.photo_id).await.unwrap().unwrap().comments_count
    }

    fn comment(id: i64, parent_id: Option<i64>) -> Comment {
        Comment {
            id,
            content: format!("c{}", id),
            photo_id: 1,
            author_id: 1,
            author_username: "alice".into(),
            author_profile_picture: None,
            parent_id,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_build_threads_nests_replies() {
        let threads = build_threads(vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, None),
            comment(4, Some(2)),
            comment(5, Some(1)),
            comment(6, Some(99)),
        ]);

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.id, 1);
        let reply_ids: Vec<i64> = threads[0].replies.iter().map(|t| t.comment.id).collect();
        assert_eq!(reply_ids, vec![2, 5]);
        assert_eq!(threads[0].replies[0].replies[0].comment.id, 4);
        assert!(threads[1].replies.is_empty());
    }

    #[tokio::test]
    async fn test_create_and_reply_increment_counter() {
        let h = setup().await;

        let top = h.service.create(h.bob, h.photo_id, "Great shot").await.unwrap();
        assert_eq!(top.author_username, "bob");
        assert_eq!(top.parent_id, None);

        let reply = h.service.reply(h.alice, top.id, "Thanks!").await.unwrap();
        assert_eq!(reply.photo_id, h.photo_id);
        assert_eq!(reply.parent_id, Some(top.id));

        assert_eq!(comments_count(&h).await, 2);

        let threads = h.service.list_for_photo(h.photo_id).await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].replies[0].comment.id, reply.id);
    }

    #[tokio::test]
    async fn test_missing_targets() {
        let h = setup().await;

        assert!(matches!(
            h.service.create(h.bob, 999, "hi").await,
            Err(CommentServiceError::PhotoNotFound)
        ));
        assert!(matches!(
            h.service.reply(h.bob, 999, "hi").await,
            Err(CommentServiceError::ParentNotFound)
        ));
        assert!(matches!(
            h.service.list_for_photo(999).await,
            Err(CommentServiceError::PhotoNotFound)
        ));
        assert!(matches!(
            h.service.update(h.bob, 999, "hi").await,
            Err(CommentServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_content_validation() {
        let h = setup().await;
        assert!(matches!(
            h.service.create(h.bob, h.photo_id, "   ").await,
            Err(CommentServiceError::ValidationError(_))
        ));
        assert!(matches!(
            h.service
                .create(h.bob, h.photo_id, &"x".repeat(CONTENT_MAX_LEN + 1))
                .await,
            Err(CommentServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_is_author_only() {
        let h = setup().await;
        let c = h.service.create(h.bob, h.photo_id, "first").await.unwrap();

        assert!(matches!(
            h.service.update(h.alice, c.id, "hijack").await,
            Err(CommentServiceError::NotAuthorizedToUpdate)
        ));

        let updated = h.service.update(h.bob, c.id, "edited").await.unwrap();
        assert_eq!(updated.content, "edited");
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_cascades_and_decrements_once() {
        let h = setup().await;
        let top = h.service.create(h.bob, h.photo_id, "top").await.unwrap();
        h.service.reply(h.alice, top.id, "reply").await.unwrap();
        assert_eq!(comments_count(&h).await, 2);

        assert!(matches!(
            h.service.delete(h.alice, top.id).await,
            Err(CommentServiceError::NotAuthorizedToDelete)
        ));

        h.service.delete(h.bob, top.id).await.unwrap();
        assert!(h.service.list_for_photo(h.photo_id).await.unwrap().is_empty());
        assert_eq!(comments_count(&h).await, 1);
    }
}
