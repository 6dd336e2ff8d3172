//! Follows and blocks
//!
//! A block in either direction prevents following, and creating one removes
//! any follow between the two users.

use crate::cache::Cache;
use crate::db::repositories::{SocialRepository, UserRepository};
use crate::services::user::invalidate_stats;
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SocialServiceError {
    #[error("Cannot follow yourself")]
    CannotFollowSelf,

    #[error("Cannot block yourself")]
    CannotBlockSelf,

    #[error("User not found")]
    UserNotFound,

    #[error("Already following this user")]
    AlreadyFollowing,

    #[error("Cannot follow a blocked user")]
    Blocked,

    #[error("Not following this user")]
    NotFollowing,

    #[error("User already blocked")]
    AlreadyBlocked,

    #[error("User not blocked")]
    NotBlocked,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SocialService {
    users: Arc<dyn UserRepository>,
    social: Arc<dyn SocialRepository>,
    cache: Arc<Cache>,
}

impl SocialService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        social: Arc<dyn SocialRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self { users, social, cache }
    }

    async fn ensure_user(&self, id: i64) -> Result<(), SocialServiceError> {
        self.users
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or(SocialServiceError::UserNotFound)?;
        Ok(())
    }

    pub async fn follow(&self, follower_id: i64, target_id: i64) -> Result<(), SocialServiceError> {
        if follower_id == target_id {
            return Err(SocialServiceError::CannotFollowSelf);
        }
        self.ensure_user(target_id).await?;

        if self
            .social
            .is_following(follower_id, target_id)
            .await
            .context("Failed to check follow")?
        {
            return Err(SocialServiceError::AlreadyFollowing);
        }
        if self
            .social
            .is_blocked_either(follower_id, target_id)
            .await
            .context("Failed to check block")?
        {
            return Err(SocialServiceError::Blocked);
        }

        self.social
            .follow(follower_id, target_id)
            .await
            .context("Failed to follow user")?;
        invalidate_stats(&self.cache, &[follower_id, target_id]).await;
        Ok(())
    }

    pub async fn unfollow(&self, follower_id: i64, target_id: i64) -> Result<(), SocialServiceError> {
        let removed = self
            .social
            .unfollow(follower_id, target_id)
            .await
            .context("Failed to unfollow user")?;
        if !removed {
            return Err(SocialServiceError::NotFollowing);
        }
        invalidate_stats(&self.cache, &[follower_id, target_id]).await;
        Ok(())
    }

    pub async fn block(&self, blocker_id: i64, target_id: i64) -> Result<(), SocialServiceError> {
        if blocker_id == target_id {
            return Err(SocialServiceError::CannotBlockSelf);
        }
        self.ensure_user(target_id).await?;

        if self
            .social
            .is_blocked(blocker_id, target_id)
            .await
            .context("Failed to check block")?
        {
            return Err(SocialServiceError::AlreadyBlocked);
        }

        self.social
            .block(blocker_id, target_id)
            .await
            .context("Failed to block user")?;
        invalidate_stats(&self.cache, &[blocker_id, target_id]).await;
        tracing::info!("User {} blocked user {}", blocker_id, target_id);
        Ok(())
    }

    pub async fn unblock(&self, blocker_id: i64, target_id: i64) -> Result<(), SocialServiceError> {
        let removed = self
            .social
            .unblock(blocker_id, target_id)
            .await
            .context("Failed to unblock user")?;
        if !removed {
            return Err(SocialServiceError::NotBlocked);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSocialRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    struct Harness {
        service: SocialService,
        social: Arc<dyn SocialRepository>,
        alice: i64,
        bob: i64,
    }

    async fn setup() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let alice = users
            .create(&User::new("alice".into(), "alice@example.com".into(), "h".into()))
            .await
            .unwrap();
        let bob = users
            .create(&User::new("bob".into(), "bob@example.com".into(), "h".into()))
            .await
            .unwrap();
        let social = SqlxSocialRepository::boxed(pool);

        Harness {
            service: SocialService::new(users, social.clone(), Arc::new(Cache::memory())),
            social,
            alice: alice.id,
            bob: bob.id,
        }
    }

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let h = setup().await;

        h.service.follow(h.alice, h.bob).await.unwrap();
        assert!(h.social.is_following(h.alice, h.bob).await.unwrap());
        assert!(matches!(
            h.service.follow(h.alice, h.bob).await,
            Err(SocialServiceError::AlreadyFollowing)
        ));

        h.service.unfollow(h.alice, h.bob).await.unwrap();
        assert!(matches!(
            h.service.unfollow(h.alice, h.bob).await,
            Err(SocialServiceError::NotFollowing)
        ));
    }

    #[tokio::test]
    async fn test_follow_errors() {
        let h = setup().await;

        assert!(matches!(
            h.service.follow(h.alice, h.alice).await,
            Err(SocialServiceError::CannotFollowSelf)
        ));
        assert!(matches!(
            h.service.follow(h.alice, 999).await,
            Err(SocialServiceError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_block_removes_follows_both_ways() {
        let h = setup().await;
        h.service.follow(h.alice, h.bob).await.unwrap();
        h.service.follow(h.bob, h.alice).await.unwrap();

        h.service.block(h.alice, h.bob).await.unwrap();

        assert!(!h.social.is_following(h.alice, h.bob).await.unwrap());
        assert!(!h.social.is_following(h.bob, h.alice).await.unwrap());
        assert!(matches!(
            h.service.block(h.alice, h.bob).await,
            Err(SocialServiceError::AlreadyBlocked)
        ));
    }

    #[tokio::test]
    async fn test_block_prevents_follow_in_either_direction() {
        let h = setup().await;
        h.service.block(h.alice, h.bob).await.unwrap();

        assert!(matches!(
            h.service.follow(h.alice, h.bob).await,
            Err(SocialServiceError::Blocked)
        ));
        assert!(matches!(
            h.service.follow(h.bob, h.alice).await,
            Err(SocialServiceError::Blocked)
        ));

        h.service.unblock(h.alice, h.bob).await.unwrap();
        h.service.follow(h.bob, h.alice).await.unwrap();
    }

    #[tokio::test]
    async fn test_block_errors() {
        let h = setup().await;

        assert!(matches!(
            h.service.block(h.alice, h.alice).await,
            Err(SocialServiceError::CannotBlockSelf)
        ));
        assert!(matches!(
            h.service.block(h.alice, 999).await,
            Err(SocialServiceError::UserNotFound)
        ));
        assert!(matches!(
            h.service.unblock(h.alice, h.bob).await,
            Err(SocialServiceError::NotBlocked)
        ));
    }
}
