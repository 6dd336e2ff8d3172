//! Follow and block relationships

use crate::db::repositories::user::user_from_row;
use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const USER_COLUMNS_U: &str = "u.id, u.username, u.email, u.hashed_password, u.bio, \
     u.profile_picture, u.is_active, u.is_verified, u.is_oauth, u.oauth_provider, \
     u.created_at, u.updated_at";

#[async_trait]
pub trait SocialRepository: Send + Sync {
    async fn follow(&self, follower_id: i64, followed_id: i64) -> Result<()>;

    /// Returns `false` when there was no such follow
    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool>;

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool>;

    /// Users following `user_id`, most recent follow first
    async fn followers(&self, user_id: i64, skip: i64, limit: i64) -> Result<Vec<User>>;

    /// Users `user_id` follows, most recent follow first
    async fn following(&self, user_id: i64, skip: i64, limit: i64) -> Result<Vec<User>>;

    /// Record the block and drop follows in both directions
    async fn block(&self, blocker_id: i64, blocked_id: i64) -> Result<()>;

    /// Returns `false` when there was no such block
    async fn unblock(&self, blocker_id: i64, blocked_id: i64) -> Result<bool>;

    /// `blocker_id` has blocked `blocked_id`
    async fn is_blocked(&self, blocker_id: i64, blocked_id: i64) -> Result<bool>;

    /// Either user has blocked the other
    async fn is_blocked_either(&self, a: i64, b: i64) -> Result<bool>;
}

pub struct SqlxSocialRepository {
    pool: DynDatabasePool,
}

impl SqlxSocialRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SocialRepository> {
        Arc::new(Self::new(pool))
    }

    async fn count(&self, sql: &str, a: i64, b: i64) -> Result<i64> {
        let count: i64 = with_pool!(self.pool, db => {
            sqlx::query(sql)
                .bind(a)
                .bind(b)
                .fetch_one(db)
                .await
                .context("Failed to query relationship")?
                .get("n")
        });
        Ok(count)
    }

    async fn list_users(&self, sql: &str, user_id: i64, skip: i64, limit: i64) -> Result<Vec<User>> {
        let users = with_pool!(self.pool, db => {
            sqlx::query(sql)
                .bind(user_id)
                .bind(limit)
                .bind(skip)
                .fetch_all(db)
                .await
                .context("Failed to list users")?
                .iter()
                .map(|row| user_from_row!(row))
                .collect()
        });
        Ok(users)
    }
}

#[async_trait]
impl SocialRepository for SqlxSocialRepository {
    async fn follow(&self, follower_id: i64, followed_id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, ?)")
                .bind(follower_id)
                .bind(followed_id)
                .bind(Utc::now())
                .execute(db)
                .await
                .context("Failed to create follow")?;
        });
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let deleted = with_pool!(self.pool, db => {
            sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followed_id = ?")
                .bind(follower_id)
                .bind(followed_id)
                .execute(db)
                .await
                .context("Failed to delete follow")?
                .rows_affected()
        });
        Ok(deleted > 0)
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let n = self
            .count(
                "SELECT COUNT(*) AS n FROM follows WHERE follower_id = ? AND followed_id = ?",
                follower_id,
                followed_id,
            )
            .await?;
        Ok(n > 0)
    }

    async fn followers(&self, user_id: i64, skip: i64, limit: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM follows f INNER JOIN users u ON u.id = f.follower_id \
             WHERE f.followed_id = ? ORDER BY f.created_at DESC, f.id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS_U
        );
        self.list_users(&sql, user_id, skip, limit).await
    }

    async fn following(&self, user_id: i64, skip: i64, limit: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM follows f INNER JOIN users u ON u.id = f.followed_id \
             WHERE f.follower_id = ? ORDER BY f.created_at DESC, f.id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS_U
        );
        self.list_users(&sql, user_id, skip, limit).await
    }

    async fn block(&self, blocker_id: i64, blocked_id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            let mut tx = db.begin().await.context("Failed to begin transaction")?;

            sqlx::query("INSERT INTO blocks (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)")
                .bind(blocker_id)
                .bind(blocked_id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .context("Failed to create block")?;

            sqlx::query(
                "DELETE FROM follows WHERE (follower_id = ? AND followed_id = ?) OR (follower_id = ? AND followed_id = ?)",
            )
            .bind(blocker_id)
            .bind(blocked_id)
            .bind(blocked_id)
            .bind(blocker_id)
            .execute(&mut *tx)
            .await
            .context("Failed to remove follows")?;

            tx.commit().await.context("Failed to commit block")?;
        });
        Ok(())
    }

    async fn unblock(&self, blocker_id: i64, blocked_id: i64) -> Result<bool> {
        let deleted = with_pool!(self.pool, db => {
            sqlx::query("DELETE FROM blocks WHERE blocker_id = ? AND blocked_id = ?")
                .bind(blocker_id)
                .bind(blocked_id)
                .execute(db)
                .await
                .context("Failed to delete block")?
                .rows_affected()
        });
        Ok(deleted > 0)
    }

    async fn is_blocked(&self, blocker_id: i64, blocked_id: i64) -> Result<bool> {
        let n = self
            .count(
                "SELECT COUNT(*) AS n FROM blocks WHERE blocker_id = ? AND blocked_id = ?",
                blocker_id,
                blocked_id,
            )
            .await?;
        Ok(n > 0)
    }

    async fn is_blocked_either(&self, a: i64, b: i64) -> Result<bool> {
        Ok(self.is_blocked(a, b).await? || self.is_blocked(b, a).await?)
    }
}
