//! User repository
//!
//! Account rows plus the profile counters derived from photos and follows.

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{User, UserStats};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, hashed_password, bio, profile_picture, \
     is_active, is_verified, is_oauth, oauth_provider, created_at, updated_at";

macro_rules! user_from_row {
    ($row:expr) => {
        User {
            id: $row.get("id"),
            username: $row.get("username"),
            email: $row.get("email"),
            hashed_password: $row.get("hashed_password"),
            bio: $row.get("bio"),
            profile_picture: $row.get("profile_picture"),
            is_active: $row.get("is_active"),
            is_verified: $row.get("is_verified"),
            is_oauth: $row.get("is_oauth"),
            oauth_provider: $row
                .get::<Option<String>, _>("oauth_provider")
                .and_then(|p| p.parse().ok()),
            created_at: $row.get("created_at"),
            updated_at: $row.get("updated_at"),
        }
    };
}
pub(crate) use user_from_row;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist username, bio, picture, flags and password hash
    async fn update(&self, user: &User) -> Result<User>;

    async fn mark_verified(&self, id: i64) -> Result<()>;

    async fn set_password(&self, id: i64, hashed_password: &str) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Follower, following and photo counts
    async fn stats(&self, id: i64) -> Result<UserStats>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let user = with_pool!(self.pool, db => {
            sqlx::query(&sql)
                .bind(value)
                .fetch_optional(db)
                .await
                .with_context(|| format!("Failed to get user by {}", column))?
                .map(|row| user_from_row!(row))
        });
        Ok(user)
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let id = with_pool!(self.pool, db => {
            sqlx::query(
                r#"
                INSERT INTO users (username, email, hashed_password, bio, profile_picture,
                                   is_active, is_verified, is_oauth, oauth_provider, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.hashed_password)
            .bind(&user.bio)
            .bind(&user.profile_picture)
            .bind(user.is_active)
            .bind(user.is_verified)
            .bind(user.is_oauth)
            .bind(user.oauth_provider.map(|p| p.to_string()))
            .bind(user.created_at)
            .execute(db)
            .await
            .context("Failed to create user")?
            .inserted_id()
        });

        self.get_by_id(id)
            .await?
            .context("User not found after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let user = with_pool!(self.pool, db => {
            sqlx::query(&sql)
                .bind(id)
                .fetch_optional(db)
                .await
                .context("Failed to get user by id")?
                .map(|row| user_from_row!(row))
        });
        Ok(user)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email).await
    }

    async fn update(&self, user: &User) -> Result<User> {
        with_pool!(self.pool, db => {
            sqlx::query(
                r#"
                UPDATE users
                SET username = ?, bio = ?, profile_picture = ?, hashed_password = ?,
                    is_active = ?, is_verified = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.username)
            .bind(&user.bio)
            .bind(&user.profile_picture)
            .bind(&user.hashed_password)
            .bind(user.is_active)
            .bind(user.is_verified)
            .bind(Utc::now())
            .bind(user.id)
            .execute(db)
            .await
            .context("Failed to update user")?;
        });

        self.get_by_id(user.id)
            .await?
            .context("User not found after update")
    }

    async fn mark_verified(&self, id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("UPDATE users SET is_verified = ?, updated_at = ? WHERE id = ?")
                .bind(true)
                .bind(Utc::now())
                .bind(id)
                .execute(db)
                .await
                .context("Failed to mark user verified")?;
        });
        Ok(())
    }

    async fn set_password(&self, id: i64, hashed_password: &str) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("UPDATE users SET hashed_password = ?, updated_at = ? WHERE id = ?")
                .bind(hashed_password)
                .bind(Utc::now())
                .bind(id)
                .execute(db)
                .await
                .context("Failed to update password")?;
        });
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id)
                .execute(db)
                .await
                .context("Failed to delete user")?;
        });
        Ok(())
    }

    async fn stats(&self, id: i64) -> Result<UserStats> {
        let stats = with_pool!(self.pool, db => {
            let row = sqlx::query(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM follows WHERE followed_id = ?) AS followers_count,
                    (SELECT COUNT(*) FROM follows WHERE follower_id = ?) AS following_count,
                    (SELECT COUNT(*) FROM photos WHERE owner_id = ?) AS photos_count
                "#,
            )
            .bind(id)
            .bind(id)
            .bind(id)
            .fetch_one(db)
            .await
            .context("Failed to load user stats")?;

            UserStats {
                followers_count: row.get("followers_count"),
                following_count: row.get("following_count"),
                photos_count: row.get("photos_count"),
            }
        });
        Ok(stats)
    }
}
