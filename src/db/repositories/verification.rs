//! Email verification codes and password reset tokens

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{EmailVerification, PasswordReset};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait VerificationRepository: Send + Sync {
    async fn create_email_verification(
        &self,
        user_id: i64,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<EmailVerification>;

    /// Unused, unexpired verification matching email and code
    async fn find_valid_email_verification(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EmailVerification>>;

    async fn mark_email_verification_used(&self, id: i64) -> Result<()>;

    async fn create_password_reset(
        &self,
        user_id: i64,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordReset>;

    /// Unused, unexpired reset with this token
    async fn find_valid_password_reset(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PasswordReset>>;

    async fn mark_password_reset_used(&self, id: i64) -> Result<()>;

    /// Drop used and expired rows; returns how many were removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxVerificationRepository {
    pool: DynDatabasePool,
}

impl SqlxVerificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn VerificationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl VerificationRepository for SqlxVerificationRepository {
    async fn create_email_verification(
        &self,
        user_id: i64,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<EmailVerification> {
        let created_at = Utc::now();
        let id = with_pool!(self.pool, db => {
            sqlx::query(
                "INSERT INTO email_verifications (user_id, email, code, is_used, expires_at, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(email)
            .bind(code)
            .bind(false)
            .bind(expires_at)
            .bind(created_at)
            .execute(db)
            .await
            .context("Failed to create email verification")?
            .inserted_id()
        });

        Ok(EmailVerification {
            id,
            user_id,
            email: email.to_string(),
            code: code.to_string(),
            is_used: false,
            expires_at,
            created_at,
        })
    }

    async fn find_valid_email_verification(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EmailVerification>> {
        let found = with_pool!(self.pool, db => {
            sqlx::query(
                r#"
                SELECT id, user_id, email, code, is_used, expires_at, created_at
                FROM email_verifications
                WHERE email = ? AND code = ? AND is_used = ? AND expires_at > ?
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                "#,
            )
            .bind(email)
            .bind(code)
            .bind(false)
            .bind(now)
            .fetch_optional(db)
            .await
            .context("Failed to look up email verification")?
            .map(|row| EmailVerification {
                id: row.get("id"),
                user_id: row.get("user_id"),
                email: row.get("email"),
                code: row.get("code"),
                is_used: row.get("is_used"),
                expires_at: row.get("expires_at"),
                created_at: row.get("created_at"),
            })
        });
        Ok(found)
    }

    async fn mark_email_verification_used(&self, id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("UPDATE email_verifications SET is_used = ? WHERE id = ?")
                .bind(true)
                .bind(id)
                .execute(db)
                .await
                .context("Failed to mark verification used")?;
        });
        Ok(())
    }

    async fn create_password_reset(
        &self,
        user_id: i64,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordReset> {
        let created_at = Utc::now();
        let id = with_pool!(self.pool, db => {
            sqlx::query(
                "INSERT INTO password_resets (user_id, email, token, is_used, expires_at, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(email)
            .bind(token)
            .bind(false)
            .bind(expires_at)
            .bind(created_at)
            .execute(db)
            .await
            .context("Failed to create password reset")?
            .inserted_id()
        });

        Ok(PasswordReset {
            id,
            user_id,
            email: email.to_string(),
            token: token.to_string(),
            is_used: false,
            expires_at,
            created_at,
        })
    }

    async fn find_valid_password_reset(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PasswordReset>> {
        let found = with_pool!(self.pool, db => {
            sqlx::query(
                r#"
                SELECT id, user_id, email, token, is_used, expires_at, created_at
                FROM password_resets
                WHERE token = ? AND is_used = ? AND expires_at > ?
                "#,
            )
            .bind(token)
            .bind(false)
            .bind(now)
            .fetch_optional(db)
            .await
            .context("Failed to look up password reset")?
            .map(|row| PasswordReset {
                id: row.get("id"),
                user_id: row.get("user_id"),
                email: row.get("email"),
                token: row.get("token"),
                is_used: row.get("is_used"),
                expires_at: row.get("expires_at"),
                created_at: row.get("created_at"),
            })
        });
        Ok(found)
    }

    async fn mark_password_reset_used(&self, id: i64) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("UPDATE password_resets SET is_used = ? WHERE id = ?")
                .bind(true)
                .bind(id)
                .execute(db)
                .await
                .context("Failed to mark password reset used")?;
        });
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = with_pool!(self.pool, db => {
            let codes = sqlx::query("DELETE FROM email_verifications WHERE is_used = ? OR expires_at <= ?")
                .bind(true)
                .bind(now)
                .execute(db)
                .await
                .context("Failed to purge email verifications")?
                .rows_affected();
            let resets = sqlx::query("DELETE FROM password_resets WHERE is_used = ? OR expires_at <= ?")
                .bind(true)
                .bind(now)
                .execute(db)
                .await
                .context("Failed to purge password resets")?
                .rows_affected();
            codes + resets
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use chrono::Duration;

    async fn setup() -> (SqlxVerificationRepository, User) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let user = users
            .create(&User::new("alice".into(), "alice@example.com".into(), "h".into()))
            .await
            .unwrap();
        (SqlxVerificationRepository::new(pool), user)
    }

    #[tokio::test]
    async fn test_valid_code_is_found() {
        let (repo, user) = setup().await;
        let expires = Utc::now() + Duration::minutes(15);
        repo.create_email_verification(user.id, &user.email, "123456", expires)
            .await
            .unwrap();

        let found = repo
            .find_valid_email_verification(&user.email, "123456", Utc::now())
            .await
            .unwrap();

        assert_eq!(found.map(|v| v.user_id), Some(user.id));
    }

    #[tokio::test]
    async fn test_wrong_or_expired_code_is_not_found() {
        let (repo, user) = setup().await;
        let expires = Utc::now() + Duration::minutes(15);
        repo.create_email_verification(user.id, &user.email, "123456", expires)
            .await
            .unwrap();

        let wrong = repo
            .find_valid_email_verification(&user.email, "654321", Utc::now())
            .await
            .unwrap();
        assert!(wrong.is_none());

        let later = Utc::now() + Duration::minutes(16);
        let expired = repo
            .find_valid_email_verification(&user.email, "123456", later)
            .await
            .unwrap();
        assert!(expired.is_none());
    }

    #[tokio::test]
    async fn test_used_code_is_not_found() {
        let (repo, user) = setup().await;
        let v = repo
            .create_email_verification(user.id, &user.email, "111111", Utc::now() + Duration::minutes(5))
            .await
            .unwrap();

        repo.mark_email_verification_used(v.id).await.unwrap();

        let found = repo
            .find_valid_email_verification(&user.email, "111111", Utc::now())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_password_reset_lifecycle() {
        let (repo, user) = setup().await;
        let reset = repo
            .create_password_reset(user.id, &user.email, "tok", Utc::now() + Duration::minutes(30))
            .await
            .unwrap();

        let found = repo.find_valid_password_reset("tok", Utc::now()).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(reset.id));

        repo.mark_password_reset_used(reset.id).await.unwrap();
        assert!(repo.find_valid_password_reset("tok", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (repo, user) = setup().await;
        repo.create_email_verification(user.id, &user.email, "000001", Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        repo.create_email_verification(user.id, &user.email, "000002", Utc::now() + Duration::minutes(10))
            .await
            .unwrap();
        repo.create_password_reset(user.id, &user.email, "old", Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        let removed = repo.purge_expired(Utc::now()).await.unwrap();

        assert_eq!(removed, 2);
        assert!(repo
            .find_valid_email_verification(&user.email, "000002", Utc::now())
            .await
            .unwrap()
            .is_some());
    }
}
