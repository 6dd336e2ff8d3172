//! User profiles
//!
//! Own profile edits, avatar uploads, public profiles with follower counts
//! and the follower/following listings. Profile stats are cached briefly;
//! anything that changes a count calls `invalidate_stats`.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{SocialRepository, UserRepository};
use crate::models::{User, UserStats};
use crate::services::auth::validate_username;
use crate::services::image::{ImageError, ImageKind, ImageService};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const BIO_MAX_LEN: usize = 500;

const STATS_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("{0}")]
    ValidationError(String),

    #[error("User not found")]
    NotFound,

    #[error("Username already taken")]
    UsernameTaken,

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Fields a user may change on their own profile; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub bio: Option<String>,
}

/// Profile as another user sees it
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub user: User,
    pub stats: UserStats,
    /// The viewer follows this user
    pub is_following: bool,
    /// The viewer has blocked this user
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user: User,
    pub stats: UserStats,
}

fn stats_key(user_id: i64) -> String {
    format!("user_stats:{}", user_id)
}

/// Drop cached stats for the given users. Cache failures are only logged.
pub async fn invalidate_stats(cache: &Cache, user_ids: &[i64]) {
    for id in user_ids {
        if let Err(e) = cache.delete(&stats_key(*id)).await {
            tracing::warn!("Failed to invalidate stats for user {}: {:#}", id, e);
        }
    }
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    social: Arc<dyn SocialRepository>,
    images: Arc<ImageService>,
    cache: Arc<Cache>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        social: Arc<dyn SocialRepository>,
        images: Arc<ImageService>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            users,
            social,
            images,
            cache,
        }
    }

    pub async fn get(&self, id: i64) -> Result<User, UserServiceError> {
        self.users
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound)
    }

    pub async fn update_profile(
        &self,
        user: &User,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let mut updated = user.clone();

        if let Some(username) = input.username {
            validate_username(&username)
                .map_err(|e| UserServiceError::ValidationError(e.to_string()))?;
            if username != user.username {
                let existing = self
                    .users
                    .get_by_username(&username)
                    .await
                    .context("Failed to check username")?;
                if existing.is_some_and(|u| u.id != user.id) {
                    return Err(UserServiceError::UsernameTaken);
                }
            }
            updated.username = username;
        }

        if let Some(bio) = input.bio {
            if bio.chars().count() > BIO_MAX_LEN {
                return Err(UserServiceError::ValidationError(format!(
                    "Bio must be at most {} characters",
                    BIO_MAX_LEN
                )));
            }
            updated.bio = Some(bio);
        }

        let saved = self
            .users
            .update(&updated)
            .await
            .context("Failed to update user")?;
        Ok(saved)
    }

    /// Store a new avatar and remove the previous file
    pub async fn update_profile_picture(
        &self,
        user: &User,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<User, UserServiceError> {
        let stored = self
            .images
            .save(ImageKind::ProfilePicture, filename, bytes)
            .await?;

        let previous = user.profile_picture.clone();
        let mut updated = user.clone();
        updated.profile_picture = Some(stored.public_path.clone());

        let saved = match self.users.update(&updated).await {
            Ok(saved) => saved,
            Err(e) => {
                self.images.delete(&stored.public_path).await;
                return Err(e.context("Failed to update profile picture").into());
            }
        };

        if let Some(old) = previous {
            self.images.delete(&old).await;
        }
        Ok(saved)
    }

    pub async fn stats(&self, user_id: i64) -> Result<UserStats, UserServiceError> {
        let key = stats_key(user_id);
        match self.cache.get::<UserStats>(&key).await {
            Ok(Some(stats)) => return Ok(stats),
            Ok(None) => {}
            Err(e) => tracing::warn!("Stats cache read failed: {:#}", e),
        }

        let stats = self
            .users
            .stats(user_id)
            .await
            .context("Failed to load user stats")?;

        if let Err(e) = self.cache.set(&key, &stats, STATS_TTL).await {
            tracing::warn!("Stats cache write failed: {:#}", e);
        }
        Ok(stats)
    }

    pub async fn public_profile(
        &self,
        viewer_id: i64,
        user_id: i64,
    ) -> Result<PublicProfile, UserServiceError> {
        let user = self.get(user_id).await?;
        let stats = self.stats(user_id).await?;
        let is_following = self
            .social
            .is_following(viewer_id, user_id)
            .await
            .context("Failed to check follow")?;
        let is_blocked = self
            .social
            .is_blocked(viewer_id, user_id)
            .await
            .context("Failed to check block")?;

        Ok(PublicProfile {
            user,
            stats,
            is_following,
            is_blocked,
        })
    }

    pub async fn followers(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<UserProfile>, UserServiceError> {
        let users = self
            .social
            .followers(user_id, skip, limit)
            .await
            .context("Failed to list followers")?;
        self.with_stats(users).await
    }

    pub async fn following(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<UserProfile>, UserServiceError> {
        let users = self
            .social
            .following(user_id, skip, limit)
            .await
            .context("Failed to list following")?;
        self.with_stats(users).await
    }

    async fn with_stats(&self, users: Vec<User>) -> Result<Vec<UserProfile>, UserServiceError> {
        let mut profiles = Vec::with_capacity(users.len());
        for user in users {
            let stats = self.stats(user.id).await?;
            profiles.push(UserProfile { user, stats });
        }
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::db::repositories::{SqlxSocialRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb};
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Harness {
        service: UserService,
        users: Arc<dyn UserRepository>,
        social: Arc<dyn SocialRepository>,
        cache: Arc<Cache>,
        _dir: TempDir,
    }

    async fn setup() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let dir = TempDir::new().unwrap();
        let images = Arc::new(ImageService::new(UploadConfig {
            root: dir.path().to_path_buf(),
            ..UploadConfig::default()
        }));
        let users = SqlxUserRepository::boxed(pool.clone());
        let social = SqlxSocialRepository::boxed(pool);
        let cache = Arc::new(Cache::memory());
        let service = UserService::new(users.clone(), social.clone(), images, cache.clone());
        Harness {
            service,
            users,
            social,
            cache,
            _dir: dir,
        }
    }

    async fn create_user(h: &Harness, name: &str) -> User {
        h.users
            .create(&User::new(name.into(), format!("{}@example.com", name), "hash".into()))
            .await
            .unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(8, 8, Rgb([1, 2, 3])));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageOutputFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let h = setup().await;
        assert!(matches!(h.service.get(999).await, Err(UserServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let h = setup().await;
        let alice = create_user(&h, "alice").await;

        let updated = h
            .service
            .update_profile(
                &alice,
                UpdateProfileInput {
                    username: Some("alice_new".into()),
                    bio: Some("Hello there".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.username, "alice_new");
        assert_eq!(updated.bio.as_deref(), Some("Hello there"));
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_profile_rejects_taken_username() {
        let h = setup().await;
        let alice = create_user(&h, "alice").await;
        create_user(&h, "bob").await;

        let result = h
            .service
            .update_profile(
                &alice,
                UpdateProfileInput {
                    username: Some("bob".into()),
                    bio: None,
                },
            )
            .await;
        assert!(matches!(result, Err(UserServiceError::UsernameTaken)));

        // Keeping your own name is fine
        let same = h
            .service
            .update_profile(
                &alice,
                UpdateProfileInput {
                    username: Some("alice".into()),
                    bio: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(same.username, "alice");
    }

    #[tokio::test]
    async fn test_update_profile_validates_bio() {
        let h = setup().await;
        let alice = create_user(&h, "alice").await;

        let result = h
            .service
            .update_profile(
                &alice,
                UpdateProfileInput {
                    username: None,
                    bio: Some("x".repeat(BIO_MAX_LEN + 1)),
                },
            )
            .await;
        assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_profile_picture_replaces_old_file() {
        let h = setup().await;
        let alice = create_user(&h, "alice").await;

        let first = h
            .service
            .update_profile_picture(&alice, "a.png", png_bytes())
            .await
            .unwrap();
        let first_path = first.profile_picture.clone().unwrap();
        let first_disk = h.service.images.config().disk_path(&first_path);
        assert!(first_path.starts_with("uploads/profiles/"));
        assert!(first_disk.exists());

        let second = h
            .service
            .update_profile_picture(&first, "b.png", png_bytes())
            .await
            .unwrap();

        assert_ne!(second.profile_picture, first.profile_picture);
        assert!(!first_disk.exists());
    }

    #[tokio::test]
    async fn test_profile_picture_rejects_bad_extension() {
        let h = setup().await;
        let alice = create_user(&h, "alice").await;

        let result = h
            .service
            .update_profile_picture(&alice, "a.txt", b"nope".to_vec())
            .await;
        assert!(matches!(
            result,
            Err(UserServiceError::Image(ImageError::InvalidType(_)))
        ));
    }

    #[tokio::test]
    async fn test_public_profile_flags() {
        let h = setup().await;
        let alice = create_user(&h, "alice").await;
        let bob = create_user(&h, "bob").await;

        h.social.follow(alice.id, bob.id).await.unwrap();
        let profile = h.service.public_profile(alice.id, bob.id).await.unwrap();
        assert!(profile.is_following);
        assert!(!profile.is_blocked);
        assert_eq!(profile.stats.followers_count, 1);

        // Seen from the other side the flags are independent
        let reverse = h.service.public_profile(bob.id, alice.id).await.unwrap();
        assert!(!reverse.is_following);
        assert_eq!(reverse.stats.following_count, 1);
    }

    #[tokio::test]
    async fn test_stats_are_cached_until_invalidated() {
        let h = setup().await;
        let alice = create_user(&h, "alice").await;
        let bob = create_user(&h, "bob").await;

        assert_eq!(h.service.stats(bob.id).await.unwrap().followers_count, 0);

        h.social.follow(alice.id, bob.id).await.unwrap();
        assert_eq!(h.service.stats(bob.id).await.unwrap().followers_count, 0);

        invalidate_stats(&h.cache, &[bob.id]).await;
        assert_eq!(h.service.stats(bob.id).await.unwrap().followers_count, 1);
    }

    #[tokio::test]
    async fn test_followers_and_following_lists() {
        let h = setup().await;
        let alice = create_user(&h, "alice").await;
        let bob = create_user(&h, "bob").await;
        let carol = create_user(&h, "carol").await;

        h.social.follow(bob.id, alice.id).await.unwrap();
        h.social.follow(carol.id, alice.id).await.unwrap();

        let followers = h.service.followers(alice.id, 0, 20).await.unwrap();
        let names: Vec<&str> = followers.iter().map(|p| p.user.username.as_str()).collect();
        assert_eq!(names, vec!["carol", "bob"]);
        assert_eq!(followers[0].stats.following_count, 1);

        let following = h.service.following(bob.id, 0, 20).await.unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].user.id, alice.id);

        assert!(h.service.followers(999, 0, 20).await.unwrap().is_empty());
    }
}
