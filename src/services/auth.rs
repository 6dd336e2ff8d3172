//! Account lifecycle
//!
//! Registration with emailed verification codes, password login, token
//! refresh, password reset links and Google sign-in. Mail is handed to the
//! job queue and never awaited here.

use crate::config::AuthConfig;
use crate::db::repositories::{UserRepository, VerificationRepository};
use crate::models::{AuthProvider, User};
use crate::services::jobs::{Job, JobQueue};
use crate::services::oauth::GoogleProfile;
use crate::services::password::{hash_password, verify_password};
use crate::services::token::{
    generate_reset_token, generate_verification_code, TokenError, TokenPair, TokenService,
    TokenType,
};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Invalid or expired verification code")]
    InvalidVerificationCode,

    #[error("User not found")]
    UserNotFound,

    #[error("Email already verified")]
    AlreadyVerified,

    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Invalid user")]
    InvalidUser,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TokenError> for AuthServiceError {
    fn from(e: TokenError) -> Self {
        AuthServiceError::InternalError(anyhow::anyhow!(e))
    }
}

/// 3 to 50 characters of letters, digits, `_` and `-`
pub fn validate_username(username: &str) -> Result<(), AuthServiceError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AuthServiceError::ValidationError(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AuthServiceError::ValidationError(
            "Username can only contain letters, numbers, underscores and hyphens".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), AuthServiceError> {
    let invalid = || AuthServiceError::ValidationError("Invalid email format".to_string());

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AuthServiceError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AuthServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        )));
    }
    Ok(())
}

/// Username derived from a display name: lowercase, spaces as underscores
fn base_username(display_name: &str) -> String {
    let base: String = display_name
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .take(USERNAME_MAX_LEN - 5)
        .collect();
    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    verifications: Arc<dyn VerificationRepository>,
    tokens: Arc<TokenService>,
    jobs: JobQueue,
    config: AuthConfig,
    frontend_url: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        verifications: Arc<dyn VerificationRepository>,
        tokens: Arc<TokenService>,
        jobs: JobQueue,
        config: AuthConfig,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            verifications,
            tokens,
            jobs,
            config,
            frontend_url: frontend_url.into(),
        }
    }

    /// Create an unverified account and mail it a verification code
    pub async fn register(&self, input: RegisterInput) -> Result<User, AuthServiceError> {
        validate_username(&input.username)?;
        validate_email(&input.email)?;
        validate_password(&input.password)?;

        if self
            .users
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(AuthServiceError::EmailTaken);
        }
        if self
            .users
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(AuthServiceError::UsernameTaken);
        }

        let hashed = hash_password(&input.password)?;
        let user = self
            .users
            .create(&User::new(input.username, input.email, hashed))
            .await
            .context("Failed to create user")?;

        self.issue_verification_code(&user).await?;
        tracing::info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    async fn issue_verification_code(&self, user: &User) -> Result<(), AuthServiceError> {
        let code = generate_verification_code();
        let expires_at = Utc::now() + Duration::minutes(self.config.verification_code_expire_minutes);
        self.verifications
            .create_email_verification(user.id, &user.email, &code, expires_at)
            .await
            .context("Failed to store verification code")?;

        self.jobs.enqueue(Job::SendVerificationEmail {
            email: user.email.clone(),
            username: user.username.clone(),
            code,
        });
        Ok(())
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> Result<User, AuthServiceError> {
        let verification = self
            .verifications
            .find_valid_email_verification(email, code, Utc::now())
            .await
            .context("Failed to look up verification code")?
            .ok_or(AuthServiceError::InvalidVerificationCode)?;

        self.verifications
            .mark_email_verification_used(verification.id)
            .await
            .context("Failed to consume verification code")?;
        self.users
            .mark_verified(verification.user_id)
            .await
            .context("Failed to mark user verified")?;

        let user = self
            .users
            .get_by_id(verification.user_id)
            .await
            .context("Failed to load user")?
            .ok_or(AuthServiceError::UserNotFound)?;

        self.jobs.enqueue(Job::SendWelcomeEmail {
            email: user.email.clone(),
            username: user.username.clone(),
        });
        Ok(user)
    }

    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthServiceError> {
        let user = self
            .users
            .get_by_email(email)
            .await
            .context("Failed to load user")?
            .ok_or(AuthServiceError::UserNotFound)?;

        if user.is_verified {
            return Err(AuthServiceError::AlreadyVerified);
        }
        self.issue_verification_code(&user).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthServiceError> {
        let user = self
            .users
            .get_by_email(email)
            .await
            .context("Failed to load user")?
            .ok_or(AuthServiceError::InvalidCredentials)?;

        // OAuth-only accounts have no password to check
        let hash = user
            .hashed_password
            .as_deref()
            .ok_or(AuthServiceError::InvalidCredentials)?;
        if !verify_password(password, hash)? {
            return Err(AuthServiceError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthServiceError::AccountInactive);
        }

        Ok(self.tokens.create_pair(user.id)?)
    }

    /// New access token for a valid refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthServiceError> {
        let user_id = self
            .tokens
            .verify(refresh_token, TokenType::Refresh)
            .map_err(|_| AuthServiceError::InvalidRefreshToken)?;

        let user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to load user")?
            .filter(|u| u.is_active)
            .ok_or(AuthServiceError::InvalidUser)?;

        Ok(self.tokens.create_access_token(user.id)?)
    }

    /// Unknown emails succeed silently so accounts can't be probed
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthServiceError> {
        let Some(user) = self
            .users
            .get_by_email(email)
            .await
            .context("Failed to load user")?
        else {
            return Ok(());
        };

        let token = generate_reset_token();
        let expires_at = Utc::now() + Duration::minutes(self.config.password_reset_expire_minutes);
        self.verifications
            .create_password_reset(user.id, &user.email, &token, expires_at)
            .await
            .context("Failed to store reset token")?;

        let reset_link = format!(
            "{}/reset-password?token={}",
            self.frontend_url.trim_end_matches('/'),
            token
        );
        self.jobs.enqueue(Job::SendPasswordResetEmail {
            email: user.email,
            username: user.username,
            reset_link,
        });
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthServiceError> {
        validate_password(new_password)?;

        let reset = self
            .verifications
            .find_valid_password_reset(token, Utc::now())
            .await
            .context("Failed to look up reset token")?
            .ok_or(AuthServiceError::InvalidResetToken)?;

        let hashed = hash_password(new_password)?;
        self.users
            .set_password(reset.user_id, &hashed)
            .await
            .context("Failed to update password")?;
        self.verifications
            .mark_password_reset_used(reset.id)
            .await
            .context("Failed to consume reset token")?;

        tracing::info!("Password reset for user {}", reset.user_id);
        Ok(())
    }

    /// Find or create the account for a Google identity and issue tokens
    pub async fn login_with_google(
        &self,
        profile: &GoogleProfile,
    ) -> Result<(User, TokenPair), AuthServiceError> {
        let existing = self
            .users
            .get_by_email(&profile.email)
            .await
            .context("Failed to load user")?;

        let user = match existing {
            Some(user) => user,
            None => {
                let username = self.unique_username(&profile.display_name()).await?;
                let user = self
                    .users
                    .create(&User::new_oauth(
                        username,
                        profile.email.clone(),
                        AuthProvider::Google,
                    ))
                    .await
                    .context("Failed to create OAuth user")?;
                tracing::info!("Created Google account {} ({})", user.username, user.id);
                user
            }
        };

        let tokens = self.tokens.create_pair(user.id)?;
        Ok((user, tokens))
    }

    /// `name`, then `name1`, `name2`, ... until one is free
    async fn unique_username(&self, display_name: &str) -> Result<String, AuthServiceError> {
        let base = base_username(display_name);
        let mut candidate = base.clone();
        let mut counter = 1;
        while self
            .users
            .get_by_username(&candidate)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            candidate = format!("{}{}", base, counter);
            counter += 1;
        }
        Ok(candidate)
    }
}
