//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account.
///
/// OAuth accounts have no password hash and are created already verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 hash; `None` for accounts that only sign in through OAuth
    #[serde(skip_serializing)]
    pub hashed_password: Option<String>,
    pub bio: Option<String>,
    /// Public upload path of the avatar
    pub profile_picture: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_oauth: bool,
    pub oauth_provider: Option<AuthProvider>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create an unverified password account.
    ///
    /// The password must already be hashed with `services::password::hash_password`.
    pub fn new(username: String, email: String, hashed_password: String) -> Self {
        Self {
            id: 0,
            username,
            email,
            hashed_password: Some(hashed_password),
            bio: None,
            profile_picture: None,
            is_active: true,
            is_verified: false,
            is_oauth: false,
            oauth_provider: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Create a verified account backed by an external identity provider
    pub fn new_oauth(username: String, email: String, provider: AuthProvider) -> Self {
        Self {
            id: 0,
            username,
            email,
            hashed_password: None,
            bio: None,
            profile_picture: None,
            is_active: true,
            is_verified: true,
            is_oauth: true,
            oauth_provider: Some(provider),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn has_password(&self) -> bool {
        self.hashed_password.is_some()
    }
}

/// External identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Google,
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthProvider::Google => write!(f, "google"),
        }
    }
}

impl FromStr for AuthProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(AuthProvider::Google),
            _ => Err(anyhow::anyhow!("Invalid auth provider: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("alice".into(), "alice@example.com".into(), "hash".into());
        assert_eq!(user.id, 0);
        assert!(user.is_active);
        assert!(!user.is_verified);
        assert!(!user.is_oauth);
        assert!(user.has_password());
    }

    #[test]
    fn test_new_oauth_user() {
        let user = User::new_oauth("bob".into(), "bob@example.com".into(), AuthProvider::Google);
        assert!(user.is_verified);
        assert!(user.is_oauth);
        assert!(!user.has_password());
        assert_eq!(user.oauth_provider, Some(AuthProvider::Google));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("carol".into(), "carol@example.com".into(), "secret-hash".into());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("hashed_password"));
    }

    #[test]
    fn test_auth_provider_roundtrip() {
        assert_eq!(AuthProvider::Google.to_string(), "google");
        assert_eq!("Google".parse::<AuthProvider>().unwrap(), AuthProvider::Google);
        assert!("github".parse::<AuthProvider>().is_err());
    }
}
