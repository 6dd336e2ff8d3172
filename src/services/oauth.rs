//! Google sign-in
//!
//! Authorization-code flow: build the consent URL, then trade the returned
//! code for an access token and read the OpenID userinfo endpoint.

use crate::config::OAuthConfig;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_SCOPE: &str = "openid email profile";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Google OAuth is not configured")]
    NotConfigured,

    #[error("{0}")]
    Provider(String),
}

/// Identity returned by Google
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleProfile {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl GoogleProfile {
    /// Display name, falling back to the local part of the email
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => self
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

pub struct GoogleOAuth {
    config: OAuthConfig,
    http: Client,
}

impl GoogleOAuth {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn credentials(&self) -> Result<(&str, &str), OAuthError> {
        match (&self.config.google_client_id, &self.config.google_client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Ok((id, secret)),
            _ => Err(OAuthError::NotConfigured),
        }
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let (client_id, _) = self.credentials()?;

        let mut url = Url::parse(GOOGLE_AUTHORIZE_URL)
            .map_err(|e| OAuthError::Provider(format!("Invalid authorize URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", &self.config.google_redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", GOOGLE_SCOPE)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<GoogleProfile, OAuthError> {
        let (client_id, client_secret) = self.credentials()?;

        let mut params = HashMap::new();
        params.insert("code", code);
        params.insert("client_id", client_id);
        params.insert("client_secret", client_secret);
        params.insert("redirect_uri", self.config.google_redirect_uri.as_str());
        params.insert("grant_type", "authorization_code");

        let token_resp = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::Provider(format!("Google token request failed: {}", e)))?;

        if !token_resp.status().is_success() {
            return Err(OAuthError::Provider(format!(
                "Google token request failed with status {}",
                token_resp.status()
            )));
        }

        let token: TokenResponse = token_resp.json().await.map_err(|e| {
            OAuthError::Provider(format!("Failed to parse Google token response: {}", e))
        })?;

        let user_resp = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| OAuthError::Provider(format!("Failed to fetch Google user info: {}", e)))?;

        if !user_resp.status().is_success() {
            return Err(OAuthError::Provider(format!(
                "Google userinfo failed with status {}",
                user_resp.status()
            )));
        }

        let info: UserInfo = user_resp.json().await.map_err(|e| {
            OAuthError::Provider(format!("Failed to parse Google user info: {}", e))
        })?;

        let email = info
            .email
            .ok_or_else(|| OAuthError::Provider("Failed to get user info from Google".into()))?;

        Ok(GoogleProfile {
            email,
            name: info.name,
            picture: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> GoogleOAuth {
        GoogleOAuth::new(OAuthConfig {
            google_client_id: Some("client-123".into()),
            google_client_secret: Some("secret".into()),
            ..OAuthConfig::default()
        })
    }

    #[test]
    fn test_authorize_url_contains_parameters() {
        let url = configured().authorize_url("xyz").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with(GOOGLE_AUTHORIZE_URL));
        assert_eq!(query["client_id"], "client-123");
        assert_eq!(query["scope"], "openid email profile");
        assert_eq!(query["state"], "xyz");
        assert_eq!(query["response_type"], "code");
        assert_eq!(
            query["redirect_uri"],
            "http://localhost:8000/api/v1/auth/google/callback"
        );
    }

    #[test]
    fn test_unconfigured_client_is_rejected() {
        let oauth = GoogleOAuth::new(OAuthConfig::default());
        assert!(!oauth.is_configured());
        assert!(matches!(oauth.authorize_url("s"), Err(OAuthError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_exchange_requires_configuration() {
        let oauth = GoogleOAuth::new(OAuthConfig::default());
        assert!(matches!(
            oauth.exchange_code("code").await,
            Err(OAuthError::NotConfigured)
        ));
    }

    #[test]
    fn test_display_name_fallback() {
        let named = GoogleProfile {
            email: "jane@example.com".into(),
            name: Some("Jane Doe".into()),
            picture: None,
        };
        let unnamed = GoogleProfile {
            name: Some("  ".into()),
            ..named.clone()
        };

        assert_eq!(named.display_name(), "Jane Doe");
        assert_eq!(unnamed.display_name(), "jane");
    }
}
