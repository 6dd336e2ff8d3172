//! JWT access/refresh tokens and one-time secrets
//!
//! Tokens are HS256 signed with the configured secret key. The subject is
//! the user id as a string and a `type` claim separates access tokens
//! from refresh tokens.

use crate::config::AuthConfig;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Bad signature, malformed or expired
    #[error("Invalid token")]
    Invalid,

    #[error("Invalid token type")]
    WrongType,

    #[error("Invalid token payload")]
    InvalidPayload,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expire_days),
        }
    }

    pub fn create_access_token(&self, user_id: i64) -> Result<String, TokenError> {
        self.sign(user_id, TokenType::Access, self.access_ttl)
    }

    pub fn create_refresh_token(&self, user_id: i64) -> Result<String, TokenError> {
        self.sign(user_id, TokenType::Refresh, self.refresh_ttl)
    }

    pub fn create_pair(&self, user_id: i64) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.create_access_token(user_id)?,
            refresh_token: self.create_refresh_token(user_id)?,
            token_type: "bearer".to_string(),
        })
    }

    fn sign(&self, user_id: i64, token_type: TokenType, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            token_type,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Check signature and expiry
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Rejected token: {}", e);
                TokenError::Invalid
            })
    }

    /// Decode, require `expected` type, and return the user id
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<i64, TokenError> {
        let claims = self.decode(token)?;
        if claims.token_type != expected {
            return Err(TokenError::WrongType);
        }
        claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::InvalidPayload)
    }
}

/// Six decimal digits, zero padded
pub fn generate_verification_code() -> String {
    format!("{:06}", OsRng.next_u32() % 1_000_000)
}

/// 32 random bytes, url-safe base64 without padding
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    BASE64URL_NOPAD.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig::default())
    }

    #[test]
    fn test_access_token_roundtrip() {
        let tokens = service();
        let token = tokens.create_access_token(42).unwrap();

        assert_eq!(tokens.verify(&token, TokenType::Access), Ok(42));
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let tokens = service();
        let refresh = tokens.create_refresh_token(7).unwrap();

        assert_eq!(tokens.verify(&refresh, TokenType::Access), Err(TokenError::WrongType));
        assert_eq!(tokens.verify(&refresh, TokenType::Refresh), Ok(7));
    }

    #[test]
    fn test_pair_uses_bearer_type() {
        let pair = service().create_pair(1).unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let tokens = service();
        let mut token = tokens.create_access_token(1).unwrap();
        token.push('x');

        assert_eq!(tokens.verify(&token, TokenType::Access), Err(TokenError::Invalid));
        assert_eq!(tokens.verify("garbage", TokenType::Access), Err(TokenError::Invalid));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let other = TokenService::new(&AuthConfig {
            secret_key: "another-secret".into(),
            ..AuthConfig::default()
        });
        let token = other.create_access_token(1).unwrap();

        assert_eq!(service().verify(&token, TokenType::Access), Err(TokenError::Invalid));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = service();
        let token = tokens
            .sign(1, TokenType::Access, Duration::minutes(-10))
            .unwrap();

        assert_eq!(tokens.decode(&token).map(|c| c.sub), Err(TokenError::Invalid));
    }

    #[test]
    fn test_non_numeric_subject_rejected() {
        let tokens = service();
        let claims = Claims {
            sub: "not-a-number".into(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            token_type: TokenType::Access,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &tokens.encoding_key).unwrap();

        assert_eq!(tokens.verify(&token, TokenType::Access), Err(TokenError::InvalidPayload));
    }

    #[test]
    fn test_verification_code_format() {
        for _ in 0..50 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_reset_token_is_urlsafe() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_reset_token());
    }
}
