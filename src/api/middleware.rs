//! API middleware
//!
//! Shared application state, the error body every handler returns, and the
//! request guards layered onto route groups:
//! - `require_auth`: Bearer access token resolving to an active user
//! - `require_verified`: the user has confirmed their email
//! - `rate_limit`: per-user request budget
//! - `optional_auth`: attaches the user when a valid token is present

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxChatRepository, SqlxCommentRepository, SqlxPhotoRepository,
    SqlxSocialRepository, SqlxUserRepository, SqlxVerificationRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    auth::AuthService,
    chat::{ChatHub, ChatService},
    comment::CommentService,
    image::ImageService,
    jobs::JobQueue,
    oauth::GoogleOAuth,
    photo::PhotoService,
    rate_limiter::RateLimiter,
    social::SocialService,
    token::{TokenError, TokenService, TokenType},
    user::UserService,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub user_repo: Arc<dyn UserRepository>,
    pub tokens: Arc<TokenService>,
    pub images: Arc<ImageService>,
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub photo_service: Arc<PhotoService>,
    pub comment_service: Arc<CommentService>,
    pub social_service: Arc<SocialService>,
    pub chat_service: Arc<ChatService>,
    pub oauth: Arc<GoogleOAuth>,
    pub cache: Arc<Cache>,
    pub rate_limiter: Arc<RateLimiter<i64>>,
}

impl AppState {
    /// Wire repositories and services over one pool and cache
    pub fn new(config: Config, pool: DynDatabasePool, cache: Arc<Cache>, jobs: JobQueue) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let social_repo = SqlxSocialRepository::boxed(pool.clone());
        let photo_repo = SqlxPhotoRepository::boxed(pool.clone());

        let tokens = Arc::new(TokenService::new(&config.auth));
        let images = Arc::new(ImageService::new(config.upload.clone()));

        let auth_service = Arc::new(AuthService::new(
            user_repo.clone(),
            SqlxVerificationRepository::boxed(pool.clone()),
            tokens.clone(),
            jobs,
            config.auth.clone(),
            config.app.frontend_url.clone(),
        ));
        let user_service = Arc::new(UserService::new(
            user_repo.clone(),
            social_repo.clone(),
            images.clone(),
            cache.clone(),
        ));
        let photo_service = Arc::new(PhotoService::new(
            photo_repo.clone(),
            SqlxCategoryRepository::boxed(pool.clone()),
            images.clone(),
            cache.clone(),
        ));
        let comment_service = Arc::new(CommentService::new(
            SqlxCommentRepository::boxed(pool.clone()),
            photo_repo,
        ));
        let social_service = Arc::new(SocialService::new(
            user_repo.clone(),
            social_repo.clone(),
            cache.clone(),
        ));
        let chat_service = Arc::new(ChatService::new(
            SqlxChatRepository::boxed(pool),
            user_repo.clone(),
            social_repo,
            ChatHub::new(),
        ));

        Self {
            oauth: Arc::new(GoogleOAuth::new(config.oauth.clone())),
            rate_limiter: Arc::new(RateLimiter::per_minute(config.auth.rate_limit_per_minute)),
            config: Arc::new(config),
            user_repo,
            tokens,
            images,
            auth_service,
            user_service,
            photo_service,
            comment_service,
            social_service,
            chat_service,
            cache,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// User attached by `optional_auth`, if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|u| u.id)
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new("PAYLOAD_TOO_LARGE", message)
    }

    pub fn rate_limited() -> Self {
        Self::new("RATE_LIMIT", "Too many requests. Please try again later.")
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and answer with a generic 500
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {:#}", cause);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "BAD_REQUEST" | "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Plain `{"message": ...}` body used by action endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve an access token to an active user
pub async fn resolve_user(state: &AppState, token: &str) -> Result<User, ApiError> {
    let user_id = state
        .tokens
        .verify(token, TokenType::Access)
        .map_err(|e| match e {
            TokenError::WrongType => ApiError::unauthorized("Invalid token type"),
            TokenError::InvalidPayload => ApiError::unauthorized("Invalid token payload"),
            _ => ApiError::unauthorized("Invalid authentication credentials"),
        })?;

    let user = state
        .user_repo
        .get_by_id(user_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    if !user.is_active {
        return Err(ApiError::forbidden("User account is inactive"));
    }
    Ok(user)
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?
        .to_string();

    let user = resolve_user(&state, &token).await?;
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware; bad tokens are treated as anonymous
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_bearer_token(request.headers()).map(str::to_string);
    if let Some(token) = token {
        if let Ok(user) = resolve_user(&state, &token).await {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
    }
    next.run(request).await
}

/// Must run inside `require_auth`
pub async fn require_verified(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    if !user.0.is_verified {
        return Err(ApiError::forbidden(
            "Email not verified. Please verify your email first.",
        ));
    }
    Ok(next.run(request).await)
}

/// Must run inside `require_auth`
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.id)
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    if !state.rate_limiter.check(&user_id).await {
        tracing::warn!("Rate limit exceeded for user {}", user_id);
        return Err(ApiError::rate_limited());
    }
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|u| u.0.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ApiError::bad_request("x"), StatusCode::BAD_REQUEST),
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (ApiError::payload_too_large("x"), StatusCode::PAYLOAD_TOO_LARGE),
            (ApiError::rate_limited(), StatusCode::TOO_MANY_REQUESTS),
            (ApiError::new("SOMETHING_ELSE", "x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "code {}", err.error.code);
        }
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ApiError::not_found("Photo not found")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "error": {"code": "NOT_FOUND", "message": "Photo not found", "details": null}
            })
        );
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def"));
    }
}
