//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Create an unverified account
//! - POST /api/v1/auth/verify-email - Confirm the emailed code
//! - POST /api/v1/auth/resend-verification - Mail a fresh code
//! - POST /api/v1/auth/login - Exchange credentials for tokens
//! - POST /api/v1/auth/refresh - New access token from a refresh token
//! - POST /api/v1/auth/forgot-password - Mail a reset link
//! - POST /api/v1/auth/reset-password - Set a new password
//! - GET /api/v1/auth/google - Start Google sign-in
//! - GET /api/v1/auth/google/callback - Finish Google sign-in
//! - GET /api/v1/auth/test-auth - Echo the authenticated user

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::middleware::{self, ApiError, AppState, AuthenticatedUser, MessageResponse};
use crate::cache::CacheLayer;
use crate::services::auth::{AuthServiceError, RegisterInput};
use crate::services::token::generate_reset_token;

const OAUTH_STATE_TTL: Duration = Duration::from_secs(600);
const VERIFICATION_CODE_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmailMessageResponse {
    pub message: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TestAuthResponse {
    pub message: &'static str,
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
}

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/test-auth", get(test_auth))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .route("/register", post(register))
        .route("/verify-email", post(verify_email))
        .route("/resend-verification", post(resend_verification))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/google", get(google_login))
        .route("/google/callback", get(google_callback))
        .merge(protected)
}

fn auth_error(e: AuthServiceError) -> ApiError {
    match e {
        AuthServiceError::ValidationError(msg) => ApiError::validation_error(msg),
        AuthServiceError::EmailTaken
        | AuthServiceError::UsernameTaken
        | AuthServiceError::InvalidVerificationCode
        | AuthServiceError::AlreadyVerified
        | AuthServiceError::InvalidResetToken => ApiError::bad_request(e.to_string()),
        AuthServiceError::UserNotFound => ApiError::not_found(e.to_string()),
        AuthServiceError::InvalidCredentials
        | AuthServiceError::InvalidRefreshToken
        | AuthServiceError::InvalidUser => ApiError::unauthorized(e.to_string()),
        AuthServiceError::AccountInactive => ApiError::forbidden(e.to_string()),
        AuthServiceError::InternalError(e) => ApiError::internal(e),
    }
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .auth_service
        .register(RegisterInput::new(body.username, body.email, body.password))
        .await
        .map_err(auth_error)?;

    Ok((
        StatusCode::CREATED,
        Json(EmailMessageResponse {
            message: "Registration successful. Please check your email for verification code."
                .to_string(),
            email: user.email,
        }),
    ))
}

/// POST /api/v1/auth/verify-email
async fn verify_email(
    State(state): State<AppState>,
    Json(body): Json<VerifyEmailRequest>,
) -> Result<Json<EmailMessageResponse>, ApiError> {
    if body.code.chars().count() != VERIFICATION_CODE_LEN {
        return Err(ApiError::validation_error(format!(
            "Verification code must be {} characters",
            VERIFICATION_CODE_LEN
        )));
    }

    let user = state
        .auth_service
        .verify_email(&body.email, &body.code)
        .await
        .map_err(auth_error)?;

    Ok(Json(EmailMessageResponse {
        message: "Email verified successfully! You can now login.".to_string(),
        email: user.email,
    }))
}

/// POST /api/v1/auth/resend-verification
async fn resend_verification(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .auth_service
        .resend_verification(&body.email)
        .await
        .map_err(auth_error)?;
    Ok(MessageResponse::new("Verification code sent"))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state
        .auth_service
        .login(&body.email, &body.password)
        .await
        .map_err(auth_error)?;
    Ok(Json(tokens))
}

/// POST /api/v1/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let access_token = state
        .auth_service
        .refresh(&body.refresh_token)
        .await
        .map_err(auth_error)?;
    Ok(Json(AccessTokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

/// POST /api/v1/auth/forgot-password
///
/// Answers the same way whether or not the address is registered.
async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .auth_service
        .forgot_password(&body.email)
        .await
        .map_err(auth_error)?;
    Ok(MessageResponse::new(
        "If the email exists, a password reset link has been sent",
    ))
}

/// POST /api/v1/auth/reset-password
async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .auth_service
        .reset_password(&body.token, &body.new_password)
        .await
        .map_err(auth_error)?;
    Ok(MessageResponse::new("Password reset successful"))
}

fn oauth_state_key(oauth_state: &str) -> String {
    format!("oauth_state:{}", oauth_state)
}

fn oauth_failure(reason: impl std::fmt::Display) -> ApiError {
    tracing::warn!("Google sign-in failed: {}", reason);
    ApiError::bad_request(format!("OAuth authentication failed: {}", reason))
}

/// GET /api/v1/auth/google
async fn google_login(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let oauth_state = generate_reset_token();
    let url = state.oauth.authorize_url(&oauth_state).map_err(oauth_failure)?;

    state
        .cache
        .set(&oauth_state_key(&oauth_state), &true, OAUTH_STATE_TTL)
        .await
        .map_err(ApiError::internal)?;

    Ok(Redirect::temporary(&url))
}

/// GET /api/v1/auth/google/callback
async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<Redirect, ApiError> {
    if let Some(error) = query.error {
        return Err(oauth_failure(error));
    }

    let oauth_state = query.state.ok_or_else(|| oauth_failure("Missing state"))?;
    let key = oauth_state_key(&oauth_state);
    let known = state
        .cache
        .get::<bool>(&key)
        .await
        .map_err(ApiError::internal)?
        .unwrap_or(false);
    if !known {
        return Err(oauth_failure("Invalid state"));
    }
    if let Err(e) = state.cache.delete(&key).await {
        tracing::warn!("Failed to drop OAuth state: {:#}", e);
    }

    let code = query
        .code
        .ok_or_else(|| oauth_failure("Missing authorization code"))?;
    let profile = state.oauth.exchange_code(&code).await.map_err(oauth_failure)?;
    let (user, tokens) = state
        .auth_service
        .login_with_google(&profile)
        .await
        .map_err(oauth_failure)?;
    tracing::info!("User {} signed in with Google", user.id);

    let mut url = Url::parse(&format!(
        "{}/auth/callback",
        state.config.app.frontend_url.trim_end_matches('/')
    ))
    .map_err(oauth_failure)?;
    url.query_pairs_mut()
        .append_pair("access_token", &tokens.access_token)
        .append_pair("refresh_token", &tokens.refresh_token);

    Ok(Redirect::temporary(url.as_str()))
}

/// GET /api/v1/auth/test-auth
async fn test_auth(user: AuthenticatedUser) -> Json<TestAuthResponse> {
    let user = user.0;
    Json(TestAuthResponse {
        message: "Authentication successful!",
        user_id: user.id,
        username: user.username,
        email: user.email,
        is_verified: user.is_verified,
    })
}
