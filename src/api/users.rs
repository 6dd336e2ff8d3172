//! User API endpoints
//!
//! - GET /api/v1/users/me - Own account
//! - PUT /api/v1/users/me - Update username or bio
//! - POST /api/v1/users/me/profile-picture - Replace the profile picture
//! - GET /api/v1/users/{user_id} - Public profile with stats
//! - GET /api/v1/users/{user_id}/followers - Who follows a user
//! - GET /api/v1/users/{user_id}/following - Who a user follows

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{image_error, single_file, upload_body_limit, PaginationQuery};
use crate::api::middleware::{self, ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{PublicProfileResponse, UserProfileResponse, UserResponse};
use crate::services::user::{UpdateProfileInput, UserServiceError};

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub bio: Option<String>,
}

pub fn router(state: AppState) -> Router<AppState> {
    let verified = Router::new()
        .route("/me", axum::routing::put(update_me))
        .route("/me/profile-picture", post(upload_profile_picture))
        .layer(DefaultBodyLimit::max(upload_body_limit(&state.config.upload)))
        .route_layer(axum_middleware::from_fn(middleware::require_verified))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/me", get(get_me))
        .route("/{user_id}", get(get_profile))
        .route("/{user_id}/followers", get(followers))
        .route("/{user_id}/following", get(following))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ))
        .merge(verified)
}

fn user_error(e: UserServiceError) -> ApiError {
    match e {
        UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
        UserServiceError::NotFound => ApiError::not_found(e.to_string()),
        UserServiceError::UsernameTaken => ApiError::bad_request(e.to_string()),
        UserServiceError::Image(e) => image_error(e),
        UserServiceError::InternalError(e) => ApiError::internal(e),
    }
}

/// GET /api/v1/users/me
async fn get_me(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// PUT /api/v1/users/me
async fn update_me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state
        .user_service
        .update_profile(
            &user.0,
            UpdateProfileInput {
                username: body.username,
                bio: body.bio,
            },
        )
        .await
        .map_err(user_error)?;
    Ok(Json(updated.into()))
}

/// POST /api/v1/users/me/profile-picture
async fn upload_profile_picture(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<UserResponse>, ApiError> {
    let file = single_file(multipart).await?;
    let updated = state
        .user_service
        .update_profile_picture(&user.0, &file.file_name, file.bytes)
        .await
        .map_err(user_error)?;
    Ok(Json(updated.into()))
}

/// GET /api/v1/users/{user_id}
async fn get_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<Json<PublicProfileResponse>, ApiError> {
    let profile = state
        .user_service
        .public_profile(user.0.id, user_id)
        .await
        .map_err(user_error)?;
    Ok(Json(profile.into()))
}

/// GET /api/v1/users/{user_id}/followers
async fn followers(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<UserProfileResponse>>, ApiError> {
    let (skip, limit) = page.clamped();
    let profiles = state
        .user_service
        .followers(user_id, skip, limit)
        .await
        .map_err(user_error)?;
    Ok(Json(profiles.into_iter().map(Into::into).collect()))
}

/// GET /api/v1/users/{user_id}/following
async fn following(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<UserProfileResponse>>, ApiError> {
    let (skip, limit) = page.clamped();
    let profiles = state
        .user_service
        .following(user_id, skip, limit)
        .await
        .map_err(user_error)?;
    Ok(Json(profiles.into_iter().map(Into::into).collect()))
}
