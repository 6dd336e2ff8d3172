//! Comment API endpoints
//!
//! - POST /api/v1/photos/{photo_id}/comments - Comment on a photo
//! - GET /api/v1/photos/{photo_id}/comments - Threaded comments
//! - POST /api/v1/comments/{comment_id}/reply - Reply to a comment
//! - PUT /api/v1/comments/{comment_id} - Edit own comment
//! - DELETE /api/v1/comments/{comment_id} - Delete own comment and its replies

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{self, ApiError, AppState, AuthenticatedUser, MessageResponse};
use crate::api::responses::CommentResponse;
use crate::services::comment::CommentServiceError;

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

pub fn router(state: AppState) -> Router<AppState> {
    let rate_limited = Router::new()
        .route("/photos/{photo_id}/comments", post(create_comment))
        .route("/comments/{comment_id}/reply", post(reply_comment))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .route_layer(axum_middleware::from_fn(middleware::require_verified))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let verified = Router::new()
        .route(
            "/comments/{comment_id}",
            put(update_comment).delete(delete_comment),
        )
        .route_layer(axum_middleware::from_fn(middleware::require_verified))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .route("/photos/{photo_id}/comments", get(list_comments))
        .merge(rate_limited)
        .merge(verified)
}

fn comment_error(e: CommentServiceError) -> ApiError {
    match e {
        CommentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
        CommentServiceError::PhotoNotFound
        | CommentServiceError::ParentNotFound
        | CommentServiceError::NotFound => ApiError::not_found(e.to_string()),
        CommentServiceError::NotAuthorizedToUpdate | CommentServiceError::NotAuthorizedToDelete => {
            ApiError::forbidden(e.to_string())
        }
        CommentServiceError::InternalError(e) => ApiError::internal(e),
    }
}

/// POST /api/v1/photos/{photo_id}/comments
async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(photo_id): Path<i64>,
    Json(body): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .comment_service
        .create(user.0.id, photo_id, &body.content)
        .await
        .map_err(comment_error)?;
    Ok((StatusCode::CREATED, Json(CommentResponse::from(comment))))
}

/// GET /api/v1/photos/{photo_id}/comments
async fn list_comments(
    State(state): State<AppState>,
    Path(photo_id): Path<i64>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let threads = state
        .comment_service
        .list_for_photo(photo_id)
        .await
        .map_err(comment_error)?;
    Ok(Json(threads.into_iter().map(Into::into).collect()))
}

/// POST /api/v1/comments/{comment_id}/reply
async fn reply_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(comment_id): Path<i64>,
    Json(body): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = state
        .comment_service
        .reply(user.0.id, comment_id, &body.content)
        .await
        .map_err(comment_error)?;
    Ok((StatusCode::CREATED, Json(CommentResponse::from(reply))))
}

/// PUT /api/v1/comments/{comment_id}
async fn update_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(comment_id): Path<i64>,
    Json(body): Json<CommentRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    let comment = state
        .comment_service
        .update(user.0.id, comment_id, &body.content)
        .await
        .map_err(comment_error)?;
    Ok(Json(comment.into()))
}

/// DELETE /api/v1/comments/{comment_id}
async fn delete_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .comment_service
        .delete(user.0.id, comment_id)
        .await
        .map_err(comment_error)?;
    Ok(MessageResponse::new("Comment deleted successfully"))
}
