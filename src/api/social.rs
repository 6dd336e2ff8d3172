//! Follow and block endpoints
//!
//! - POST/DELETE /api/v1/social/follow/{user_id}
//! - POST/DELETE /api/v1/social/block/{user_id}

use axum::{
    extract::{Path, State},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::post,
    Router,
};

use crate::api::middleware::{self, ApiError, AppState, AuthenticatedUser, MessageResponse};
use crate::services::social::SocialServiceError;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/follow/{user_id}", post(follow).delete(unfollow))
        .route("/block/{user_id}", post(block).delete(unblock))
        .route_layer(axum_middleware::from_fn(middleware::require_verified))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ))
}

fn social_error(e: SocialServiceError) -> ApiError {
    match e {
        SocialServiceError::CannotFollowSelf
        | SocialServiceError::CannotBlockSelf
        | SocialServiceError::AlreadyFollowing
        | SocialServiceError::Blocked
        | SocialServiceError::AlreadyBlocked => ApiError::bad_request(e.to_string()),
        SocialServiceError::UserNotFound
        | SocialServiceError::NotFollowing
        | SocialServiceError::NotBlocked => ApiError::not_found(e.to_string()),
        SocialServiceError::InternalError(e) => ApiError::internal(e),
    }
}

/// POST /api/v1/social/follow/{user_id}
async fn follow(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .social_service
        .follow(user.0.id, user_id)
        .await
        .map_err(social_error)?;
    Ok(MessageResponse::new("User followed successfully"))
}

/// DELETE /api/v1/social/follow/{user_id}
async fn unfollow(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .social_service
        .unfollow(user.0.id, user_id)
        .await
        .map_err(social_error)?;
    Ok(MessageResponse::new("User unfollowed successfully"))
}

/// POST /api/v1/social/block/{user_id}
async fn block(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .social_service
        .block(user.0.id, user_id)
        .await
        .map_err(social_error)?;
    Ok(MessageResponse::new("User blocked successfully"))
}

/// DELETE /api/v1/social/block/{user_id}
async fn unblock(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .social_service
        .unblock(user.0.id, user_id)
        .await
        .map_err(social_error)?;
    Ok(MessageResponse::new("User unblocked successfully"))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::test_app;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_follow_cycle() {
        let app = test_app().await;
        let (_, alice_token) = app.user("alice", true).await;
        let (bob, _) = app.user("bob", true).await;
        let path = format!("/api/v1/social/follow/{}", bob.id);

        let response = app.server.post(&path).authorization_bearer(&alice_token).await;
        response.assert_status_ok();
        response.assert_json(&json!({"message": "User followed successfully"}));

        let response = app.server.post(&path).authorization_bearer(&alice_token).await;
        response.assert_status_bad_request();
        assert_eq!(
            response.json::<Value>()["error"]["message"],
            "Already following this user"
        );

        let response = app.server.delete(&path).authorization_bearer(&alice_token).await;
        response.assert_status_ok();
        response.assert_json(&json!({"message": "User unfollowed successfully"}));

        let response = app.server.delete(&path).authorization_bearer(&alice_token).await;
        response.assert_status_not_found();
        assert_eq!(
            response.json::<Value>()["error"]["message"],
            "Not following this user"
        );
    }

    #[tokio::test]
    async fn test_follow_errors() {
        let app = test_app().await;
        let (alice, alice_token) = app.user("alice", true).await;

        let response = app
            .server
            .post(&format!("/api/v1/social/follow/{}", alice.id))
            .authorization_bearer(&alice_token)
            .await;
        response.assert_status_bad_request();
        assert_eq!(
            response.json::<Value>()["error"]["message"],
            "Cannot follow yourself"
        );

        let response = app
            .server
            .post("/api/v1/social/follow/9999")
            .authorization_bearer(&alice_token)
            .await;
        response.assert_status_not_found();
        assert_eq!(response.json::<Value>()["error"]["message"], "User not found");
    }

    #[tokio::test]
    async fn test_block_cycle() {
        let app = test_app().await;
        let (alice, alice_token) = app.user("alice", true).await;
        let (bob, bob_token) = app.user("bob", true).await;
        let (alice_id, bob_id) = (alice.id, bob.id);

        app.server
            .post(&format!("/api/v1/social/follow/{}", alice_id))
            .authorization_bearer(&bob_token)
            .await
            .assert_status_ok();

        let block_path = format!("/api/v1/social/block/{}", bob_id);
        let response = app.server.post(&block_path).authorization_bearer(&alice_token).await;
        response.assert_status_ok();
        response.assert_json(&json!({"message": "User blocked successfully"}));

        let response = app
            .server
            .post(&format!("/api/v1/social/follow/{}", alice_id))
            .authorization_bearer(&bob_token)
            .await;
        response.assert_status_bad_request();
        assert_eq!(
            response.json::<Value>()["error"]["message"],
            "Cannot follow a blocked user"
        );

        let response = app.server.post(&block_path).authorization_bearer(&alice_token).await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["error"]["message"], "User already blocked");

        app.server
            .delete(&block_path)
            .authorization_bearer(&alice_token)
            .await
            .assert_status_ok();
        let response = app.server.delete(&block_path).authorization_bearer(&alice_token).await;
        response.assert_status_not_found();
        assert_eq!(response.json::<Value>()["error"]["message"], "User not blocked");
    }

    #[tokio::test]
    async fn test_social_requires_verified_user() {
        let app = test_app().await;
        let (_, token) = app.user("alice", false).await;
        let (bob, _) = app.user("bob", true).await;

        app.server
            .post(&format!("/api/v1/social/follow/{}", bob.id))
            .authorization_bearer(&token)
            .await
            .assert_status_forbidden();
    }
}
