//! API layer - HTTP handlers and routing
//!
//! All JSON endpoints live under `/api/v1`:
//! - `/auth`: registration, verification, login, password reset, Google sign-in
//! - `/users`: own account and public profiles
//! - `/photos`: upload, browse, likes, downloads
//! - `/photos/{id}/comments`, `/comments`: threaded comments
//! - `/social`: follows and blocks
//! - `/chat`: conversations over REST and a WebSocket
//!
//! Uploaded files are served from `/uploads`.

pub mod auth;
pub mod chat;
pub mod comments;
pub mod common;
pub mod middleware;
pub mod photos;
pub mod responses;
pub mod site;
pub mod social;
pub mod users;

use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::ServerConfig;

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser, MessageResponse};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router(state.clone()))
        .nest("/users", users::router(state.clone()))
        .nest("/photos", photos::router(state.clone()))
        .nest("/social", social::router(state.clone()))
        .nest("/chat", chat::router(state.clone()))
        .merge(comments::router(state))
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .allowed_origins()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);
    let uploads = ServeDir::new(&state.config.upload.root);

    Router::new()
        .merge(site::router())
        .nest("/api/v1", build_api_router(state.clone()))
        .nest_service("/uploads", uploads)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::test_support::test_app;
    use serde_json::Value;

    #[tokio::test]
    async fn test_router_mounts_every_group() {
        let app = test_app().await;

        app.server.get("/health").await.assert_status_ok();
        app.server
            .get("/api/v1/photos/categories")
            .await
            .assert_status_ok();

        // Routes sharing a path with different methods and guards must all be reachable.
        for (method, path) in [
            ("GET", "/api/v1/users/me"),
            ("GET", "/api/v1/users/1/followers"),
            ("GET", "/api/v1/users/1/following"),
            ("GET", "/api/v1/photos/1/download"),
            ("GET", "/api/v1/chat/conversations"),
            ("GET", "/api/v1/chat/messages/1"),
            ("POST", "/api/v1/chat/messages/1"),
            ("GET", "/api/v1/chat/online/1"),
            ("POST", "/api/v1/social/follow/1"),
            ("DELETE", "/api/v1/photos/1"),
            ("PUT", "/api/v1/comments/1"),
        ] {
            let response = match method {
                "GET" => app.server.get(path).await,
                "POST" => app.server.post(path).await,
                "PUT" => app.server.put(path).await,
                _ => app.server.delete(path).await,
            };
            response.assert_status_unauthorized();
            assert_eq!(
                response.json::<Value>()["error"]["message"],
                "Not authenticated",
                "{} {}",
                method,
                path
            );
        }
    }
}
