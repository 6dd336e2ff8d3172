//! Root and health endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::AppState;

pub const API_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: String,
    pub docs: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

/// GET /
async fn root(State(state): State<AppState>) -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: format!("Welcome to {} API", state.config.app.name),
        docs: "/docs",
        version: API_VERSION,
    })
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}
