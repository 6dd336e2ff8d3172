//! Chat API endpoints
//!
//! - GET /api/v1/chat/ws?token= - WebSocket for live messages
//! - GET /api/v1/chat/conversations - One entry per chat partner
//! - GET /api/v1/chat/messages/{user_id} - Conversation history
//! - POST /api/v1/chat/messages/{user_id} - Send a message
//! - GET /api/v1/chat/online/{user_id} - Presence lookup

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::unbounded_channel;

use crate::api::common::MessagePaginationQuery;
use crate::api::middleware::{self, resolve_user, ApiError, AppState, AuthenticatedUser};
use crate::api::responses::ChatMessageResponse;
use crate::cache::{is_user_online, set_user_offline, set_user_online};
use crate::models::Conversation;
use crate::services::chat::ChatServiceError;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct OnlineResponse {
    pub user_id: i64,
    pub is_online: bool,
}

pub fn router(state: AppState) -> Router<AppState> {
    let rate_limited = Router::new()
        .route("/messages/{user_id}", post(send_message))
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
        .route("/conversations", get(conversations))
        .route("/messages/{user_id}", get(message_history))
        .route_layer(axum_middleware::from_fn(middleware::require_verified))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let authenticated = Router::new()
        .route("/online/{user_id}", get(online_status))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .route("/ws", get(ws_handler))
        .merge(rate_limited)
        .merge(verified)
        .merge(authenticated)
}

fn chat_error(e: ChatServiceError) -> ApiError {
    match e {
        ChatServiceError::ValidationError(msg) => ApiError::validation_error(msg),
        ChatServiceError::ReceiverNotFound | ChatServiceError::UserNotFound => {
            ApiError::not_found(e.to_string())
        }
        ChatServiceError::SelfMessage => ApiError::bad_request(e.to_string()),
        ChatServiceError::Blocked => ApiError::forbidden(e.to_string()),
        ChatServiceError::InternalError(e) => ApiError::internal(e),
    }
}

async fn mark_online(state: &AppState, user_id: i64) {
    if let Err(e) = set_user_online(&state.cache, user_id).await {
        tracing::warn!("Failed to mark user {} online: {:#}", user_id, e);
    }
}

/// GET /api/v1/chat/ws
///
/// The token travels in the query string since browsers cannot set headers
/// on a WebSocket handshake.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

async fn reject(mut socket: WebSocket, reason: &'static str) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!("Failed to close rejected socket: {}", e);
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let user = match token {
        Some(token) => resolve_user(&state, &token).await.ok(),
        None => None,
    };
    let Some(user) = user else {
        reject(socket, "Invalid token").await;
        return;
    };
    let user_id = user.id;

    let hub = state.chat_service.hub().clone();
    let (connection_id, mut pushed) = hub.connect(user_id).await;
    mark_online(&state, user_id).await;
    tracing::info!("Chat socket opened for user {}", user_id);

    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut replies) = unbounded_channel::<String>();

    let mut send_task = tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                Some(payload) = pushed.recv() => payload,
                Some(payload) = replies.recv() => payload,
                else => break,
            };
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => {
                    mark_online(&recv_state, user_id).await;
                    let reply = recv_state
                        .chat_service
                        .handle_frame(user_id, text.as_str())
                        .await;
                    if let Some(reply) = reply {
                        if reply_tx.send(reply.to_json()).is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if hub.disconnect(user_id, connection_id).await {
        if let Err(e) = set_user_offline(&state.cache, user_id).await {
            tracing::warn!("Failed to mark user {} offline: {:#}", user_id, e);
        }
    }
    tracing::info!("Chat socket closed for user {}", user_id);
}

/// GET /api/v1/chat/conversations
async fn conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state
        .chat_service
        .conversations(user.0.id)
        .await
        .map_err(chat_error)?;
    Ok(Json(conversations))
}

/// GET /api/v1/chat/messages/{user_id}
async fn message_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(other_user_id): Path<i64>,
    Query(page): Query<MessagePaginationQuery>,
) -> Result<Json<Vec<ChatMessageResponse>>, ApiError> {
    let (skip, limit) = page.clamped();
    let messages = state
        .chat_service
        .history(user.0.id, other_user_id, skip, limit)
        .await
        .map_err(chat_error)?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// POST /api/v1/chat/messages/{user_id}
async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(receiver_id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .chat_service
        .send(user.0.id, receiver_id, &body.content)
        .await
        .map_err(chat_error)?;
    Ok((StatusCode::CREATED, Json(ChatMessageResponse::from(message))))
}

/// GET /api/v1/chat/online/{user_id}
async fn online_status(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<OnlineResponse>, ApiError> {
    let is_online = is_user_online(&state.cache, user_id)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(OnlineResponse { user_id, is_online }))
}
