//! Direct messages
//!
//! Messages are stored first and then pushed to any live WebSocket of the
//! receiver through `ChatHub`. The REST endpoints and the socket share the
//! same send path, so both enforce blocks and length limits.

use crate::db::repositories::{ChatRepository, SocialRepository, UserRepository};
use crate::models::{ChatMessage, Conversation};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub const MESSAGE_MAX_LEN: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ChatServiceError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Receiver not found")]
    ReceiverNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Cannot send message to yourself")]
    SelfMessage,

    #[error("Cannot send message to this user")]
    Blocked,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Frames the server pushes over a chat socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Message {
        id: i64,
        content: String,
        sender_id: i64,
        created_at: DateTime<Utc>,
    },
    Sent {
        id: i64,
        receiver_id: i64,
    },
    Typing {
        sender_id: i64,
    },
    Read {
        message_id: i64,
    },
    Error {
        message: String,
    },
}

impl ServerFrame {
    fn incoming(message: &ChatMessage) -> Self {
        ServerFrame::Message {
            id: message.id,
            content: message.content.clone(),
            sender_id: message.sender_id,
            created_at: message.created_at,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frames a client sends. Fields are optional so incomplete frames can be
/// ignored instead of closing the socket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub receiver_id: Option<i64>,
    pub content: Option<String>,
    pub message_id: Option<i64>,
}

/// Identifies one socket, so a user can hold several at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Connection {
    id: ConnectionId,
    sender: UnboundedSender<String>,
}

/// Live chat sockets keyed by user
#[derive(Default, Clone)]
pub struct ChatHub {
    inner: Arc<RwLock<HashMap<i64, Vec<Connection>>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket; the receiver yields serialized frames for it
    pub async fn connect(&self, user_id: i64) -> (ConnectionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();

        let mut guard = self.inner.write().await;
        guard.entry(user_id).or_default().push(Connection { id, sender: tx });
        tracing::debug!(
            "User {} connected, {} open sockets",
            user_id,
            guard.get(&user_id).map(|v| v.len()).unwrap_or(0)
        );

        (id, rx)
    }

    /// Remove a socket. Returns true when it was the user's last one.
    pub async fn disconnect(&self, user_id: i64, connection_id: ConnectionId) -> bool {
        let mut guard = self.inner.write().await;
        let Some(connections) = guard.get_mut(&user_id) else {
            return true;
        };
        connections.retain(|c| c.id != connection_id);
        if connections.is_empty() {
            guard.remove(&user_id);
            tracing::debug!("User {} has no open sockets", user_id);
            true
        } else {
            false
        }
    }

    pub async fn is_connected(&self, user_id: i64) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    /// Push a frame to every socket of a user, dropping dead senders.
    /// Returns whether anything was delivered.
    pub async fn send_to(&self, user_id: i64, frame: &ServerFrame) -> bool {
        let payload = frame.to_json();
        let mut guard = self.inner.write().await;
        let Some(connections) = guard.get_mut(&user_id) else {
            return false;
        };
        connections.retain(|c| c.sender.send(payload.clone()).is_ok());
        let delivered = !connections.is_empty();
        if !delivered {
            guard.remove(&user_id);
        }
        delivered
    }
}

fn validate_content(content: &str) -> Result<(), ChatServiceError> {
    if content.trim().is_empty() || content.chars().count() > MESSAGE_MAX_LEN {
        return Err(ChatServiceError::ValidationError(format!(
            "Message must be between 1 and {} characters",
            MESSAGE_MAX_LEN
        )));
    }
    Ok(())
}

pub struct ChatService {
    chat: Arc<dyn ChatRepository>,
    users: Arc<dyn UserRepository>,
    social: Arc<dyn SocialRepository>,
    hub: ChatHub,
}

impl ChatService {
    pub fn new(
        chat: Arc<dyn ChatRepository>,
        users: Arc<dyn UserRepository>,
        social: Arc<dyn SocialRepository>,
        hub: ChatHub,
    ) -> Self {
        Self {
            chat,
            users,
            social,
            hub,
        }
    }

    pub fn hub(&self) -> &ChatHub {
        &self.hub
    }

    /// Store a message and push it to the receiver's open sockets
    pub async fn send(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
    ) -> Result<ChatMessage, ChatServiceError> {
        validate_content(content)?;
        self.users
            .get_by_id(receiver_id)
            .await
            .context("Failed to get receiver")?
            .ok_or(ChatServiceError::ReceiverNotFound)?;
        if receiver_id == sender_id {
            return Err(ChatServiceError::SelfMessage);
        }
        if self
            .social
            .is_blocked_either(sender_id, receiver_id)
            .await
            .context("Failed to check block")?
        {
            return Err(ChatServiceError::Blocked);
        }

        let message = self
            .chat
            .create(sender_id, receiver_id, content)
            .await
            .context("Failed to store message")?;

        self.hub
            .send_to(receiver_id, &ServerFrame::incoming(&message))
            .await;
        Ok(message)
    }

    /// A page of the conversation in chronological order. Incoming unread
    /// messages on the page are marked read.
    pub async fn history(
        &self,
        user_id: i64,
        other_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, ChatServiceError> {
        self.users
            .get_by_id(other_id)
            .await
            .context("Failed to get user")?
            .ok_or(ChatServiceError::UserNotFound)?;

        let mut messages = self
            .chat
            .history(user_id, other_id, skip, limit)
            .await
            .context("Failed to load messages")?;

        let now = Utc::now();
        for message in messages
            .iter_mut()
            .filter(|m| m.receiver_id == user_id && !m.is_read)
        {
            self.chat
                .mark_read(message.id, now)
                .await
                .context("Failed to mark message read")?;
            message.is_read = true;
            message.read_at = Some(now);
        }

        messages.reverse();
        Ok(messages)
    }

    pub async fn conversations(&self, user_id: i64) -> Result<Vec<Conversation>, ChatServiceError> {
        Ok(self
            .chat
            .conversations(user_id)
            .await
            .context("Failed to list conversations")?)
    }

    /// Mark a message read if `user_id` received it, and tell the sender.
    /// Returns false when the message is not addressed to the user.
    pub async fn mark_read(&self, user_id: i64, message_id: i64) -> Result<bool, ChatServiceError> {
        let Some(message) = self
            .chat
            .get_by_id(message_id)
            .await
            .context("Failed to get message")?
            .filter(|m| m.receiver_id == user_id)
        else {
            return Ok(false);
        };

        self.chat
            .mark_read(message.id, Utc::now())
            .await
            .context("Failed to mark message read")?;
        self.hub
            .send_to(message.sender_id, &ServerFrame::Read { message_id })
            .await;
        Ok(true)
    }

    /// Handle one inbound socket frame. The returned frame, if any, goes
    /// back to the socket that sent it.
    pub async fn handle_frame(&self, user_id: i64, raw: &str) -> Option<ServerFrame> {
        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Ignoring malformed frame from user {}: {}", user_id, e);
                return None;
            }
        };

        match frame.kind.as_str() {
            "message" => {
                let (Some(receiver_id), Some(content)) = (frame.receiver_id, frame.content) else {
                    return None;
                };
                match self.send(user_id, receiver_id, &content).await {
                    Ok(message) => Some(ServerFrame::Sent {
                        id: message.id,
                        receiver_id,
                    }),
                    Err(ChatServiceError::InternalError(e)) => {
                        tracing::error!("Failed to send message from {}: {:#}", user_id, e);
                        Some(ServerFrame::Error {
                            message: "Failed to send message".to_string(),
                        })
                    }
                    Err(e) => Some(ServerFrame::Error {
                        message: e.to_string(),
                    }),
                }
            }
            "typing" => {
                if let Some(receiver_id) = frame.receiver_id {
                    self.hub
                        .send_to(receiver_id, &ServerFrame::Typing { sender_id: user_id })
                        .await;
                }
                None
            }
            "read" => {
                if let Some(message_id) = frame.message_id {
                    if let Err(e) = self.mark_read(user_id, message_id).await {
                        tracing::error!("Failed to mark message {} read: {:#}", message_id, e);
                    }
                }
                None
            }
            other => {
                tracing::debug!("Ignoring frame type {:?} from user {}", other, user_id);
                None
            }
        }
    }
}
