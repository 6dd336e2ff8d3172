//! Chat message repository

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{ChatMessage, Conversation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Conversation previews show this many characters of the last message
const PREVIEW_CHARS: usize = 50;

const MESSAGE_COLUMNS: &str = "id, content, sender_id, receiver_id, is_read, \
     is_deleted_by_sender, is_deleted_by_receiver, created_at, read_at";

macro_rules! message_from_row {
    ($row:expr) => {
        ChatMessage {
            id: $row.get("id"),
            content: $row.get("content"),
            sender_id: $row.get("sender_id"),
            receiver_id: $row.get("receiver_id"),
            is_read: $row.get("is_read"),
            is_deleted_by_sender: $row.get("is_deleted_by_sender"),
            is_deleted_by_receiver: $row.get("is_deleted_by_receiver"),
            created_at: $row.get("created_at"),
            read_at: $row.get("read_at"),
        }
    };
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create(&self, sender_id: i64, receiver_id: i64, content: &str) -> Result<ChatMessage>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ChatMessage>>;

    /// Messages exchanged between two users, newest first
    async fn history(&self, user_id: i64, other_id: i64, skip: i64, limit: i64)
        -> Result<Vec<ChatMessage>>;

    /// Mark everything `other_id` sent to `user_id` as read
    async fn mark_conversation_read(
        &self,
        user_id: i64,
        other_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    async fn mark_read(&self, id: i64, now: DateTime<Utc>) -> Result<()>;

    /// One entry per chat partner, most recent conversation first
    async fn conversations(&self, user_id: i64) -> Result<Vec<Conversation>>;

    /// Retention cleanup; returns how many messages were removed
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxChatRepository {
    pool: DynDatabasePool,
}

impl SqlxChatRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ChatRepository> {
        Arc::new(Self::new(pool))
    }

    async fn partner_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let ids = with_pool!(self.pool, db => {
            sqlx::query(
                r#"
                SELECT DISTINCT CASE WHEN sender_id = ? THEN receiver_id ELSE sender_id END AS partner_id
                FROM chat_messages
                WHERE sender_id = ? OR receiver_id = ?
                "#,
            )
            .bind(user_id)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(db)
            .await
            .context("Failed to list chat partners")?
            .iter()
            .map(|row| row.get::<i64, _>("partner_id"))
            .collect()
        });
        Ok(ids)
    }

    async fn conversation_with(&self, user_id: i64, partner_id: i64) -> Result<Option<Conversation>> {
        let conversation = with_pool!(self.pool, db => {
            let last = sqlx::query(
                r#"
                SELECT m.content, m.created_at, u.username, u.profile_picture
                FROM chat_messages m
                INNER JOIN users u ON u.id = ?
                WHERE (m.sender_id = ? AND m.receiver_id = ?) OR (m.sender_id = ? AND m.receiver_id = ?)
                ORDER BY m.created_at DESC, m.id DESC
                LIMIT 1
                "#,
            )
            .bind(partner_id)
            .bind(user_id)
            .bind(partner_id)
            .bind(partner_id)
            .bind(user_id)
            .fetch_optional(db)
            .await
            .context("Failed to load last message")?;

            match last {
                None => None,
                Some(row) => {
                    let unread_count: i64 = sqlx::query(
                        "SELECT COUNT(*) AS n FROM chat_messages WHERE sender_id = ? AND receiver_id = ? AND is_read = ?",
                    )
                    .bind(partner_id)
                    .bind(user_id)
                    .bind(false)
                    .fetch_one(db)
                    .await
                    .context("Failed to count unread messages")?
                    .get("n");

                    let content: String = row.get("content");
                    Some(Conversation {
                        user_id: partner_id,
                        username: row.get("username"),
                        profile_picture: row.get("profile_picture"),
                        last_message: content.chars().take(PREVIEW_CHARS).collect(),
                        last_message_time: row.get("created_at"),
                        unread_count,
                    })
                }
            }
        });
        Ok(conversation)
    }
}

#[async_trait]
impl ChatRepository for SqlxChatRepository {
    async fn create(&self, sender_id: i64, receiver_id: i64, content: &str) -> Result<ChatMessage> {
        let created_at = Utc::now();
        let id = with_pool!(self.pool, db => {
            sqlx::query(
                r#"
                INSERT INTO chat_messages (content, sender_id, receiver_id, is_read,
                                           is_deleted_by_sender, is_deleted_by_receiver, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(content)
            .bind(sender_id)
            .bind(receiver_id)
            .bind(false)
            .bind(false)
            .bind(false)
            .bind(created_at)
            .execute(db)
            .await
            .context("Failed to create message")?
            .inserted_id()
        });

        Ok(ChatMessage {
            id,
            content: content.to_string(),
            sender_id,
            receiver_id,
            is_read: false,
            is_deleted_by_sender: false,
            is_deleted_by_receiver: false,
            created_at,
            read_at: None,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ChatMessage>> {
        let sql = format!("SELECT {} FROM chat_messages WHERE id = ?", MESSAGE_COLUMNS);
        let message = with_pool!(self.pool, db => {
            sqlx::query(&sql)
                .bind(id)
                .fetch_optional(db)
                .await
                .context("Failed to get message")?
                .map(|row| message_from_row!(row))
        });
        Ok(message)
    }

    async fn history(
        &self,
        user_id: i64,
        other_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {} FROM chat_messages \
             WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?) \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        );
        let messages = with_pool!(self.pool, db => {
            sqlx::query(&sql)
                .bind(user_id)
                .bind(other_id)
                .bind(other_id)
                .bind(user_id)
                .bind(limit)
                .bind(skip)
                .fetch_all(db)
                .await
                .context("Failed to load chat history")?
                .iter()
                .map(|row| message_from_row!(row))
                .collect()
        });
        Ok(messages)
    }

    async fn mark_conversation_read(
        &self,
        user_id: i64,
        other_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let updated = with_pool!(self.pool, db => {
            sqlx::query(
                "UPDATE chat_messages SET is_read = ?, read_at = ? WHERE sender_id = ? AND receiver_id = ? AND is_read = ?",
            )
            .bind(true)
            .bind(now)
            .bind(other_id)
            .bind(user_id)
            .bind(false)
            .execute(db)
            .await
            .context("Failed to mark messages read")?
            .rows_affected()
        });
        Ok(updated)
    }

    async fn mark_read(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        with_pool!(self.pool, db => {
            sqlx::query("UPDATE chat_messages SET is_read = ?, read_at = ? WHERE id = ?")
                .bind(true)
                .bind(now)
                .bind(id)
                .execute(db)
                .await
                .context("Failed to mark message read")?;
        });
        Ok(())
    }

    async fn conversations(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let mut conversations = Vec::new();
        for partner_id in self.partner_ids(user_id).await? {
            if let Some(conversation) = self.conversation_with(user_id, partner_id).await? {
                conversations.push(conversation);
            }
        }
        conversations.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        Ok(conversations)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = with_pool!(self.pool, db => {
            sqlx::query("DELETE FROM chat_messages WHERE created_at < ?")
                .bind(cutoff)
                .execute(db)
                .await
                .context("Failed to delete old messages")?
                .rows_affected()
        });
        Ok(removed)
    }
}
