//! SQLite-backed conversation store.
//!
//! Schema is created idempotently on startup. Enum-ish columns (complexity,
//! phase, persona, message_type) are stored as their wire strings and parsed
//! back through `FromStr`; `target_users` is a JSON array in a TEXT column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use super::{ConversationStore, StoreError};
use shared_types::{
    Conversation, ConversationId, ConversationPhase, MessageAuthor, StoredMessage,
};

#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating the file if needed) and run the schema migration.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StoreError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                product_idea TEXT NOT NULL,
                target_users TEXT NOT NULL,
                complexity TEXT NOT NULL,
                phase TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                content TEXT NOT NULL,
                message_type TEXT NOT NULL,
                persona TEXT,
                timestamp TEXT NOT NULL,
                tokens INTEGER,
                processing_time_ms INTEGER,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages(conversation_id, id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

type ConversationRow = (String, String, String, String, String, String);
type MessageRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<i64>,
    Option<i64>,
);

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

fn conversation_from_row(row: ConversationRow) -> Result<Conversation, StoreError> {
    let (id, product_idea, target_users, complexity, phase, created_at) = row;
    Ok(Conversation {
        id: ConversationId(id),
        product_idea,
        target_users: serde_json::from_str(&target_users)
            .map_err(|e| StoreError::Corrupt(format!("bad target_users: {e}")))?,
        complexity: complexity.parse().map_err(StoreError::Corrupt)?,
        phase: phase.parse().map_err(StoreError::Corrupt)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn message_from_row(row: MessageRow) -> Result<StoredMessage, StoreError> {
    let (id, conversation_id, content, message_type, persona, timestamp, tokens, processing) = row;
    let author = match (message_type.as_str(), persona) {
        ("user", _) => MessageAuthor::User,
        ("ai", Some(p)) => MessageAuthor::Persona(p.parse().map_err(StoreError::Corrupt)?),
        (kind, persona) => {
            return Err(StoreError::Corrupt(format!(
                "message {id} has type {kind:?} persona {persona:?}"
            )))
        }
    };
    Ok(StoredMessage {
        id,
        conversation_id: ConversationId(conversation_id),
        content,
        author,
        timestamp: parse_timestamp(&timestamp)?,
        tokens,
        processing_time_ms: processing,
    })
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let target_users = serde_json::to_string(&conversation.target_users)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        sqlx::query(
            "INSERT INTO conversations (id, product_idea, target_users, complexity, phase, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(conversation.id.as_str())
        .bind(&conversation.product_idea)
        .bind(target_users)
        .bind(conversation.complexity.as_str())
        .bind(conversation.phase.as_str())
        .bind(conversation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, StoreError> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT id, product_idea, target_users, complexity, phase, created_at
             FROM conversations WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => conversation_from_row(row),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn add_message(&self, message: &StoredMessage) -> Result<(), StoreError> {
        // Surface a missing conversation as NotFound rather than letting the
        // FK violation come back as a generic database error.
        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM conversations WHERE id = ?")
            .bind(message.conversation_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound(message.conversation_id.clone()));
        }

        sqlx::query(
            "INSERT INTO messages
             (id, conversation_id, content, message_type, persona, timestamp, tokens, processing_time_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(message.conversation_id.as_str())
        .bind(&message.content)
        .bind(match message.author.kind() {
            shared_types::MessageKind::User => "user",
            shared_types::MessageKind::Ai => "ai",
        })
        .bind(message.author.persona().map(|p| p.as_str()))
        .bind(message.timestamp.to_rfc3339())
        .bind(message.tokens)
        .bind(message.processing_time_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn messages(&self, id: &ConversationId) -> Result<Vec<StoredMessage>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, conversation_id, content, message_type, persona, timestamp, tokens, processing_time_ms
             FROM messages WHERE conversation_id = ? ORDER BY id ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(message_from_row).collect()
    }

    async fn latest_message(
        &self,
        id: &ConversationId,
    ) -> Result<Option<StoredMessage>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, conversation_id, content, message_type, persona, timestamp, tokens, processing_time_ms
             FROM messages WHERE conversation_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(message_from_row).transpose()
    }

    async fn update_phase(
        &self,
        id: &ConversationId,
        phase: ConversationPhase,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE conversations SET phase = ? WHERE id = ?")
            .bind(phase.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}
