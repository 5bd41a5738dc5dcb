//! Conversation persistence behind a trait so the session engine and tests
//! can run against SQLite or plain memory.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryConversationStore;
pub use sqlite::SqliteConversationStore;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use shared_types::{Conversation, ConversationId, ConversationPhase, StoredMessage};

pub type SharedConversationStore = Arc<dyn ConversationStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation {0} not found")]
    NotFound(ConversationId),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), StoreError>;

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, StoreError>;

    async fn add_message(&self, message: &StoredMessage) -> Result<(), StoreError>;

    /// All messages for a conversation, oldest first. Message ids are ULIDs,
    /// so lexicographic order is creation order.
    async fn messages(&self, id: &ConversationId) -> Result<Vec<StoredMessage>, StoreError>;

    async fn latest_message(
        &self,
        id: &ConversationId,
    ) -> Result<Option<StoredMessage>, StoreError>;

    async fn update_phase(
        &self,
        id: &ConversationId,
        phase: ConversationPhase,
    ) -> Result<(), StoreError>;
}
