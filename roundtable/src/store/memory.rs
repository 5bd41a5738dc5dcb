//! In-memory store used by engine unit tests and offline development.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{ConversationStore, StoreError};
use shared_types::{Conversation, ConversationId, ConversationPhase, StoredMessage};

#[derive(Default)]
pub struct MemoryConversationStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<StoredMessage>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, StoreError> {
        let state = self.inner.lock().await;
        state
            .conversations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn add_message(&self, message: &StoredMessage) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound(message.conversation_id.clone()));
        }
        state
            .messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn messages(&self, id: &ConversationId) -> Result<Vec<StoredMessage>, StoreError> {
        let state = self.inner.lock().await;
        if !state.conversations.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(state.messages.get(id).cloned().unwrap_or_default())
    }

    async fn latest_message(
        &self,
        id: &ConversationId,
    ) -> Result<Option<StoredMessage>, StoreError> {
        let state = self.inner.lock().await;
        if !state.conversations.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(state.messages.get(id).and_then(|m| m.last().cloned()))
    }

    async fn update_phase(
        &self,
        id: &ConversationId,
        phase: ConversationPhase,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        match state.conversations.get_mut(id) {
            Some(conversation) => {
                conversation.phase = phase;
                Ok(())
            }
            None => Err(StoreError::NotFound(id.clone())),
        }
    }
}
