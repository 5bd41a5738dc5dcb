//! AI turn execution: the paced, ordered event sequence for one
//! `request-ai-response`.

use std::time::Duration;

use super::{ConnectionId, SessionEngine, SessionError};
use crate::store::ConversationStore;
use shared_types::{
    ContextHint, ConversationId, MessageAuthor, ServerEvent, StoredMessage,
    ERROR_AI_RESPONSE, ERROR_CONVERSATION_NOT_FOUND,
};

const MS_PER_CHAR: u64 = 20;
const MIN_TYPING_DELAY: Duration = Duration::from_millis(1000);
const MAX_TYPING_DELAY: Duration = Duration::from_millis(5000);

/// Artificial typing delay policy. Tests swap in `instant` so turns run
/// without wall-clock waits.
#[derive(Debug, Clone, Copy)]
pub struct TurnPacing {
    enabled: bool,
}

impl TurnPacing {
    pub fn realistic() -> Self {
        Self { enabled: true }
    }

    pub fn instant() -> Self {
        Self { enabled: false }
    }

    /// Length-proportional delay, clamped so short replies still feel typed
    /// and long ones do not stall the room.
    pub fn typing_delay(text: &str) -> Duration {
        Duration::from_millis(text.len() as u64 * MS_PER_CHAR)
            .clamp(MIN_TYPING_DELAY, MAX_TYPING_DELAY)
    }

    pub async fn delay_for(&self, text: &str) {
        if self.enabled {
            tokio::time::sleep(Self::typing_delay(text)).await;
        }
    }
}

impl SessionEngine {
    /// Run an AI turn, reporting any failure to the requesting connection
    /// only. The rest of the room sees either the full event sequence or
    /// nothing.
    pub async fn request_ai_turn(
        &self,
        requester: &ConnectionId,
        conversation_id: &ConversationId,
        hint: Option<ContextHint>,
    ) {
        if let Err(error) = self.run_ai_turn(conversation_id, hint).await {
            tracing::warn!(conversation = %conversation_id, %error, "ai turn failed");
            let code = match &error {
                SessionError::ConversationNotFound(_) => ERROR_CONVERSATION_NOT_FOUND,
                SessionError::Store(_) => ERROR_AI_RESPONSE,
            };
            self.emit_to(requester, ServerEvent::error(error.to_string(), code))
                .await;
        }
    }

    async fn run_ai_turn(
        &self,
        conversation_id: &ConversationId,
        hint: Option<ContextHint>,
    ) -> Result<(), SessionError> {
        // Single-flight per conversation so two concurrent requests cannot
        // interleave their persisted message ordering.
        let lock = self.turn_lock(conversation_id).await;
        let _guard = lock.lock().await;

        let conversation = self.store().get_conversation(conversation_id).await?;

        // Only ever reply to the user. Replying to an AI message would let
        // turns trigger each other indefinitely.
        let latest = match self.store().latest_message(conversation_id).await? {
            Some(message) if message.author.is_user() => message,
            _ => return Ok(()),
        };

        let history = self.store().messages(conversation_id).await?;
        let context = self.context_for(&conversation, history, hint.as_ref());
        let result = self
            .orchestrator()
            .orchestrate(&context, &latest.content)
            .await;

        for response in &result.responses {
            let persona = self.orchestrator().registry().lookup(response.persona);

            self.broadcast(
                conversation_id,
                ServerEvent::AiTypingStart {
                    persona: persona.id,
                    persona_name: persona.name.to_string(),
                },
            )
            .await;

            self.pacing.delay_for(&response.content).await;

            let message = StoredMessage {
                id: ulid::Ulid::new().to_string(),
                conversation_id: conversation_id.clone(),
                content: response.content.clone(),
                author: MessageAuthor::Persona(response.persona),
                timestamp: chrono::Utc::now(),
                tokens: Some(response.tokens),
                processing_time_ms: Some(response.processing_time_ms),
            };
            self.store().add_message(&message).await?;

            self.broadcast(
                conversation_id,
                ServerEvent::AiTypingEnd {
                    persona: persona.id,
                    persona_name: persona.name.to_string(),
                },
            )
            .await;

            self.broadcast(
                conversation_id,
                ServerEvent::AiResponse {
                    id: message.id,
                    conversation_id: conversation_id.clone(),
                    content: response.content.clone(),
                    persona: persona.id,
                    persona_name: persona.name.to_string(),
                    tokens: response.tokens,
                    processing_time_ms: response.processing_time_ms,
                    timestamp: message.timestamp,
                },
            )
            .await;
        }

        if let Some(next_phase) = result.next_phase {
            self.store().update_phase(conversation_id, next_phase).await?;
            let history = self.store().messages(conversation_id).await?;
            let active_personas = crate::orchestrator::selection::active_personas(
                self.orchestrator().registry(),
                next_phase,
                &history,
            );
            self.broadcast(
                conversation_id,
                ServerEvent::ConversationUpdated {
                    conversation_id: conversation_id.clone(),
                    phase: next_phase,
                    active_personas,
                },
            )
            .await;
            tracing::info!(conversation = %conversation_id, phase = %next_phase, "phase advanced");
        }

        if result.is_complete {
            self.broadcast(
                conversation_id,
                ServerEvent::SpecificationsReady {
                    conversation_id: conversation_id.clone(),
                },
            )
            .await;
        }

        Ok(())
    }
}
