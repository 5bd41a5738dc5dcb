//! Response generation seam.
//!
//! The orchestrator only sees the [`ResponseGenerator`] trait; concrete
//! backends live in [`gateway`] (real providers over reqwest) and
//! [`scripted`] (deterministic canned replies for offline dev and tests).

use async_trait::async_trait;
use std::sync::Arc;

use crate::orchestrator::ConversationContext;
use crate::personas::Persona;
use shared_types::PersonaId;

pub mod gateway;
pub mod scripted;

pub type SharedResponseGenerator = Arc<dyn ResponseGenerator>;

/// One generated reply plus its usage metrics.
#[derive(Debug, Clone)]
pub struct GeneratedResponse {
    pub content: String,
    pub tokens: i64,
    pub processing_time_ms: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("provider request failed: {0}")]
    Provider(String),

    #[error("provider returned a malformed response: {0}")]
    Malformed(String),

    #[error("rate limit exceeded for persona {persona} ({limit} calls per minute)")]
    RateLimited { persona: PersonaId, limit: usize },
}

/// Black-box capability: generate text for one persona given the
/// conversation context and the user's latest message.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        persona: &Persona,
        context: &ConversationContext,
        user_message: &str,
    ) -> Result<GeneratedResponse, GenerationError>;
}
