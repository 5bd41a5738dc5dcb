//! Deterministic generator for tests and offline development.
//!
//! Responses come from per-persona scripts when queued, otherwise from a
//! fixed template that deliberately avoids engagement keywords and
//! transition-signal phrases so it never perturbs persona selection or
//! phase heuristics.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

use super::{GeneratedResponse, GenerationError, ResponseGenerator};
use crate::orchestrator::ConversationContext;
use crate::personas::Persona;
use shared_types::PersonaId;

#[derive(Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<PersonaId, VecDeque<String>>>,
    failing: Mutex<HashSet<PersonaId>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned reply; replies are consumed in FIFO order.
    pub async fn push_script(&self, persona: PersonaId, content: impl Into<String>) {
        self.scripts
            .lock()
            .await
            .entry(persona)
            .or_default()
            .push_back(content.into());
    }

    /// Make every subsequent call for this persona return an error.
    pub async fn fail_persona(&self, persona: PersonaId) {
        self.failing.lock().await.insert(persona);
    }

    // Keep this text free of engagement keywords and transition phrases,
    // otherwise canned replies would steer selection and phase heuristics.
    fn default_reply(persona: &Persona, context: &ConversationContext) -> String {
        format!(
            "{} here. Thinking about \"{}\", I have a few follow-ups before we go deeper.",
            persona.name, context.product_idea
        )
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        persona: &Persona,
        context: &ConversationContext,
        _user_message: &str,
    ) -> Result<GeneratedResponse, GenerationError> {
        if self.failing.lock().await.contains(&persona.id) {
            return Err(GenerationError::Provider(format!(
                "scripted failure for {}",
                persona.id
            )));
        }

        let scripted = self
            .scripts
            .lock()
            .await
            .get_mut(&persona.id)
            .and_then(VecDeque::pop_front);
        let content = scripted.unwrap_or_else(|| Self::default_reply(persona, context));
        let tokens = content.split_whitespace().count() as i64;

        Ok(GeneratedResponse {
            content,
            tokens,
            processing_time_ms: 0,
        })
    }
}
