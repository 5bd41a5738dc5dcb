//! Conversation Orchestrator.
//!
//! Given a context snapshot and the user's message, decides which personas
//! speak this turn, collects their generated responses, evaluates the phase
//! heuristic, and derives suggested next actions. Orchestration itself never
//! fails; individual persona failures are logged and skipped so one flaky
//! provider call cannot silence the rest of the panel.

pub mod actions;
pub mod selection;

use std::sync::Arc;

use crate::generation::{GenerationError, ResponseGenerator, SharedResponseGenerator};
use crate::personas::PersonaRegistry;
use shared_types::{
    ComplexityTier, ContextHint, Conversation, ConversationId, ConversationPhase, PersonaId,
    StoredMessage,
};

/// Phrases in generated text that the transition heuristic treats as a
/// phase-completion signal. Matching is intentionally crude; there is no
/// semantic check against the phase's completion criteria.
const TRANSITION_SIGNALS: [&str; 6] = [
    "ready to move on",
    "next phase",
    "hand off",
    "completed",
    "established",
    "defined",
];

/// Immutable per-turn snapshot, rebuilt from persisted state on every
/// orchestration call.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub conversation_id: ConversationId,
    pub product_idea: String,
    pub target_users: Vec<String>,
    pub complexity: ComplexityTier,
    pub phase: ConversationPhase,
    pub active_personas: Vec<PersonaId>,
    pub history: Vec<StoredMessage>,
}

impl ConversationContext {
    pub fn build(conversation: &Conversation, history: Vec<StoredMessage>) -> Self {
        Self {
            conversation_id: conversation.id.clone(),
            product_idea: conversation.product_idea.clone(),
            target_users: conversation.target_users.clone(),
            complexity: conversation.complexity,
            phase: conversation.phase,
            active_personas: Vec::new(),
            history,
        }
    }

    /// Overlay client-supplied hint fields; absent fields keep stored values.
    pub fn apply_hint(mut self, hint: &ContextHint) -> Self {
        if let Some(idea) = &hint.product_idea {
            self.product_idea = idea.clone();
        }
        if let Some(users) = &hint.target_users {
            self.target_users = users.clone();
        }
        if let Some(tier) = hint.complexity {
            self.complexity = tier;
        }
        self
    }
}

/// One persona's contribution to a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaResponse {
    pub persona: PersonaId,
    pub content: String,
    pub tokens: i64,
    pub processing_time_ms: i64,
}

/// Everything a turn produced, in persona order.
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    pub responses: Vec<PersonaResponse>,
    /// Present only when the transition heuristic fired.
    pub next_phase: Option<ConversationPhase>,
    /// True only when advancing out of the final substantive phase.
    pub is_complete: bool,
    pub suggested_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseProgress {
    pub current_phase: ConversationPhase,
    pub completed_phases: Vec<ConversationPhase>,
    pub next_phase: Option<ConversationPhase>,
    pub overall_progress_percent: u8,
}

pub struct Orchestrator {
    registry: Arc<PersonaRegistry>,
    generator: SharedResponseGenerator,
}

impl Orchestrator {
    pub fn new(registry: Arc<PersonaRegistry>, generator: SharedResponseGenerator) -> Self {
        Self {
            registry,
            generator,
        }
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    /// Run one full turn: select personas, generate in order, evaluate the
    /// transition heuristic, derive suggestions.
    pub async fn orchestrate(
        &self,
        context: &ConversationContext,
        user_message: &str,
    ) -> OrchestrationResult {
        let active = selection::active_personas(&self.registry, context.phase, &context.history);
        let turn_context = ConversationContext {
            active_personas: active.clone(),
            ..context.clone()
        };

        let mut responses = Vec::with_capacity(active.len());
        for id in &active {
            let persona = self.registry.lookup(*id);
            match self
                .generator
                .generate(persona, &turn_context, user_message)
                .await
            {
                Ok(generated) => responses.push(PersonaResponse {
                    persona: *id,
                    content: generated.content,
                    tokens: generated.tokens,
                    processing_time_ms: generated.processing_time_ms,
                }),
                Err(error) => {
                    tracing::warn!(persona = %id, %error, "persona skipped for this turn");
                }
            }
        }

        let should_transition = self.should_transition(context.phase, &responses);
        let next_phase = if should_transition {
            context.phase.next()
        } else {
            None
        };
        let is_complete = context.phase == ConversationPhase::TaskPlanning && should_transition;
        let suggested_actions = actions::suggested_actions(context.phase, next_phase, &responses);

        OrchestrationResult {
            responses,
            next_phase,
            is_complete,
            suggested_actions,
        }
    }

    /// Ask the arbitration persona to fold conflicting responses into one.
    pub async fn resolve_conflict(
        &self,
        context: &ConversationContext,
        conflicting: &[PersonaResponse],
    ) -> Result<PersonaResponse, GenerationError> {
        let arbiter = self.registry.lookup(PersonaId::Planning);
        let mut prompt = String::from(
            "The panel disagrees. Weigh each position below against its author's \
             stated stance and produce one balanced resolution.\n",
        );
        for response in conflicting {
            let persona = self.registry.lookup(response.persona);
            prompt.push_str(&format!(
                "\n{} ({}): {}\n",
                persona.name, persona.collaboration.conflict_stance, response.content
            ));
        }

        let generated = self.generator.generate(arbiter, context, &prompt).await?;
        Ok(PersonaResponse {
            persona: PersonaId::Planning,
            content: generated.content,
            tokens: generated.tokens,
            processing_time_ms: generated.processing_time_ms,
        })
    }

    fn should_transition(&self, phase: ConversationPhase, responses: &[PersonaResponse]) -> bool {
        if selection::completion_criteria(phase).is_empty() {
            return false;
        }
        let combined = responses
            .iter()
            .map(|r| r.content.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        TRANSITION_SIGNALS
            .iter()
            .any(|signal| combined.contains(signal))
    }
}

/// Pure function of the fixed phase ordering.
pub fn phase_progress(current_phase: ConversationPhase) -> PhaseProgress {
    let index = current_phase.index();
    PhaseProgress {
        current_phase,
        completed_phases: ConversationPhase::ALL[..index].to_vec(),
        next_phase: current_phase.next(),
        overall_progress_percent: (index * 100 / (ConversationPhase::ALL.len() - 1)) as u8,
    }
}
