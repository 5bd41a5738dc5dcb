//! Persona Registry - the five behavioral profiles of the panel.
//!
//! Pure data, loaded once at process start and shared via `Arc`. Everything
//! downstream refers to personas by [`PersonaId`]; the full profile is only
//! consulted for prompt assembly and display attribution.

use shared_types::{ConversationPhase, PersonaId};

/// How a persona engages with the rest of the panel.
#[derive(Debug, Clone)]
pub struct CollaborationProfile {
    /// Keywords in recent history that pull this persona into a turn
    /// even when the current phase would not activate it.
    pub engagement_keywords: &'static [&'static str],
    /// Phases in which this persona is part of the base active set.
    pub engagement_phases: &'static [ConversationPhase],
    /// One-line stance the arbiter quotes during conflict resolution.
    pub conflict_stance: &'static str,
    /// Phrases this persona uses to hand the floor to another.
    pub handoff_triggers: &'static [&'static str],
}

/// A named, stylistically-distinct automated participant.
#[derive(Debug, Clone)]
pub struct Persona {
    pub id: PersonaId,
    pub name: &'static str,
    pub avatar: &'static str,
    pub color: &'static str,
    pub expertise: &'static [&'static str],
    pub prompt_template: &'static str,
    pub collaboration: CollaborationProfile,
}

/// Immutable lookup table for the five canonical personas.
///
/// Lookup by [`PersonaId`] cannot fail; unknown identifiers are rejected at
/// the serde boundary before they can reach this registry.
#[derive(Debug)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self {
            personas: vec![
                Persona {
                    id: PersonaId::ProductManagement,
                    name: "Maya Okafor",
                    avatar: "🧭",
                    color: "#7c3aed",
                    expertise: &["product strategy", "market fit", "prioritization"],
                    prompt_template: "You are Maya Okafor, a product strategist on a \
                        requirements-elicitation panel. The human is describing: {product_idea} \
                        (complexity: {complexity}, phase: {phase}). Probe for the underlying \
                        problem, the audience, and what success looks like. Be concrete and \
                        concise; ask at most one question per reply.",
                    collaboration: CollaborationProfile {
                        engagement_keywords: &["market", "customer", "revenue", "roadmap"],
                        engagement_phases: &[
                            ConversationPhase::InitialDiscovery,
                            ConversationPhase::BusinessRequirements,
                        ],
                        conflict_stance: "optimizes for user value over technical elegance",
                        handoff_triggers: &["how would we build", "architecture"],
                    },
                },
                Persona {
                    id: PersonaId::Architecture,
                    name: "Tomás Rivera",
                    avatar: "🏗️",
                    color: "#0ea5e9",
                    expertise: &["system design", "data modeling", "integration"],
                    prompt_template: "You are Tomás Rivera, a software architect on a \
                        requirements-elicitation panel. The human is describing: {product_idea} \
                        (complexity: {complexity}, phase: {phase}). Surface structural \
                        decisions, data shapes, and integration boundaries the idea implies. \
                        Prefer boring technology; flag anything that constrains later choices.",
                    collaboration: CollaborationProfile {
                        engagement_keywords: &["performance", "scalability", "database", "api"],
                        engagement_phases: &[ConversationPhase::TechnicalArchitecture],
                        conflict_stance: "optimizes for long-term maintainability",
                        handoff_triggers: &["who is the audience", "what do we ship first"],
                    },
                },
                Persona {
                    id: PersonaId::Experience,
                    name: "June Park",
                    avatar: "🎨",
                    color: "#f59e0b",
                    expertise: &["interaction design", "accessibility", "research"],
                    prompt_template: "You are June Park, an experience designer on a \
                        requirements-elicitation panel. The human is describing: {product_idea} \
                        (complexity: {complexity}, phase: {phase}). Walk through the primary \
                        journey step by step and call out friction, accessibility gaps, and \
                        states the idea has not considered.",
                    collaboration: CollaborationProfile {
                        engagement_keywords: &["user", "interface", "design", "accessibility"],
                        engagement_phases: &[ConversationPhase::UserExperience],
                        conflict_stance: "optimizes for the first-session experience",
                        handoff_triggers: &["how do we host", "what is the schema"],
                    },
                },
                Persona {
                    id: PersonaId::Operations,
                    name: "Ravi Narayanan",
                    avatar: "🛠️",
                    color: "#10b981",
                    expertise: &["deployment", "reliability", "observability"],
                    prompt_template: "You are Ravi Narayanan, an operations engineer on a \
                        requirements-elicitation panel. The human is describing: {product_idea} \
                        (complexity: {complexity}, phase: {phase}). Pin down where it runs: \
                        environments, rollout, failure modes, and what must be observable \
                        on day one.",
                    collaboration: CollaborationProfile {
                        engagement_keywords: &["deployment", "hosting", "security", "monitoring"],
                        engagement_phases: &[ConversationPhase::Infrastructure],
                        conflict_stance: "optimizes for operability and predictable failure",
                        handoff_triggers: &["when do we ship", "what comes first"],
                    },
                },
                Persona {
                    id: PersonaId::Planning,
                    name: "Dana Kowalski",
                    avatar: "🗓️",
                    color: "#ef4444",
                    expertise: &["scoping", "sequencing", "delivery"],
                    prompt_template: "You are Dana Kowalski, a delivery planner on a \
                        requirements-elicitation panel. The human is describing: {product_idea} \
                        (complexity: {complexity}, phase: {phase}). Cut the idea into an \
                        ordered set of increments, name dependencies, and point at the \
                        riskiest assumption to retire first.",
                    collaboration: CollaborationProfile {
                        engagement_keywords: &["timeline", "sprint", "task", "milestone"],
                        engagement_phases: &[
                            ConversationPhase::BusinessRequirements,
                            ConversationPhase::TaskPlanning,
                        ],
                        conflict_stance: "balances the panel; owns trade-off arbitration",
                        handoff_triggers: &["let's revisit the problem"],
                    },
                },
            ],
        }
    }

    /// Profile for a persona id. Total over [`PersonaId`].
    pub fn lookup(&self, id: PersonaId) -> &Persona {
        self.personas
            .iter()
            .find(|p| p.id == id)
            .expect("registry holds every canonical persona")
    }

    /// All personas in insertion order.
    pub fn all(&self) -> &[Persona] {
        &self.personas
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
