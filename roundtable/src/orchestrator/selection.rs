//! Active-persona selection and per-phase completion criteria.

use crate::personas::PersonaRegistry;
use shared_types::{ConversationPhase, PersonaId, StoredMessage};

/// How many trailing history entries the keyword scan looks at.
const KEYWORD_SCAN_WINDOW: usize = 5;

/// Base set for the phase plus keyword-triggered additions from recent
/// history, deduplicated, registry order then trigger order.
pub fn active_personas(
    registry: &PersonaRegistry,
    phase: ConversationPhase,
    history: &[StoredMessage],
) -> Vec<PersonaId> {
    let mut active: Vec<PersonaId> = registry
        .all()
        .iter()
        .filter(|p| p.collaboration.engagement_phases.contains(&phase))
        .map(|p| p.id)
        .collect();

    let recent: Vec<String> = history
        .iter()
        .rev()
        .take(KEYWORD_SCAN_WINDOW)
        .map(|m| m.content.to_lowercase())
        .collect();

    for persona in registry.all() {
        if active.contains(&persona.id) {
            continue;
        }
        let triggered = persona
            .collaboration
            .engagement_keywords
            .iter()
            .any(|keyword| recent.iter().any(|text| text.contains(keyword)));
        if triggered {
            active.push(persona.id);
        }
    }

    active
}

/// Human-readable criteria a phase must satisfy before handing off. The
/// transition heuristic only checks that the list is non-empty; the terminal
/// phase has none, which is what pins it as terminal.
pub fn completion_criteria(phase: ConversationPhase) -> &'static [&'static str] {
    match phase {
        ConversationPhase::InitialDiscovery => &[
            "problem statement articulated",
            "target audience identified",
        ],
        ConversationPhase::BusinessRequirements => &[
            "success metrics agreed",
            "scope boundaries drawn",
        ],
        ConversationPhase::TechnicalArchitecture => &[
            "core data shapes sketched",
            "integration boundaries named",
        ],
        ConversationPhase::UserExperience => &[
            "primary journey walked through",
            "accessibility considerations noted",
        ],
        ConversationPhase::Infrastructure => &[
            "runtime environment chosen",
            "observability baseline set",
        ],
        ConversationPhase::TaskPlanning => &[
            "increments ordered",
            "riskiest assumption named",
        ],
        ConversationPhase::SpecificationGeneration => &[],
    }
}
