//! Suggested next actions derived from a turn's responses.

use super::PersonaResponse;
use shared_types::ConversationPhase;

/// Trigger phrases in response text and the action each one suggests.
const RESPONSE_TRIGGERS: [(&[&str], &str); 4] = [
    (
        &["need to clarify", "unclear"],
        "Clarify open requirements with the user",
    ),
    (&["research", "investigate"], "Research the open question"),
    (&["validate", "test"], "Validate assumptions with target users"),
    (&["document", "specify"], "Document the decisions made so far"),
];

/// Two standing suggestions per phase, independent of what was said.
fn phase_suggestions(phase: ConversationPhase) -> [&'static str; 2] {
    match phase {
        ConversationPhase::InitialDiscovery => [
            "Define target user personas",
            "Validate problem-solution fit",
        ],
        ConversationPhase::BusinessRequirements => [
            "Agree on measurable success metrics",
            "Draw explicit scope boundaries",
        ],
        ConversationPhase::TechnicalArchitecture => [
            "Sketch the core data model",
            "List external integration points",
        ],
        ConversationPhase::UserExperience => [
            "Walk the primary user journey end to end",
            "Review accessibility requirements",
        ],
        ConversationPhase::Infrastructure => [
            "Choose the deployment environment",
            "Define the observability baseline",
        ],
        ConversationPhase::TaskPlanning => [
            "Order increments by dependency",
            "Name the riskiest assumption to retire first",
        ],
        ConversationPhase::SpecificationGeneration => [
            "Review the generated specification",
            "Share the specification with stakeholders",
        ],
    }
}

/// De-duplicated action list: phase-transition entry first, then triggers
/// found in response text, then the standing per-phase pair.
pub fn suggested_actions(
    current_phase: ConversationPhase,
    next_phase: Option<ConversationPhase>,
    responses: &[PersonaResponse],
) -> Vec<String> {
    let mut actions: Vec<String> = Vec::new();
    let push_unique = |actions: &mut Vec<String>, action: String| {
        if !actions.contains(&action) {
            actions.push(action);
        }
    };

    if let Some(next) = next_phase {
        push_unique(&mut actions, format!("Move the conversation to {next}"));
    }

    for response in responses {
        let text = response.content.to_lowercase();
        for (phrases, action) in RESPONSE_TRIGGERS {
            if phrases.iter().any(|p| text.contains(p)) {
                push_unique(&mut actions, action.to_string());
            }
        }
    }

    for suggestion in phase_suggestions(current_phase) {
        push_unique(&mut actions, suggestion.to_string());
    }

    actions
}
