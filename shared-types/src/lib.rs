//! Shared types between the Roundtable server and its clients.
//!
//! Everything here crosses a process boundary: persona and phase
//! identifiers, stored conversation data, and the WebSocket wire protocol.
//! Serializable with serde for JSON over WebSocket/HTTP.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Identifiers
// ============================================================================

/// Unique identifier for a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The five canonical persona identifiers. Personas are referenced by id
/// everywhere; their behavioral profiles live in the server's registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PersonaId {
    ProductManagement,
    Architecture,
    Experience,
    Operations,
    Planning,
}

impl PersonaId {
    pub const ALL: [PersonaId; 5] = [
        PersonaId::ProductManagement,
        PersonaId::Architecture,
        PersonaId::Experience,
        PersonaId::Operations,
        PersonaId::Planning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaId::ProductManagement => "product-management",
            PersonaId::Architecture => "architecture",
            PersonaId::Experience => "experience",
            PersonaId::Operations => "operations",
            PersonaId::Planning => "planning",
        }
    }
}

impl std::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PersonaId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product-management" => Ok(PersonaId::ProductManagement),
            "architecture" => Ok(PersonaId::Architecture),
            "experience" => Ok(PersonaId::Experience),
            "operations" => Ok(PersonaId::Operations),
            "planning" => Ok(PersonaId::Planning),
            other => Err(format!("unknown persona id '{other}'")),
        }
    }
}

// ============================================================================
// Conversation Phases
// ============================================================================

/// One stage of the fixed 7-stage requirements-elicitation sequence.
/// The ordering is total and linear; phase never regresses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationPhase {
    InitialDiscovery,
    BusinessRequirements,
    TechnicalArchitecture,
    UserExperience,
    Infrastructure,
    TaskPlanning,
    SpecificationGeneration,
}

impl ConversationPhase {
    pub const ALL: [ConversationPhase; 7] = [
        ConversationPhase::InitialDiscovery,
        ConversationPhase::BusinessRequirements,
        ConversationPhase::TechnicalArchitecture,
        ConversationPhase::UserExperience,
        ConversationPhase::Infrastructure,
        ConversationPhase::TaskPlanning,
        ConversationPhase::SpecificationGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationPhase::InitialDiscovery => "initial-discovery",
            ConversationPhase::BusinessRequirements => "business-requirements",
            ConversationPhase::TechnicalArchitecture => "technical-architecture",
            ConversationPhase::UserExperience => "user-experience",
            ConversationPhase::Infrastructure => "infrastructure",
            ConversationPhase::TaskPlanning => "task-planning",
            ConversationPhase::SpecificationGeneration => "specification-generation",
        }
    }

    /// Zero-based position in the fixed ordering.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or(0)
    }

    /// The fixed linear successor. `None` only for the terminal phase.
    pub fn next(&self) -> Option<ConversationPhase> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationPhase::SpecificationGeneration)
    }
}

impl std::fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConversationPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConversationPhase::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown conversation phase '{s}'"))
    }
}

/// Rough complexity tier of the product idea under discussion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Simple => "simple",
            ComplexityTier::Moderate => "moderate",
            ComplexityTier::Complex => "complex",
        }
    }
}

impl std::str::FromStr for ComplexityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ComplexityTier::Simple),
            "moderate" => Ok(ComplexityTier::Moderate),
            "complex" => Ok(ComplexityTier::Complex),
            other => Err(format!("unknown complexity tier '{other}'")),
        }
    }
}

// ============================================================================
// Conversations and Messages
// ============================================================================

/// Who authored a stored message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageAuthor {
    User,
    Persona(PersonaId),
}

impl MessageAuthor {
    /// Wire-level message type: "user" or "ai".
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageAuthor::User => MessageKind::User,
            MessageAuthor::Persona(_) => MessageKind::Ai,
        }
    }

    pub fn persona(&self) -> Option<PersonaId> {
        match self {
            MessageAuthor::User => None,
            MessageAuthor::Persona(id) => Some(*id),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, MessageAuthor::User)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Ai,
}

/// One persisted conversation message, user- or persona-authored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    /// Message id (ULID, sortable by creation time)
    pub id: String,
    pub conversation_id: ConversationId,
    pub content: String,
    pub author: MessageAuthor,
    pub timestamp: DateTime<Utc>,
    /// Token count reported by the generator; absent for user messages
    pub tokens: Option<i64>,
    /// Generation latency; absent for user messages
    pub processing_time_ms: Option<i64>,
}

/// A persisted conversation. The current phase is a stored attribute and
/// survives reconnects; it only ever moves forward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub product_idea: String,
    pub target_users: Vec<String>,
    pub complexity: ComplexityTier,
    pub phase: ConversationPhase,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// WebSocket Wire Protocol
// ============================================================================

/// Stable error codes carried by the `error` event.
pub const ERROR_CONVERSATION_NOT_FOUND: &str = "CONVERSATION_NOT_FOUND";
pub const ERROR_JOIN_CONVERSATION: &str = "JOIN_CONVERSATION_ERROR";
pub const ERROR_AI_RESPONSE: &str = "AI_RESPONSE_ERROR";
pub const ERROR_SEND_MESSAGE: &str = "SEND_MESSAGE_ERROR";
pub const ERROR_INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";

/// Optional per-request context fields a client may supply alongside
/// `request-ai-response`. Stored conversation fields win when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_idea: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_users: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<ComplexityTier>,
}

/// Client → Server events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinConversation {
        conversation_id: ConversationId,
    },
    SendMessage {
        conversation_id: ConversationId,
        message: String,
    },
    RequestAiResponse {
        conversation_id: ConversationId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<ContextHint>,
    },
    TypingStart {
        conversation_id: ConversationId,
    },
    TypingStop {
        conversation_id: ConversationId,
    },
}

/// Server → Client events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Sent once per connection, immediately after the upgrade.
    ConnectionStatus {
        status: String,
    },
    /// Phase snapshot on join; broadcast again whenever the phase advances.
    ConversationUpdated {
        conversation_id: ConversationId,
        phase: ConversationPhase,
        active_personas: Vec<PersonaId>,
    },
    MessageReceived {
        id: String,
        conversation_id: ConversationId,
        content: String,
        message_type: MessageKind,
        timestamp: DateTime<Utc>,
    },
    AiTypingStart {
        persona: PersonaId,
        persona_name: String,
    },
    AiTypingEnd {
        persona: PersonaId,
        persona_name: String,
    },
    AiResponse {
        id: String,
        conversation_id: ConversationId,
        content: String,
        persona: PersonaId,
        persona_name: String,
        tokens: i64,
        processing_time_ms: i64,
        timestamp: DateTime<Utc>,
    },
    UserTyping {
        conversation_id: ConversationId,
        is_typing: bool,
    },
    /// Terminal signal: the final substantive phase completed and the
    /// artifact generator may take over.
    SpecificationsReady {
        conversation_id: ConversationId,
    },
    Error {
        message: String,
        code: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>, code: &str) -> Self {
        ServerEvent::Error {
            message: message.into(),
            code: code.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_generation() {
        let id1 = ConversationId::new();
        let id2 = ConversationId::new();
        assert_ne!(id1, id2);
        assert_eq!(id1.0.len(), 36); // UUID length
    }

    #[test]
    fn test_phase_ordering_is_total_and_acyclic() {
        let mut phase = ConversationPhase::InitialDiscovery;
        let mut visited = vec![phase];
        while let Some(next) = phase.next() {
            assert!(!visited.contains(&next), "cycle at {next}");
            visited.push(next);
            phase = next;
        }
        assert_eq!(visited.len(), 7);
        assert_eq!(phase, ConversationPhase::SpecificationGeneration);
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_phase_str_round_trip() {
        for phase in ConversationPhase::ALL {
            let parsed: ConversationPhase = phase.as_str().parse().unwrap();
            assert_eq!(parsed, phase);
        }
        assert!("not-a-phase".parse::<ConversationPhase>().is_err());
    }

    #[test]
    fn test_persona_id_str_round_trip() {
        for id in PersonaId::ALL {
            let parsed: PersonaId = id.as_str().parse().unwrap();
            assert_eq!(parsed, id);
        }
        assert!("ghost".parse::<PersonaId>().is_err());
    }

    #[test]
    fn test_client_event_wire_names() {
        let event = ClientEvent::JoinConversation {
            conversation_id: ConversationId("c1".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "join-conversation");
        assert_eq!(json["conversationId"], "c1");

        let parsed: ClientEvent = serde_json::from_value(serde_json::json!({
            "type": "request-ai-response",
            "conversationId": "c2",
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ClientEvent::RequestAiResponse {
                conversation_id: ConversationId("c2".to_string()),
                context: None,
            }
        );
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::AiResponse {
            id: "m1".to_string(),
            conversation_id: ConversationId("c1".to_string()),
            content: "hello".to_string(),
            persona: PersonaId::ProductManagement,
            persona_name: "Maya".to_string(),
            tokens: 42,
            processing_time_ms: 180,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ai-response");
        assert_eq!(json["persona"], "product-management");
        assert_eq!(json["processingTimeMs"], 180);
        assert!(json.get("processing_time_ms").is_none());
    }

    #[test]
    fn test_user_typing_event_shape() {
        let event = ServerEvent::UserTyping {
            conversation_id: ConversationId("c1".to_string()),
            is_typing: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user-typing");
        assert_eq!(json["isTyping"], false);
    }

    #[test]
    fn test_message_author_kind() {
        assert_eq!(MessageAuthor::User.kind(), MessageKind::User);
        let ai = MessageAuthor::Persona(PersonaId::Planning);
        assert_eq!(ai.kind(), MessageKind::Ai);
        assert_eq!(ai.persona(), Some(PersonaId::Planning));
        assert!(MessageAuthor::User.persona().is_none());
    }
}
