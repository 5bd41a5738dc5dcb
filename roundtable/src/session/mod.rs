//! Real-Time Session Engine.
//!
//! Owns every live connection, the per-conversation rooms, and the
//! typing-presence sets. All mutation goes through the methods here; the
//! maps are never handed out by reference. Events reach clients through
//! per-connection unbounded senders, so emission never blocks the engine.

pub mod turn;

pub use turn::TurnPacing;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

use crate::orchestrator::{selection, ConversationContext, Orchestrator};
use crate::store::{ConversationStore, SharedConversationStore, StoreError};
use shared_types::{ConversationId, MessageAuthor, ServerEvent, StoredMessage};

pub type ConnectionId = String;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SessionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => SessionError::ConversationNotFound(id),
            other => SessionError::Store(other),
        }
    }
}

/// Aggregate observability snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionStats {
    pub total_connections: usize,
    pub active_conversations: usize,
    pub typing_connections: usize,
}

#[derive(Default)]
struct SessionState {
    connections: HashMap<ConnectionId, UnboundedSender<ServerEvent>>,
    rooms: HashMap<ConversationId, HashSet<ConnectionId>>,
    typing: HashMap<ConversationId, HashSet<ConnectionId>>,
    /// Per-conversation single-flight guards for AI turns.
    turn_locks: HashMap<ConversationId, Arc<Mutex<()>>>,
}

pub struct SessionEngine {
    state: Mutex<SessionState>,
    store: SharedConversationStore,
    orchestrator: Arc<Orchestrator>,
    pacing: TurnPacing,
}

impl SessionEngine {
    pub fn new(
        store: SharedConversationStore,
        orchestrator: Arc<Orchestrator>,
        pacing: TurnPacing,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            store,
            orchestrator,
            pacing,
        }
    }

    pub fn store(&self) -> &SharedConversationStore {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Register a live connection and greet it. The returned id keys every
    /// later call for this connection.
    pub async fn connect(&self, sender: UnboundedSender<ServerEvent>) -> ConnectionId {
        let connection_id = ulid::Ulid::new().to_string();
        {
            let mut state = self.state.lock().await;
            state.connections.insert(connection_id.clone(), sender);
        }
        self.emit_to(
            &connection_id,
            ServerEvent::ConnectionStatus {
                status: "connected".to_string(),
            },
        )
        .await;
        tracing::debug!(connection = %connection_id, "connection registered");
        connection_id
    }

    /// Drop the connection from every room and typing set. Rooms emptied by
    /// this removal disappear; typing sets emptied by it fire one stop event.
    pub async fn disconnect(&self, connection_id: &ConnectionId) {
        let stopped_typing: Vec<ConversationId>;
        {
            let mut state = self.state.lock().await;
            state.connections.remove(connection_id);

            let mut emptied_rooms = Vec::new();
            state.rooms.retain(|conversation_id, members| {
                members.remove(connection_id);
                if members.is_empty() {
                    emptied_rooms.push(conversation_id.clone());
                }
                !members.is_empty()
            });

            // Drop the turn lock with the room, unless a turn still holds a
            // clone of it.
            for conversation_id in &emptied_rooms {
                let idle = state
                    .turn_locks
                    .get(conversation_id)
                    .is_some_and(|lock| Arc::strong_count(lock) == 1);
                if idle {
                    state.turn_locks.remove(conversation_id);
                }
            }

            let mut stopped = Vec::new();
            state.typing.retain(|conversation_id, typers| {
                if typers.remove(connection_id) && typers.is_empty() {
                    stopped.push(conversation_id.clone());
                }
                !typers.is_empty()
            });
            stopped_typing = stopped;
        }

        for conversation_id in stopped_typing {
            self.broadcast(
                &conversation_id,
                ServerEvent::UserTyping {
                    conversation_id: conversation_id.clone(),
                    is_typing: false,
                },
            )
            .await;
        }
        tracing::debug!(connection = %connection_id, "connection removed");
    }

    /// Add the connection to the conversation's room and send it a phase
    /// snapshot. The snapshot goes to the joiner only.
    pub async fn join(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
    ) -> Result<(), SessionError> {
        let conversation = self.store.get_conversation(conversation_id).await?;
        let history = self.store.messages(conversation_id).await?;

        {
            let mut state = self.state.lock().await;
            state
                .rooms
                .entry(conversation_id.clone())
                .or_default()
                .insert(connection_id.clone());
        }

        let active_personas = selection::active_personas(
            self.orchestrator.registry(),
            conversation.phase,
            &history,
        );
        self.emit_to(
            connection_id,
            ServerEvent::ConversationUpdated {
                conversation_id: conversation_id.clone(),
                phase: conversation.phase,
                active_personas,
            },
        )
        .await;
        tracing::info!(connection = %connection_id, conversation = %conversation_id, "joined room");
        Ok(())
    }

    /// Persist a user message and echo it to the whole room, sender included.
    pub async fn submit_user_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<StoredMessage, SessionError> {
        let message = StoredMessage {
            id: ulid::Ulid::new().to_string(),
            conversation_id: conversation_id.clone(),
            content: text.to_string(),
            author: MessageAuthor::User,
            timestamp: chrono::Utc::now(),
            tokens: None,
            processing_time_ms: None,
        };
        self.store.add_message(&message).await?;

        self.broadcast(
            conversation_id,
            ServerEvent::MessageReceived {
                id: message.id.clone(),
                conversation_id: conversation_id.clone(),
                content: message.content.clone(),
                message_type: message.author.kind(),
                timestamp: message.timestamp,
            },
        )
        .await;
        Ok(message)
    }

    /// First typer in a room notifies everyone else; later typers are silent.
    pub async fn typing_start(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
    ) {
        let became_nonempty = {
            let mut state = self.state.lock().await;
            let typers = state.typing.entry(conversation_id.clone()).or_default();
            let was_empty = typers.is_empty();
            typers.insert(connection_id.clone());
            was_empty
        };
        if became_nonempty {
            self.broadcast_except(
                conversation_id,
                Some(connection_id),
                ServerEvent::UserTyping {
                    conversation_id: conversation_id.clone(),
                    is_typing: true,
                },
            )
            .await;
        }
    }

    /// The stop event fires exactly once, when the last typer stops.
    pub async fn typing_stop(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
    ) {
        let became_empty = {
            let mut state = self.state.lock().await;
            match state.typing.get_mut(conversation_id) {
                Some(typers) => {
                    let removed = typers.remove(connection_id);
                    let empty = typers.is_empty();
                    if empty {
                        state.typing.remove(conversation_id);
                    }
                    removed && empty
                }
                None => false,
            }
        };
        if became_empty {
            self.broadcast_except(
                conversation_id,
                Some(connection_id),
                ServerEvent::UserTyping {
                    conversation_id: conversation_id.clone(),
                    is_typing: false,
                },
            )
            .await;
        }
    }

    pub async fn broadcast(&self, conversation_id: &ConversationId, event: ServerEvent) {
        self.broadcast_except(conversation_id, None, event).await;
    }

    async fn broadcast_except(
        &self,
        conversation_id: &ConversationId,
        exclude: Option<&ConnectionId>,
        event: ServerEvent,
    ) {
        let state = self.state.lock().await;
        let Some(members) = state.rooms.get(conversation_id) else {
            return;
        };
        for member in members {
            if Some(member) == exclude {
                continue;
            }
            if let Some(sender) = state.connections.get(member) {
                // A closed channel means the socket is tearing down; the
                // disconnect path cleans the maps up.
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Deliver to one connection, ignoring rooms entirely.
    pub async fn emit_to(&self, connection_id: &ConnectionId, event: ServerEvent) {
        let state = self.state.lock().await;
        if let Some(sender) = state.connections.get(connection_id) {
            let _ = sender.send(event);
        }
    }

    pub async fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.state.lock().await.rooms.contains_key(conversation_id)
    }

    pub async fn member_count(&self, conversation_id: &ConversationId) -> usize {
        self.state
            .lock()
            .await
            .rooms
            .get(conversation_id)
            .map_or(0, HashSet::len)
    }

    pub async fn stats(&self) -> SessionStats {
        let state = self.state.lock().await;
        SessionStats {
            total_connections: state.connections.len(),
            active_conversations: state.rooms.len(),
            typing_connections: state.typing.values().map(HashSet::len).sum(),
        }
    }

    async fn turn_lock(&self, conversation_id: &ConversationId) -> Arc<Mutex<()>> {
        let mut state = self.state.lock().await;
        state
            .turn_locks
            .entry(conversation_id.clone())
            .or_default()
            .clone()
    }

    fn context_for(
        &self,
        conversation: &shared_types::Conversation,
        history: Vec<StoredMessage>,
        hint: Option<&shared_types::ContextHint>,
    ) -> ConversationContext {
        let context = ConversationContext::build(conversation, history);
        match hint {
            Some(hint) => context.apply_hint(hint),
            None => context,
        }
    }
}
