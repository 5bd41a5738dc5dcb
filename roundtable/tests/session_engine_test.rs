//! Session engine semantics against the in-memory store, with fake
//! connections built from raw channels and instant pacing.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use roundtable::generation::scripted::ScriptedGenerator;
use roundtable::orchestrator::Orchestrator;
use roundtable::personas::PersonaRegistry;
use roundtable::session::{ConnectionId, SessionEngine, SessionError, TurnPacing};
use roundtable::store::{ConversationStore, MemoryConversationStore};
use shared_types::{
    ComplexityTier, Conversation, ConversationId, ConversationPhase, MessageAuthor, PersonaId,
    ServerEvent, StoredMessage,
};

struct Harness {
    engine: Arc<SessionEngine>,
    store: Arc<MemoryConversationStore>,
    generator: Arc<ScriptedGenerator>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryConversationStore::new());
    let generator = Arc::new(ScriptedGenerator::new());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(PersonaRegistry::new()),
        generator.clone(),
    ));
    let engine = Arc::new(SessionEngine::new(
        store.clone(),
        orchestrator,
        TurnPacing::instant(),
    ));
    Harness {
        engine,
        store,
        generator,
    }
}

async fn seed_conversation(store: &MemoryConversationStore, phase: ConversationPhase) -> Conversation {
    let conversation = Conversation {
        id: ConversationId::new(),
        product_idea: "a todo app".to_string(),
        target_users: vec![],
        complexity: ComplexityTier::Simple,
        phase,
        created_at: chrono::Utc::now(),
    };
    store.create_conversation(&conversation).await.unwrap();
    conversation
}

async fn fake_connection(engine: &SessionEngine) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = engine.connect(tx).await;
    // swallow the connection-status greeting
    let greeting = rx.recv().await.unwrap();
    assert!(matches!(greeting, ServerEvent::ConnectionStatus { .. }));
    (id, rx)
}

fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_join_unknown_conversation_fails() {
    let h = harness();
    let (conn, _rx) = fake_connection(&h.engine).await;
    let missing = ConversationId::new();
    let result = h.engine.join(&conn, &missing).await;
    assert!(matches!(
        result,
        Err(SessionError::ConversationNotFound(id)) if id == missing
    ));
    assert!(!h.engine.is_active(&missing).await);
}

#[tokio::test]
async fn test_join_sends_phase_snapshot_to_joiner_only() {
    let h = harness();
    let convo = seed_conversation(&h.store, ConversationPhase::InitialDiscovery).await;
    let (a, mut rx_a) = fake_connection(&h.engine).await;
    let (_b, mut rx_b) = fake_connection(&h.engine).await;

    h.engine.join(&a, &convo.id).await.unwrap();

    let events = drain(&mut rx_a);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ServerEvent::ConversationUpdated {
            phase,
            active_personas,
            ..
        } => {
            assert_eq!(*phase, ConversationPhase::InitialDiscovery);
            assert_eq!(active_personas, &vec![PersonaId::ProductManagement]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(drain(&mut rx_b).is_empty());
    assert_eq!(h.engine.member_count(&convo.id).await, 1);
}

#[tokio::test]
async fn test_user_message_is_echoed_to_the_whole_room() {
    let h = harness();
    let convo = seed_conversation(&h.store, ConversationPhase::InitialDiscovery).await;
    let (a, mut rx_a) = fake_connection(&h.engine).await;
    let (b, mut rx_b) = fake_connection(&h.engine).await;
    h.engine.join(&a, &convo.id).await.unwrap();
    h.engine.join(&b, &convo.id).await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    h.engine
        .submit_user_message(&convo.id, "I want a todo app")
        .await
        .unwrap();

    for rx in [&mut rx_a, &mut rx_b] {
        let events = drain(rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ServerEvent::MessageReceived { content, .. } if content == "I want a todo app"
        ));
    }
    let stored = h.store.messages(&convo.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].author.is_user());
}

#[tokio::test]
async fn test_typing_stop_fires_once_after_the_last_typer_stops() {
    let h = harness();
    let convo = seed_conversation(&h.store, ConversationPhase::InitialDiscovery).await;
    let (a, mut rx_a) = fake_connection(&h.engine).await;
    let (b, mut rx_b) = fake_connection(&h.engine).await;
    let (c, mut rx_c) = fake_connection(&h.engine).await;
    for conn in [&a, &b, &c] {
        h.engine.join(conn, &convo.id).await.unwrap();
    }
    drain(&mut rx_a);
    drain(&mut rx_b);
    drain(&mut rx_c);

    h.engine.typing_start(&a, &convo.id).await;
    // first typer notifies the others, never itself
    assert!(drain(&mut rx_a).is_empty());
    let started = drain(&mut rx_b);
    assert_eq!(started.len(), 1);
    assert!(matches!(
        started[0],
        ServerEvent::UserTyping { is_typing: true, .. }
    ));

    // second typer is silent, the room already shows typing
    h.engine.typing_start(&b, &convo.id).await;
    assert_eq!(drain(&mut rx_c).len(), 1); // only the first start

    h.engine.typing_stop(&a, &convo.id).await;
    assert!(drain(&mut rx_c).is_empty());

    h.engine.typing_stop(&b, &convo.id).await;
    let events = drain(&mut rx_c);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        ServerEvent::UserTyping { is_typing: false, .. }
    ));
}

#[tokio::test]
async fn test_disconnect_cleans_rooms_and_typing() {
    let h = harness();
    let convo = seed_conversation(&h.store, ConversationPhase::InitialDiscovery).await;
    let (a, mut rx_a) = fake_connection(&h.engine).await;
    let (b, mut rx_b) = fake_connection(&h.engine).await;
    h.engine.join(&a, &convo.id).await.unwrap();
    h.engine.join(&b, &convo.id).await.unwrap();
    h.engine.typing_start(&a, &convo.id).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    h.engine.disconnect(&a).await;

    // the sole typer left, so the room hears exactly one stop event
    let events = drain(&mut rx_b);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        ServerEvent::UserTyping { is_typing: false, .. }
    ));
    assert!(h.engine.is_active(&convo.id).await);
    assert_eq!(h.engine.member_count(&convo.id).await, 1);

    h.engine.disconnect(&b).await;
    assert!(!h.engine.is_active(&convo.id).await);

    let stats = h.engine.stats().await;
    assert_eq!(stats.total_connections, 0);
    assert_eq!(stats.active_conversations, 0);
    assert_eq!(stats.typing_connections, 0);
}

#[tokio::test]
async fn test_ai_turn_is_a_noop_when_latest_message_is_ai_authored() {
    let h = harness();
    let convo = seed_conversation(&h.store, ConversationPhase::InitialDiscovery).await;
    let (conn, mut rx) = fake_connection(&h.engine).await;
    h.engine.join(&conn, &convo.id).await.unwrap();
    drain(&mut rx);

    h.store
        .add_message(&StoredMessage {
            id: ulid::Ulid::new().to_string(),
            conversation_id: convo.id.clone(),
            content: "Dana here.".to_string(),
            author: MessageAuthor::Persona(PersonaId::Planning),
            timestamp: chrono::Utc::now(),
            tokens: Some(2),
            processing_time_ms: Some(5),
        })
        .await
        .unwrap();

    h.engine.request_ai_turn(&conn, &convo.id, None).await;

    assert!(drain(&mut rx).is_empty());
    assert_eq!(h.store.messages(&convo.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ai_turn_event_ordering() {
    let h = harness();
    let convo = seed_conversation(&h.store, ConversationPhase::InitialDiscovery).await;
    let (conn, mut rx) = fake_connection(&h.engine).await;
    h.engine.join(&conn, &convo.id).await.unwrap();
    h.engine
        .submit_user_message(&convo.id, "I want a todo app")
        .await
        .unwrap();
    drain(&mut rx);

    h.engine.request_ai_turn(&conn, &convo.id, None).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 3);
    assert!(matches!(
        &events[0],
        ServerEvent::AiTypingStart { persona: PersonaId::ProductManagement, persona_name }
            if persona_name == "Maya Okafor"
    ));
    assert!(matches!(
        &events[1],
        ServerEvent::AiTypingEnd { persona: PersonaId::ProductManagement, .. }
    ));
    match &events[2] {
        ServerEvent::AiResponse {
            persona, tokens, ..
        } => {
            assert_eq!(*persona, PersonaId::ProductManagement);
            assert!(*tokens > 0);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let stored = h.store.messages(&convo.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(
        stored[1].author,
        MessageAuthor::Persona(PersonaId::ProductManagement)
    );
}

#[tokio::test]
async fn test_completed_task_planning_turn_broadcasts_specifications_ready() {
    let h = harness();
    let convo = seed_conversation(&h.store, ConversationPhase::TaskPlanning).await;
    let (conn, mut rx) = fake_connection(&h.engine).await;
    h.engine.join(&conn, &convo.id).await.unwrap();
    h.engine
        .submit_user_message(&convo.id, "looks good to me")
        .await
        .unwrap();
    drain(&mut rx);

    h.generator
        .push_script(PersonaId::Planning, "The plan is completed.")
        .await;
    h.engine.request_ai_turn(&conn, &convo.id, None).await;

    let events = drain(&mut rx);
    // typing-start, typing-end, ai-response, conversation-updated, specifications-ready
    assert_eq!(events.len(), 5);
    assert!(matches!(
        &events[3],
        ServerEvent::ConversationUpdated { phase: ConversationPhase::SpecificationGeneration, .. }
    ));
    assert!(matches!(&events[4], ServerEvent::SpecificationsReady { .. }));

    let reread = h.store.get_conversation(&convo.id).await.unwrap();
    assert_eq!(reread.phase, ConversationPhase::SpecificationGeneration);
}

#[tokio::test]
async fn test_ai_turn_error_goes_to_the_requester_only() {
    let h = harness();
    let (conn, mut rx) = fake_connection(&h.engine).await;
    let missing = ConversationId::new();

    h.engine.request_ai_turn(&conn, &missing, None).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ServerEvent::Error { code, .. } if code == shared_types::ERROR_CONVERSATION_NOT_FOUND
    ));
}
