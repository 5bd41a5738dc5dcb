//! Full-stack tests: real axum server on an ephemeral port, SQLite store in
//! a temp directory, scripted generator, tokio-tungstenite clients.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use roundtable::api;
use roundtable::generation::scripted::ScriptedGenerator;
use roundtable::orchestrator::Orchestrator;
use roundtable::personas::PersonaRegistry;
use roundtable::session::{SessionEngine, TurnPacing};
use roundtable::store::{
    ConversationStore, SharedConversationStore, SqliteConversationStore,
};
use shared_types::{
    ComplexityTier, Conversation, ConversationId, ConversationPhase, PersonaId,
};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: String,
    store: SharedConversationStore,
    generator: Arc<ScriptedGenerator>,
    _dir: tempfile::TempDir,
}

async fn start_server() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let db_url = format!("sqlite:{}", dir.path().join("test.db").display());
    let store: SharedConversationStore =
        Arc::new(SqliteConversationStore::connect(&db_url).await.unwrap());
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

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    let app = api::router(engine);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        store,
        generator,
        _dir: dir,
    }
}

async fn seed_conversation(server: &TestServer, phase: ConversationPhase) -> Conversation {
    let conversation = Conversation {
        id: ConversationId::new(),
        product_idea: "a todo app".to_string(),
        target_users: vec!["busy parents".to_string()],
        complexity: ComplexityTier::Simple,
        phase,
        created_at: chrono::Utc::now(),
    };
    server.store.create_conversation(&conversation).await.unwrap();
    conversation
}

/// Connect and consume the connection-status greeting.
async fn connect_client(server: &TestServer) -> WsClient {
    let (mut ws, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();
    let greeting = recv_json(&mut ws).await;
    assert_eq!(greeting["type"], "connection-status");
    assert_eq!(greeting["status"], "connected");
    ws
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_join_delivers_phase_snapshot() {
    let server = start_server().await;
    let convo = seed_conversation(&server, ConversationPhase::InitialDiscovery).await;
    let mut ws = connect_client(&server).await;

    send_json(
        &mut ws,
        json!({ "type": "join-conversation", "conversationId": convo.id.as_str() }),
    )
    .await;

    let event = recv_json(&mut ws).await;
    assert_eq!(event["type"], "conversation-updated");
    assert_eq!(event["conversationId"], convo.id.as_str());
    assert_eq!(event["phase"], "initial-discovery");
    assert_eq!(event["activePersonas"], json!(["product-management"]));
}

#[tokio::test]
async fn test_join_unknown_conversation_reports_error_code() {
    let server = start_server().await;
    let mut ws = connect_client(&server).await;

    send_json(
        &mut ws,
        json!({ "type": "join-conversation", "conversationId": "missing" }),
    )
    .await;

    let event = recv_json(&mut ws).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], "CONVERSATION_NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_payload_reports_invalid_payload() {
    let server = start_server().await;
    let mut ws = connect_client(&server).await;

    ws.send(Message::Text("{not json".to_string())).await.unwrap();

    let event = recv_json(&mut ws).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn test_discovery_turn_end_to_end() {
    let server = start_server().await;
    let convo = seed_conversation(&server, ConversationPhase::InitialDiscovery).await;
    let mut ws = connect_client(&server).await;

    send_json(
        &mut ws,
        json!({ "type": "join-conversation", "conversationId": convo.id.as_str() }),
    )
    .await;
    recv_json(&mut ws).await; // phase snapshot

    send_json(
        &mut ws,
        json!({
            "type": "send-message",
            "conversationId": convo.id.as_str(),
            "message": "I want a todo app"
        }),
    )
    .await;
    let echoed = recv_json(&mut ws).await;
    assert_eq!(echoed["type"], "message-received");
    assert_eq!(echoed["content"], "I want a todo app");
    assert_eq!(echoed["messageType"], "user");

    send_json(
        &mut ws,
        json!({ "type": "request-ai-response", "conversationId": convo.id.as_str() }),
    )
    .await;

    let typing_start = recv_json(&mut ws).await;
    assert_eq!(typing_start["type"], "ai-typing-start");
    assert_eq!(typing_start["persona"], "product-management");
    assert_eq!(typing_start["personaName"], "Maya Okafor");

    let typing_end = recv_json(&mut ws).await;
    assert_eq!(typing_end["type"], "ai-typing-end");

    let response = recv_json(&mut ws).await;
    assert_eq!(response["type"], "ai-response");
    assert_eq!(response["persona"], "product-management");
    assert!(response["tokens"].as_i64().unwrap() > 0);
    assert!(response["content"].as_str().unwrap().contains("Maya"));

    // phase is not terminal, so nothing else follows; the next inbound
    // message's echo must be the very next event
    send_json(
        &mut ws,
        json!({
            "type": "send-message",
            "conversationId": convo.id.as_str(),
            "message": "tell me more"
        }),
    )
    .await;
    let next = recv_json(&mut ws).await;
    assert_eq!(next["type"], "message-received");
}

#[tokio::test]
async fn test_task_planning_completion_emits_specifications_ready() {
    let server = start_server().await;
    let convo = seed_conversation(&server, ConversationPhase::TaskPlanning).await;
    server
        .generator
        .push_script(PersonaId::Planning, "The plan is completed.")
        .await;
    let mut ws = connect_client(&server).await;

    send_json(
        &mut ws,
        json!({ "type": "join-conversation", "conversationId": convo.id.as_str() }),
    )
    .await;
    recv_json(&mut ws).await;

    send_json(
        &mut ws,
        json!({
            "type": "send-message",
            "conversationId": convo.id.as_str(),
            "message": "looks good to me"
        }),
    )
    .await;
    recv_json(&mut ws).await;

    send_json(
        &mut ws,
        json!({ "type": "request-ai-response", "conversationId": convo.id.as_str() }),
    )
    .await;

    assert_eq!(recv_json(&mut ws).await["type"], "ai-typing-start");
    assert_eq!(recv_json(&mut ws).await["type"], "ai-typing-end");
    let response = recv_json(&mut ws).await;
    assert_eq!(response["type"], "ai-response");
    assert_eq!(response["persona"], "planning");

    let updated = recv_json(&mut ws).await;
    assert_eq!(updated["type"], "conversation-updated");
    assert_eq!(updated["phase"], "specification-generation");

    let ready = recv_json(&mut ws).await;
    assert_eq!(ready["type"], "specifications-ready");
    assert_eq!(ready["conversationId"], convo.id.as_str());

    // phase survives in the store
    let reread = server.store.get_conversation(&convo.id).await.unwrap();
    assert_eq!(reread.phase, ConversationPhase::SpecificationGeneration);
}

#[tokio::test]
async fn test_peer_sees_user_typing_transitions() {
    let server = start_server().await;
    let convo = seed_conversation(&server, ConversationPhase::InitialDiscovery).await;
    let mut typer = connect_client(&server).await;
    let mut watcher = connect_client(&server).await;

    for ws in [&mut typer, &mut watcher] {
        send_json(
            ws,
            json!({ "type": "join-conversation", "conversationId": convo.id.as_str() }),
        )
        .await;
        recv_json(ws).await;
    }

    send_json(
        &mut typer,
        json!({ "type": "typing-start", "conversationId": convo.id.as_str() }),
    )
    .await;
    let started = recv_json(&mut watcher).await;
    assert_eq!(started["type"], "user-typing");
    assert_eq!(started["isTyping"], true);

    send_json(
        &mut typer,
        json!({ "type": "typing-stop", "conversationId": convo.id.as_str() }),
    )
    .await;
    let stopped = recv_json(&mut watcher).await;
    assert_eq!(stopped["type"], "user-typing");
    assert_eq!(stopped["isTyping"], false);
}

#[tokio::test]
async fn test_rest_surface_round_trip() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", server.addr);

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let created: Value = client
        .post(format!("{base}/conversations"))
        .json(&json!({
            "productIdea": "a recipe box",
            "targetUsers": ["home cooks"],
            "complexity": "simple"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["phase"], "initial-discovery");

    let fetched: Value = client
        .get(format!("{base}/conversations/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["product_idea"], "a recipe box");

    let messages: Value = client
        .get(format!("{base}/conversations/{id}/messages"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(messages, json!([]));

    let progress: Value = client
        .get(format!("{base}/conversations/{id}/progress"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(progress["overallProgressPercent"], 0);

    let missing = client
        .get(format!("{base}/conversations/none"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resolve_conflict_endpoint_answers_as_planning() {
    let server = start_server().await;
    let convo = seed_conversation(&server, ConversationPhase::TechnicalArchitecture).await;
    server
        .generator
        .push_script(PersonaId::Planning, "Start simple, revisit later.")
        .await;

    let client = reqwest::Client::new();
    let resolved: Value = client
        .post(format!(
            "http://{}/conversations/{}/resolve-conflict",
            server.addr,
            convo.id.as_str()
        ))
        .json(&json!({
            "responses": [
                { "persona": "architecture", "content": "We need event sourcing." },
                { "persona": "experience", "content": "We need zero setup." }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(resolved["persona"], "planning");
    assert_eq!(resolved["content"], "Start simple, revisit later.");
}
