//! Websocket endpoint: one connection per socket, a dedicated writer task
//! draining the connection's event channel, and a read loop dispatching
//! client events into the session engine.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::ApiState;
use crate::session::{ConnectionId, SessionEngine, SessionError};
use shared_types::{
    ClientEvent, ServerEvent, ERROR_CONVERSATION_NOT_FOUND, ERROR_INVALID_PAYLOAD,
    ERROR_JOIN_CONVERSATION, ERROR_SEND_MESSAGE,
};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.engine))
}

async fn handle_socket(socket: WebSocket, engine: Arc<SessionEngine>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection_id = engine.connect(event_tx).await;

    // Writer task: the engine pushes events into the channel without ever
    // waiting on the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(error) => {
                    tracing::error!(%error, "failed to serialize server event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => dispatch(&engine, &connection_id, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    engine.disconnect(&connection_id).await;
    writer.abort();
}

async fn dispatch(engine: &Arc<SessionEngine>, connection_id: &ConnectionId, text: &str) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(error) => {
            engine
                .emit_to(
                    connection_id,
                    ServerEvent::error(format!("invalid payload: {error}"), ERROR_INVALID_PAYLOAD),
                )
                .await;
            return;
        }
    };

    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            if let Err(error) = engine.join(connection_id, &conversation_id).await {
                let code = match &error {
                    SessionError::ConversationNotFound(_) => ERROR_CONVERSATION_NOT_FOUND,
                    SessionError::Store(_) => ERROR_JOIN_CONVERSATION,
                };
                engine
                    .emit_to(connection_id, ServerEvent::error(error.to_string(), code))
                    .await;
            }
        }
        ClientEvent::SendMessage {
            conversation_id,
            message,
        } => {
            if let Err(error) = engine.submit_user_message(&conversation_id, &message).await {
                let code = match &error {
                    SessionError::ConversationNotFound(_) => ERROR_CONVERSATION_NOT_FOUND,
                    SessionError::Store(_) => ERROR_SEND_MESSAGE,
                };
                engine
                    .emit_to(connection_id, ServerEvent::error(error.to_string(), code))
                    .await;
            }
        }
        ClientEvent::RequestAiResponse {
            conversation_id,
            context,
        } => {
            // The turn can take seconds of paced delays; run it off the read
            // loop so the requester can keep typing meanwhile.
            let engine = engine.clone();
            let requester = connection_id.clone();
            tokio::spawn(async move {
                engine
                    .request_ai_turn(&requester, &conversation_id, context)
                    .await;
            });
        }
        ClientEvent::TypingStart { conversation_id } => {
            engine.typing_start(connection_id, &conversation_id).await;
        }
        ClientEvent::TypingStop { conversation_id } => {
            engine.typing_stop(connection_id, &conversation_id).await;
        }
    }
}
