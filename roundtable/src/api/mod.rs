//! HTTP surface: health, stats, conversation CRUD, conflict resolution, and
//! the websocket upgrade.

pub mod websocket;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::orchestrator::{phase_progress, ConversationContext, PersonaResponse};
use crate::session::{SessionEngine, SessionError};
use crate::store::{ConversationStore, StoreError};
use shared_types::{
    ComplexityTier, Conversation, ConversationId, ConversationPhase, PersonaId, StoredMessage,
};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<SessionEngine>,
}

pub fn router(engine: Arc<SessionEngine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ws", get(websocket::ws_handler))
        .route("/conversations", post(create_conversation))
        .route("/conversations/{id}", get(get_conversation))
        .route("/conversations/{id}/messages", get(get_messages))
        .route("/conversations/{id}/progress", get(get_progress))
        .route(
            "/conversations/{id}/resolve-conflict",
            post(resolve_conflict),
        )
        .with_state(ApiState { engine })
}

enum ApiError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => ApiError::NotFound(format!("conversation {id} not found")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::ConversationNotFound(id) => {
                ApiError::NotFound(format!("conversation {id} not found"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats(State(state): State<ApiState>) -> Json<crate::session::SessionStats> {
    Json(state.engine.stats().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationRequest {
    product_idea: String,
    #[serde(default)]
    target_users: Vec<String>,
    #[serde(default)]
    complexity: ComplexityTier,
}

async fn create_conversation(
    State(state): State<ApiState>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let conversation = Conversation {
        id: ConversationId::new(),
        product_idea: request.product_idea,
        target_users: request.target_users,
        complexity: request.complexity,
        phase: ConversationPhase::InitialDiscovery,
        created_at: chrono::Utc::now(),
    };
    state.engine.store().create_conversation(&conversation).await?;
    tracing::info!(conversation = %conversation.id, "conversation created");
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_conversation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state
        .engine
        .store()
        .get_conversation(&ConversationId(id))
        .await?;
    Ok(Json(conversation))
}

async fn get_messages(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    let messages = state.engine.store().messages(&ConversationId(id)).await?;
    Ok(Json(messages))
}

async fn get_progress(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conversation = state
        .engine
        .store()
        .get_conversation(&ConversationId(id))
        .await?;
    let progress = phase_progress(conversation.phase);
    Ok(Json(json!({
        "currentPhase": progress.current_phase,
        "completedPhases": progress.completed_phases,
        "nextPhase": progress.next_phase,
        "overallProgressPercent": progress.overall_progress_percent,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictingResponse {
    persona: PersonaId,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveConflictRequest {
    responses: Vec<ConflictingResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveConflictResponse {
    persona: PersonaId,
    content: String,
    tokens: i64,
    processing_time_ms: i64,
}

async fn resolve_conflict(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveConflictRequest>,
) -> Result<Json<ResolveConflictResponse>, ApiError> {
    let conversation_id = ConversationId(id);
    let conversation = state.engine.store().get_conversation(&conversation_id).await?;
    let history = state.engine.store().messages(&conversation_id).await?;
    let context = ConversationContext::build(&conversation, history);

    let conflicting: Vec<PersonaResponse> = request
        .responses
        .into_iter()
        .map(|r| PersonaResponse {
            persona: r.persona,
            content: r.content,
            tokens: 0,
            processing_time_ms: 0,
        })
        .collect();

    let resolved = state
        .engine
        .orchestrator()
        .resolve_conflict(&context, &conflicting)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(ResolveConflictResponse {
        persona: resolved.persona,
        content: resolved.content,
        tokens: resolved.tokens,
        processing_time_ms: resolved.processing_time_ms,
    }))
}
