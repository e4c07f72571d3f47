//! REST API server for the stock market assistant
//!
//! Keeps one conversation per session in memory and runs a graph turn per
//! chat request.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::agents::AgentFactory;
use crate::audit::{AuditLog, TurnRecord};
use crate::config::Settings;
use crate::error::AssistantError;
use crate::graph::{route_after_router, TurnGraph};
use crate::models::ConversationMessage;
use crate::state::{ConversationState, SessionStore, Tracer};

/// Answer used when a turn completes without producing any text
pub const FALLBACK_ANSWER: &str = "I'm sorry, I couldn't process your request.";

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub turn_id: Uuid,
    pub answer: String,
    pub route: String,
    pub messages: Vec<ConversationMessage>,
    pub execution_path: Vec<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn reject(status: StatusCode, message: impl Into<String>) -> ApiResult {
    (status, Json(ApiResponse::error(message.into())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub settings: Arc<Settings>,
    pub agents: Arc<dyn AgentFactory>,
    pub sessions: Arc<dyn SessionStore>,
    pub audit: Arc<AuditLog>,
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiResult> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| reject(StatusCode::BAD_REQUEST, format!("invalid session id: {}", raw)))
}

fn failure_status(error: &AssistantError) -> StatusCode {
    let cause = match error {
        AssistantError::TurnAborted { source, .. } => source.as_ref(),
        other => other,
    };

    if cause.is_collaborator_failure() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> ApiResult {
    if req.message.trim().is_empty() {
        return reject(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    let api_key = match state.settings.resolve_api_key(req.api_key.as_deref()) {
        Ok(key) => key,
        Err(e) => return reject(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let session_id = match req.session_id.as_deref() {
        Some(raw) => match parse_session_id(raw) {
            Ok(id) => id,
            Err(rejection) => return rejection,
        },
        None => Uuid::new_v4(),
    };

    let agents = match state.agents.build(&api_key) {
        Ok(agents) => agents,
        Err(e) => return reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let graph = TurnGraph::new(agents, Tracer::new(state.settings.graph_tracing));

    // The session stays locked for the whole turn
    let mut stored = state.sessions.acquire(session_id).await;

    info!(session_id = %session_id, "Running chat turn");

    let input = ConversationState::next_turn(stored.as_ref(), req.message, Some(api_key));
    let started = Instant::now();

    let final_state = match graph.run(input).await {
        Ok(final_state) => final_state,
        Err(failure) => {
            let error: AssistantError = failure.into();
            error!(session_id = %session_id, error = %error, "Chat turn failed");
            return reject(failure_status(&error), error.to_string());
        }
    };

    let record = TurnRecord::from_state(Some(session_id), &final_state, started.elapsed());
    let turn_id = match state.audit.record(record).await {
        Ok(id) => id,
        Err(e) => return reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let answer = final_state
        .agent_response
        .clone()
        .filter(|answer| !answer.is_empty())
        .unwrap_or_else(|| FALLBACK_ANSWER.to_string());

    let response = ChatResponse {
        session_id,
        turn_id,
        answer,
        route: route_after_router(final_state.router_response.as_deref())
            .name()
            .to_string(),
        messages: final_state.messages().to_vec(),
        execution_path: final_state.execution_path.clone(),
    };

    *stored = Some(final_state);

    (StatusCode::OK, Json(ApiResponse::success(response)))
}

/// =============================
/// Session Endpoints
/// =============================

async fn session_messages(State(state): State<ApiState>, Path(raw_id): Path<String>) -> ApiResult {
    let session_id = match parse_session_id(&raw_id) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };

    match state.sessions.messages(session_id).await {
        Some(messages) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
                "messages": messages,
            }))),
        ),
        None => reject(StatusCode::NOT_FOUND, format!("unknown session: {}", session_id)),
    }
}

async fn session_turns(State(state): State<ApiState>, Path(raw_id): Path<String>) -> ApiResult {
    let session_id = match parse_session_id(&raw_id) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };

    let ids = match state.audit.list_for_session(session_id).await {
        Ok(ids) => ids,
        Err(e) => return reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut turns = Vec::with_capacity(ids.len());
    for id in ids {
        match state.audit.get(id).await {
            Ok(Some(record)) => turns.push(record),
            Ok(None) => {}
            Err(e) => return reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "session_id": session_id,
            "turns": turns,
        }))),
    )
}

async fn clear_session(State(state): State<ApiState>, Path(raw_id): Path<String>) -> ApiResult {
    let session_id = match parse_session_id(&raw_id) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };

    // Clearing the slot first waits out a running turn, whose record lands before the purge
    let had_state = state.sessions.clear(session_id).await;
    let removed_turns = match state.audit.remove_session(session_id).await {
        Ok(removed) => removed,
        Err(e) => return reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    if had_state || removed_turns > 0 {
        info!(session_id = %session_id, removed_turns, "Cleared chat history");
        (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
                "cleared": true,
                "removed_turns": removed_turns,
            }))),
        )
    } else {
        reject(StatusCode::NOT_FOUND, format!("unknown session: {}", session_id))
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions/:id/messages", get(session_messages))
        .route("/api/sessions/:id/turns", get(session_turns))
        .route("/api/sessions/:id", delete(clear_session))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
