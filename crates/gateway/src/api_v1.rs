//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `GET  /v1/actions`        : Action descriptors
//! - `GET  /v1/tools`          : Tool declarations (`?format=openai|anthropic`)
//! - `POST /v1/actions/{name}` : Invoke one action for the caller's session
//! - `POST /v1/chat`           : Run a conversation to completion

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use lakeclaw_agent::{ConversationState, ExcludedAction, OrchestrationOutcome, ToolFormat};
use lakeclaw_core::action::ActionDescriptor;
use lakeclaw_core::error::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::SharedState;

/// Header carrying the caller's session identifier.
pub const SESSION_HEADER: &str = "x-session-id";

/// Used when no session header is sent.
pub const DEFAULT_SESSION: &str = "default";

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/actions", get(list_actions_handler))
        .route("/actions/{name}", post(invoke_action_handler))
        .route("/tools", get(list_tools_handler))
        .route("/chat", post(chat_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct ActionListResponse {
    actions: Vec<ActionDescriptor>,
    count: usize,
}

#[derive(Deserialize)]
struct ToolsQuery {
    format: Option<String>,
}

#[derive(Serialize)]
struct ToolListResponse {
    format: ToolFormat,
    tools: Vec<Value>,
    count: usize,
    excluded: Vec<ExcludedAction>,
}

#[derive(Deserialize)]
struct InvokeRequest {
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    /// A previous response's state, to continue that conversation.
    #[serde(default)]
    state: Option<ConversationState>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    #[serde(flatten)]
    outcome: OrchestrationOutcome,
}

/// An error body: `{"error": "..."}`.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn session_id(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

/// HTTP status for an action outcome.
pub fn status_for(kind: Option<ErrorKind>) -> StatusCode {
    match kind {
        None => StatusCode::OK,
        Some(ErrorKind::Validation) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorKind::RemoteUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorKind::RemoteRejected) => StatusCode::CONFLICT,
        Some(ErrorKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn list_actions_handler(State(state): State<SharedState>) -> Json<ActionListResponse> {
    let actions: Vec<ActionDescriptor> = state
        .executor
        .registry()
        .list()
        .into_iter()
        .cloned()
        .collect();
    let count = actions.len();
    Json(ActionListResponse { actions, count })
}

async fn list_tools_handler(
    State(state): State<SharedState>,
    Query(query): Query<ToolsQuery>,
) -> Result<Json<ToolListResponse>, ApiError> {
    let format = match query.format.as_deref() {
        Some(raw) => raw
            .parse::<ToolFormat>()
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e))?,
        None => ToolFormat::default(),
    };
    let tools = state.catalog.render(format);
    Ok(Json(ToolListResponse {
        format,
        count: tools.len(),
        tools,
        excluded: state.catalog.excluded().to_vec(),
    }))
}

async fn invoke_action_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<InvokeRequest>,
) -> (StatusCode, Json<Value>) {
    let session_id = session_id(&headers);
    info!(session_id = %session_id, action = %name, "v1/actions request");

    let outcome = state.executor.execute(&session_id, &name, payload.arguments).await;
    (status_for(outcome.error_kind()), Json(outcome.to_json()))
}

async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Some(orchestrator) = state.orchestrator.clone() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "no reasoning engine configured",
        ));
    };
    if payload.message.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "message must not be empty"));
    }

    let session_id = session_id(&headers);
    let conversation = match payload.state {
        Some(previous) => previous.continue_with(payload.message),
        None => ConversationState::new(payload.message),
    };
    info!(
        session_id = %session_id,
        conversation_id = %conversation.id,
        "v1/chat request"
    );

    // Dropping the request future (client gone) cancels the run before its
    // next step.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let task = tokio::spawn(async move { orchestrator.run(conversation, &session_id, &cancel).await });

    let outcome = task.await.map_err(|e| {
        error!(error = %e, "Conversation task failed");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "conversation task failed")
    })?;
    guard.disarm();

    Ok(Json(ChatResponse {
        reply: outcome.reply(),
        outcome,
    }))
}
