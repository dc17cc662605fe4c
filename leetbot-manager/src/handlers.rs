use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use leetbot_core::session::Turn;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;

use crate::error::ApiError;
use crate::state::AppState;

const MESSAGE_REQUIRED: &str = "Message field is required";

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub status: &'static str,
    pub user_input: String,
    pub assistant_response: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub conversation: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    // An unreadable body has no usable message either
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!("Rejected chat body: {}", rejection.body_text());
        ApiError::bad_request(MESSAGE_REQUIRED)
    })?;
    let message = payload.message.unwrap_or_default();

    let span = tracing::info_span!(
        "chat",
        session_id = payload.session_id.as_deref().unwrap_or("<new>")
    );
    let reply = state
        .chat
        .chat(&message, payload.session_id.as_deref())
        .instrument(span)
        .await?;

    Ok(Json(ChatResponse {
        status: "success",
        user_input: reply.user_input,
        assistant_response: reply.assistant_response,
        session_id: reply.session_id,
        warning: reply.warning,
    }))
}

pub async fn get_history_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state.chat.history().get_history(&session_id).await?;
    Ok(Json(HistoryResponse {
        session_id,
        conversation: history.turns,
        warning: history
            .degraded
            .map(|reason| format!("stored history is unreadable: {}", reason)),
    }))
}

pub async fn clear_history_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.chat.history().clear_session(&session_id).await?;
    tracing::info!(session_id = %session_id, "Conversation history cleared");
    Ok(Json(json!({
        "status": "success",
        "message": "Conversation history cleared",
    })))
}

pub async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to LEETBOT!" }))
}

pub async fn health_handler(State(state): State<AppState>) -> Response {
    let store = state.chat.history().store();
    match store.health_check().await {
        Ok(()) => Json(json!({ "status": "healthy", "store": store.backend() })).into_response(),
        Err(e) => {
            tracing::warn!(store = store.backend(), "Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "store": store.backend(),
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
