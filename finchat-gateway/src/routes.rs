//! Route definitions for the finchat gateway.
//!
//! - `GET /`: liveness payload
//! - `POST /chat`: one chat exchange
//!
//! Every response body is JSON, errors included.

use crate::chat::{ChatError, ChatReply, ChatService};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use finchat_common::logging::generate_trace_id;
use finchat_common::request_span;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

/// Message returned by the liveness endpoint.
pub const STATUS_MESSAGE: &str =
    "Chatbot backend running with Gemini (Financial Agent, context-aware)!";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

/// Chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Chat response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub user: String,
    pub reply: String,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            user: reply.user,
            reply: reply.reply,
        }
    }
}

/// Liveness response.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match self {
            ChatError::InvalidInput => StatusCode::BAD_REQUEST,
            ChatError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string())
    }
}

/// Build the router with its state attached.
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/chat", post(chat_handler))
        .with_state(state)
}

async fn status_handler() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".into(),
        message: STATUS_MESSAGE.into(),
    })
}

/// The body is decoded by hand so any payload, whatever its content type, gets
/// a JSON answer.
async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected malformed chat request");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Invalid request body: {e}"),
            );
        }
    };

    let trace_id = generate_trace_id();
    let span = request_span!(
        "chat",
        trace_id,
        session_id = request.session_id.as_deref().unwrap_or("-")
    );

    async move {
        let message = request.message.as_deref().unwrap_or_default();
        match state.chat.send(request.session_id.as_deref(), message).await {
            Ok(reply) => Json(ChatResponse::from(reply)).into_response(),
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}
