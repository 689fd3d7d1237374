//! finchat Gateway - HTTP chat backend for the finance tracker.
//!
//! Forwards user messages to a generative model together with a short window of
//! the session's previous turns, and keeps per-session history in memory.
//!
//! ## Architecture
//!
//! ```text
//! Client → POST /chat → ChatService ──→ Provider (Gemini)
//!                            ↓
//!                    ConversationStore
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod chat;
pub mod provider;
pub mod routes;
pub mod session;

pub use chat::{ChatError, ChatReply, ChatService, ChatSettings, DEFAULT_SYSTEM_PROMPT};
pub use provider::{Completion, GeminiProvider, Provider, ProviderError, TokenUsage};
pub use routes::AppState;
pub use session::{ConversationStore, Role, SessionHistory, Turn};

use axum::Router;
use finchat_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the gateway router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_routes(state).layer(cors)
}

/// Assemble the application state from configuration and a model provider.
pub fn build_state(config: &Config, provider: Arc<dyn Provider>) -> AppState {
    let store = Arc::new(ConversationStore::with_max_sessions(config.chat.max_sessions));
    let chat = ChatService::new(store, provider, ChatSettings::from(&config.chat));

    AppState {
        chat: Arc::new(chat),
    }
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let gemini = GeminiProvider::from_config(&config.model);
    if !gemini.has_api_key() {
        tracing::warn!("No Gemini API key configured; chat requests will fail until one is set");
    }

    let router = build_router(build_state(config, Arc::new(gemini)));

    tracing::info!(
        model = %config.model.model,
        context_turns = config.chat.context_turns,
        max_sessions = ?config.chat.max_sessions,
        "Starting finchat gateway on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("finchat gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
