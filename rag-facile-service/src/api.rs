//! HTTP API for the RAG Facile chat service.
//!
//! This module provides the REST API endpoints for:
//! - Health monitoring
//! - Upstream model listing
//! - Session inspection
//! - WebSocket connections

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ServiceError;
use crate::openai::ModelInfo;
use crate::service::ChatService;
use crate::websocket::handle_ws_connection;

pub mod sessions;
use sessions::{delete_session_handler, get_session_handler};

/// Application state
pub struct AppState {
    pub service: Arc<ChatService>,
}

/// Build the API router
pub fn router(service: Arc<ChatService>) -> Router {
    let state = Arc::new(AppState { service });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/models", get(models_handler))
        .route(
            "/sessions/{id}",
            get(get_session_handler).delete(delete_session_handler),
        );

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let upstream_available = state.service.openai.health_check().await;

    let status = if upstream_available {
        "healthy".to_string()
    } else {
        "degraded: completion endpoint unavailable".to_string()
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.service.uptime_seconds(),
        upstream_available,
        active_sessions: state.service.sessions.len(),
        active_turns: state.service.active_turn_count(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    upstream_available: bool,
    active_sessions: usize,
    active_turns: usize,
}

// === WebSocket ===

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("WebSocket upgrade request received");

    // Attachments travel base64-encoded inside a single text frame. The
    // per-attachment limit is enforced later, as an inline error block.
    let max_message = state.service.config.chat.max_message_size();

    let service = state.service.clone();
    ws.max_message_size(max_message)
        .on_upgrade(move |socket| handle_ws_connection(socket, service))
}

// === Models ===

async fn models_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ModelInfo>>, ServiceError> {
    let models = state.service.openai.list_models().await?;
    Ok(Json(models))
}
