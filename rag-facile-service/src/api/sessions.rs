//! Session API endpoints.
//!
//! Handlers for inspecting and dropping chat sessions.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::service::SessionSnapshot;

use super::AppState;

/// Get the committed history of a session
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ServiceError> {
    let snapshot = state
        .service
        .sessions
        .snapshot(&id)
        .await
        .ok_or(ServiceError::SessionNotFound { session_id: id })?;

    Ok(Json(snapshot))
}

/// Drop a session, cancelling its running turn if any
pub async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.service.cancel_chat(&id);

    if state.service.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::SessionNotFound { session_id: id })
    }
}
