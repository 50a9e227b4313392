//! WebSocket message handlers.
//!
//! Contains the logic for handling incoming WebSocket connections
//! and processing client messages.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::service::ChatService;

use super::messages::{ClientMessage, ServerMessage};

/// Handle a WebSocket connection
///
/// Manages the connection lifecycle, processes incoming messages,
/// and forwards outgoing messages.
pub async fn handle_ws_connection(socket: WebSocket, service: Arc<ChatService>) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let ws_manager = service.ws_manager.clone();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<ServerMessage>();
    ws_manager.add_connection(connection_id.clone(), msg_tx);

    // Forward queued messages to the socket
    let connection_id_clone = connection_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to serialize WebSocket message");
                }
            }
        }
        debug!(connection_id = %connection_id_clone, "WebSocket send task ended");
    });

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_client_message(&connection_id, &text, &service).await;
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    handle_client_message(&connection_id, &text, &service).await;
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "WebSocket connection closed by client");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    ws_manager.remove_connection(&connection_id);
    send_task.abort();
    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Handle a client message
async fn handle_client_message(connection_id: &str, text: &str, service: &ChatService) {
    let ws_manager = &service.ws_manager;

    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(
                connection_id = %connection_id,
                error = %e,
                "Failed to parse client message"
            );
            ws_manager.send_to(
                connection_id,
                ServerMessage::Error {
                    code: "parse_error".to_string(),
                    message: format!("Failed to parse message: {}", e),
                },
            );
            return;
        }
    };

    match msg {
        ClientMessage::Ping => {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            ws_manager.send_to(connection_id, ServerMessage::Pong { timestamp });
        }
        ClientMessage::ChatMessage {
            session_id,
            message,
            attachments,
        } => {
            let requested = session_id.clone();
            if let Err(e) = service
                .start_chat_ws(connection_id.to_string(), session_id, message, attachments)
                .await
            {
                warn!(
                    connection_id = %connection_id,
                    session_id = ?requested,
                    error = %e,
                    "Chat turn refused"
                );
                ws_manager.send_to(
                    connection_id,
                    ServerMessage::ChatError {
                        session_id: requested.unwrap_or_default(),
                        code: e.error_code().to_string(),
                        message: e.to_string(),
                    },
                );
            }
        }
        ClientMessage::CancelChat { session_id } => {
            if !service.cancel_chat(&session_id) {
                debug!(
                    connection_id = %connection_id,
                    session_id = %session_id,
                    "No running turn to cancel"
                );
            }
        }
    }
}
