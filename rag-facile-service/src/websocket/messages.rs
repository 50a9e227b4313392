//! WebSocket message types.
//!
//! Defines the client-to-server and server-to-client message formats
//! for WebSocket communication.

use serde::{Deserialize, Serialize};

use crate::service::AttachmentPayload;

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive ping
    Ping,
    /// Start a turn in a new or existing session
    ChatMessage {
        /// None = start a new session
        #[serde(default)]
        session_id: Option<String>,
        /// The user's message
        message: String,
        /// Uploaded files; only PDFs are read
        #[serde(default)]
        attachments: Vec<AttachmentPayload>,
    },
    /// Cancel the running turn of a session
    CancelChat { session_id: String },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Keepalive pong response
    Pong { timestamp: u64 },
    /// Connection-level error, not tied to a turn
    Error { code: String, message: String },
    /// Turn accepted
    ChatStarted { session_id: String },
    /// Streaming chat content
    ChatContent { session_id: String, text: String },
    /// A tool call is being executed
    ChatToolStatus {
        session_id: String,
        tool_call_id: String,
        tool: String,
    },
    /// Turn completed and committed
    ChatTurnComplete {
        session_id: String,
        tool_calls: usize,
    },
    /// Turn failed or was cancelled; nothing was committed
    ChatError {
        session_id: String,
        code: String,
        message: String,
    },
}
