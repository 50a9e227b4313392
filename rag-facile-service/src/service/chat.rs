//! Chat turns driven over WebSocket.

use std::sync::Arc;

use base64::Engine;
use dashmap::DashMap;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult, format_error_chain};
use crate::openai::{ChatMessage, CompletionBackend};
use crate::pdf_context::{Attachment, format_error_block, process_attachments};
use crate::tools::ToolExecutor;
use crate::websocket::{ServerMessage, WebSocketManager};

use super::ChatService;
use super::sessions::{Session, TurnGuard};
use super::turn::{TokenSink, TurnController, TurnOutcome};

/// Attachment as sent by the client, base64-encoded
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentPayload {
    pub name: String,
    pub data: String,
}

/// Cancellation handles for running turns, keyed by chat session id.
///
/// Each registration carries its own turn id so a finishing turn only clears
/// its own entry, never one registered by a later turn on the same session.
#[derive(Debug, Default)]
pub struct ActiveTurns {
    turns: DashMap<String, (Uuid, CancellationToken)>,
}

impl ActiveTurns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the running turn of a session and return its turn id
    pub fn register(&self, session_id: &str, cancel: CancellationToken) -> Uuid {
        let turn_id = Uuid::new_v4();
        self.turns.insert(session_id.to_string(), (turn_id, cancel));
        turn_id
    }

    /// Clear a turn's entry if it is still the registered one
    pub fn finish(&self, session_id: &str, turn_id: Uuid) -> bool {
        self.turns
            .remove_if(session_id, |_, (id, _)| *id == turn_id)
            .is_some()
    }

    /// Cancel the registered turn of a session. Returns false if none is running.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.turns.get(session_id) {
            Some(entry) => {
                entry.1.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Forwards turn output to one WebSocket connection
pub struct WsTokenSink {
    connection_id: String,
    session_id: String,
    ws_manager: Arc<WebSocketManager>,
}

impl WsTokenSink {
    pub fn new(
        connection_id: impl Into<String>,
        session_id: impl Into<String>,
        ws_manager: Arc<WebSocketManager>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            session_id: session_id.into(),
            ws_manager,
        }
    }
}

impl TokenSink for WsTokenSink {
    fn push_token(&mut self, token: &str) {
        self.ws_manager.send_to(
            &self.connection_id,
            ServerMessage::ChatContent {
                session_id: self.session_id.clone(),
                text: token.to_string(),
            },
        );
    }

    fn tool_started(&mut self, tool_call_id: &str, tool: &str) {
        self.ws_manager.send_to(
            &self.connection_id,
            ServerMessage::ChatToolStatus {
                session_id: self.session_id.clone(),
                tool_call_id: tool_call_id.to_string(),
                tool: tool.to_string(),
            },
        );
    }

    fn finalize(&mut self) {
        debug!(
            connection_id = %self.connection_id,
            session_id = %self.session_id,
            "Token stream finalized"
        );
    }
}

/// Run a turn while holding the session's turn slot and commit its messages
/// only if it completes.
pub async fn run_committed_turn<B, T, S>(
    controller: &TurnController<'_, B, T>,
    session_id: &str,
    session: &Session,
    guard: &TurnGuard,
    user_message: ChatMessage,
    sink: &mut S,
    cancel: &CancellationToken,
) -> ServiceResult<TurnOutcome>
where
    B: CompletionBackend,
    T: ToolExecutor,
    S: TokenSink,
{
    let history = session.messages().await;
    let outcome = controller
        .run(session_id, &history, user_message, sink, cancel)
        .await?;

    session.commit(guard, outcome.messages.clone()).await;
    debug!(
        session_id = %session_id,
        committed = outcome.messages.len(),
        "Turn committed"
    );
    Ok(outcome)
}

/// Decode and extract attachments into prompt context.
///
/// Non-PDF names are skipped. Undecodable payloads become inline error blocks
/// like any other unreadable file.
pub(crate) async fn attachments_context(
    payloads: Vec<AttachmentPayload>,
    max_bytes: u64,
) -> ServiceResult<String> {
    let mut decode_errors = String::new();
    let mut attachments = Vec::new();

    for payload in payloads {
        let mut attachment = Attachment {
            name: payload.name,
            data: Vec::new(),
        };
        if !attachment.is_pdf() {
            debug!(name = %attachment.name, "Skipping non-PDF attachment");
            continue;
        }
        match base64::engine::general_purpose::STANDARD.decode(payload.data.as_bytes()) {
            Ok(data) => {
                attachment.data = data;
                attachments.push(attachment);
            }
            Err(e) => {
                warn!(name = %attachment.name, error = %e, "Failed to decode attachment");
                decode_errors.push_str(&format_error_block(&attachment.name, &e));
            }
        }
    }

    if attachments.is_empty() {
        return Ok(decode_errors);
    }

    // PDFium is blocking
    let context = tokio::task::spawn_blocking(move || process_attachments(&attachments, max_bytes))
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Attachment extraction task failed: {}", e),
        })?;

    Ok(context + &decode_errors)
}

impl ChatService {
    /// Start a turn for `session_id` (a new session when absent) and stream
    /// its output to the given connection.
    ///
    /// Fails immediately with `SessionBusy` if the session already has a turn
    /// in progress. Returns the session id.
    pub async fn start_chat_ws(
        &self,
        connection_id: String,
        session_id: Option<String>,
        message: String,
        attachments: Vec<AttachmentPayload>,
    ) -> ServiceResult<String> {
        if message.trim().is_empty() && attachments.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "Message is empty".to_string(),
            });
        }

        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = self.sessions.get_or_create(&session_id);
        let guard = session
            .try_begin_turn()
            .ok_or_else(|| ServiceError::SessionBusy {
                session_id: session_id.clone(),
            })?;

        let cancel = CancellationToken::new();
        let turn_id = self.active_turns.register(&session_id, cancel.clone());

        self.ws_manager.send_to(
            &connection_id,
            ServerMessage::ChatStarted {
                session_id: session_id.clone(),
            },
        );

        info!(
            connection_id = %connection_id,
            session_id = %session_id,
            attachments = attachments.len(),
            message_preview = %message.chars().take(100).collect::<String>(),
            "Starting chat turn"
        );

        let service = self.clone_for_task();
        let sid = session_id.clone();
        tokio::spawn(async move {
            service
                .run_turn_ws(
                    connection_id,
                    sid,
                    session,
                    guard,
                    turn_id,
                    message,
                    attachments,
                    cancel,
                )
                .await;
        });

        Ok(session_id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_turn_ws(
        &self,
        connection_id: String,
        session_id: String,
        session: Arc<Session>,
        guard: TurnGuard,
        turn_id: Uuid,
        message: String,
        attachments: Vec<AttachmentPayload>,
        cancel: CancellationToken,
    ) {
        let mut sink = WsTokenSink::new(&connection_id, &session_id, self.ws_manager.clone());

        let result = async {
            let context =
                attachments_context(attachments, self.config.chat.max_attachment_bytes).await?;
            let controller = TurnController {
                backend: self.openai.as_ref(),
                tools: &self.tools,
                model: None,
                tool_timeout: self.config.chat.tool_timeout(),
            };
            run_committed_turn(
                &controller,
                &session_id,
                &session,
                &guard,
                ChatMessage::user(message + &context),
                &mut sink,
                &cancel,
            )
            .await
        }
        .await;

        // Clear the handle before releasing the turn slot
        self.active_turns.finish(&session_id, turn_id);
        drop(guard);

        match result {
            Ok(outcome) => {
                info!(
                    session_id = %session_id,
                    tool_calls = outcome.tool_calls,
                    second_pass = outcome.second_pass,
                    "Chat turn complete"
                );
                self.ws_manager.send_to(
                    &connection_id,
                    ServerMessage::ChatTurnComplete {
                        session_id,
                        tool_calls: outcome.tool_calls,
                    },
                );
            }
            Err(e) => {
                if matches!(e, ServiceError::Cancelled { .. }) {
                    info!(session_id = %session_id, "Chat turn cancelled");
                } else {
                    error!(
                        session_id = %session_id,
                        error = %format_error_chain(&e),
                        "Chat turn failed"
                    );
                }
                self.ws_manager.send_to(
                    &connection_id,
                    ServerMessage::ChatError {
                        session_id,
                        code: e.error_code().to_string(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    /// Cancel the running turn of a session. Returns false if none is running.
    pub fn cancel_chat(&self, session_id: &str) -> bool {
        let cancelled = self.active_turns.cancel(session_id);
        if cancelled {
            debug!(session_id = %session_id, "Cancelling chat turn");
        }
        cancelled
    }

    /// Clone the shared handles for use in a spawned task
    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            openai: self.openai.clone(),
            sessions: self.sessions.clone(),
            ws_manager: self.ws_manager.clone(),
            tools: self.tools,
            active_turns: self.active_turns.clone(),
            started_at: self.started_at,
        }
    }
}
