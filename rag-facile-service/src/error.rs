use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session {session_id} already has a turn in progress")]
    SessionBusy { session_id: String },

    #[error("Turn cancelled for session {session_id}")]
    Cancelled { session_id: String },

    #[error("{0}")]
    Completion(#[from] CompletionError),

    #[error("{0}")]
    Assembly(#[from] AssemblyError),

    #[error("{0}")]
    Pdf(#[from] PdfError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised while talking to the completion endpoint.
///
/// Any of these is fatal to the turn that issued the request.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Connection failed to completion endpoint at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Completion request failed (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Completion stream failed: {message}")]
    Stream { message: String },

    #[error("Invalid response from completion endpoint")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while rebuilding tool calls from streamed fragments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("Tool call fragment index {index} skips ahead (expected at most {expected})")]
    ProtocolViolation { index: usize, expected: usize },

    #[error("Invalid arguments for tool call {id} (index {index}): {message}")]
    ArgumentDecode {
        id: String,
        index: usize,
        message: String,
    },
}

/// PDF extraction errors, local to one file
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Expected a PDF file, got: {extension}")]
    NotAPdf { extension: String },

    #[error("Failed to read PDF '{source_name}': {message}")]
    UnreadablePdf {
        source_name: String,
        message: String,
    },

    #[error("Attachment too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

/// Tool execution errors. These never abort a turn; their text becomes the
/// tool result the model sees.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Function not found")]
    NotFound { name: String },

    #[error("Missing required argument: {argument}")]
    MissingArgument { argument: String },

    #[error("Tool {name} timed out after {seconds}s")]
    Timeout { name: String, seconds: u64 },

    #[error("Tool {name} failed: {message}")]
    Failed { name: String, message: String },
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::SessionBusy { .. } => StatusCode::CONFLICT,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Pdf(PdfError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Completion(CompletionError::Connection { .. })
            | ServiceError::Completion(CompletionError::Status { .. }) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, also sent over the WebSocket
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::SessionNotFound { .. } => "session_not_found",
            ServiceError::SessionBusy { .. } => "session_busy",
            ServiceError::Cancelled { .. } => "cancelled",
            ServiceError::Completion(CompletionError::Connection { .. }) => "upstream_connection",
            ServiceError::Completion(CompletionError::Status { .. }) => "upstream_status",
            ServiceError::Completion(CompletionError::Stream { .. }) => "upstream_stream",
            ServiceError::Completion(CompletionError::InvalidResponse { .. }) => {
                "upstream_invalid_response"
            }
            ServiceError::Assembly(AssemblyError::ProtocolViolation { .. }) => {
                "protocol_violation"
            }
            ServiceError::Assembly(AssemblyError::ArgumentDecode { .. }) => "argument_decode",
            ServiceError::Pdf(PdfError::TooLarge { .. }) => "attachment_too_large",
            ServiceError::Pdf(_) => "pdf_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Format an error with its full source chain, one cause per segment.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
