use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::config::OpenAiConfig;
use crate::error::{CompletionError, ServiceError, ServiceResult};
use crate::tools::ToolDeclaration;

const CHAT_COMPLETION_CHUNK_OBJECT: &str = "chat.completion.chunk";

/// Anything that can serve a streamed chat completion.
///
/// The turn controller only talks to this trait so tests can script
/// the upstream side.
pub trait CompletionBackend: Send + Sync {
    fn chat_stream(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = ServiceResult<mpsc::Receiver<StreamEvent>>> + Send;
}

/// OpenAI-compatible API client
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(config: OpenAiConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::Completion(CompletionError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.api_key)
        }
    }

    /// Check if the endpoint is reachable
    pub async fn health_check(&self) -> bool {
        let url = self.endpoint("models");

        match self.authorized(self.client.get(&url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Completion endpoint health check failed");
                false
            }
        }
    }

    /// List available model ids
    pub async fn list_models(&self) -> ServiceResult<Vec<ModelInfo>> {
        let url = self.endpoint("models");

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CompletionError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(CompletionError::Status {
                status: response.status().as_u16(),
                message: "Failed to list models".to_string(),
            }
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Connection {
                url: url.clone(),
                source: e,
            })?;
        let models: ModelsResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::InvalidResponse { source: e })?;

        Ok(models.data)
    }

    async fn open_stream(
        &self,
        request: CompletionRequest,
    ) -> ServiceResult<mpsc::Receiver<StreamEvent>> {
        let url = self.endpoint("chat/completions");
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone());
        let tool_choice = if request.tools.is_empty() {
            None
        } else {
            Some("auto".to_string())
        };

        let body = OpenAiChatRequest {
            model,
            messages: request.messages,
            tools: request.tools,
            tool_choice,
            stream: true,
        };

        debug!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.len(),
            "Sending streaming completion request"
        );

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            error!(status, message = %message, "Completion request rejected");
            return Err(CompletionError::Status { status, message }.into());
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump_sse(response, tx));
        Ok(rx)
    }
}

impl CompletionBackend for OpenAiClient {
    fn chat_stream(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = ServiceResult<mpsc::Receiver<StreamEvent>>> + Send {
        self.open_stream(request)
    }
}

/// Read SSE events off the response and forward them as [`StreamEvent`]s.
async fn pump_sse(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut stream = response.bytes_stream().eventsource();

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error(format!("SSE stream error: {}", e)))
                    .await;
                return;
            }
        };

        trace!(data = %event.data, "Completion SSE event");

        let events = match parse_chunk(&event.data) {
            Ok(ChunkOutcome::Finished) => {
                let _ = tx.send(StreamEvent::Done { finish_reason: None }).await;
                return;
            }
            Ok(ChunkOutcome::Events(events)) => events,
            Err(message) => {
                error!(message = %message, "Failed to parse completion chunk");
                let _ = tx.send(StreamEvent::Error(message)).await;
                return;
            }
        };

        for event in events {
            if tx.send(event).await.is_err() {
                // Receiver dropped: the turn was cancelled
                debug!("Completion stream receiver dropped, stopping");
                return;
            }
        }
    }

    let _ = tx
        .send(StreamEvent::Error(
            "SSE stream closed before response completed".to_string(),
        ))
        .await;
}

pub(crate) enum ChunkOutcome {
    Events(Vec<StreamEvent>),
    Finished,
}

/// Decode one SSE `data:` payload.
pub(crate) fn parse_chunk(data: &str) -> Result<ChunkOutcome, String> {
    if data.trim() == "[DONE]" {
        return Ok(ChunkOutcome::Finished);
    }

    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| format!("SSE parsing error: {}, data: {}", e, data))?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .unwrap_or("An error occurred during streaming");
        return Err(format!("SSE API error: {}", message));
    }

    if let Some(object) = value.get("object").and_then(|o| o.as_str())
        && object != CHAT_COMPLETION_CHUNK_OBJECT
    {
        warn!(object = %object, "Skipping non-chunk SSE event");
        return Ok(ChunkOutcome::Events(Vec::new()));
    }

    let chunk: ChatCompletionChunk = serde_json::from_value(value)
        .map_err(|e| format!("SSE data schema error: {}, data: {}", e, data))?;

    // Usage-only chunks carry no choices
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(ChunkOutcome::Events(Vec::new()));
    };

    let mut events = Vec::new();
    if let Some(content) = choice.delta.content
        && !content.is_empty()
    {
        events.push(StreamEvent::Content(content));
    }
    for call in choice.delta.tool_calls.unwrap_or_default() {
        let (name, arguments) = match call.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };
        events.push(StreamEvent::ToolCallFragment(ToolCallFragment {
            index: call.index,
            id: call.id,
            name,
            arguments,
        }));
    }
    if let Some(finish_reason) = choice.finish_reason {
        events.push(StreamEvent::Done {
            finish_reason: Some(finish_reason),
        });
    }

    Ok(ChunkOutcome::Events(events))
}

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Chat message in the OpenAI wire shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Function name, for tool-role messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant message proposing tool calls. Content stays absent when empty.
    pub fn assistant_tool_calls(content: String, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: (!content.is_empty()).then_some(content),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// Tool call as echoed back in an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCallRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    pub name: String,
    /// Raw JSON argument text exactly as the model produced it
    pub arguments: String,
}

/// Request handed to a [`CompletionBackend`]
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Overrides the configured default model
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Empty means no tools are offered for this request
    pub tools: Vec<ToolDeclaration>,
}

/// One partial tool call, as streamed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Events produced by a completion stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Content(String),
    ToolCallFragment(ToolCallFragment),
    Done { finish_reason: Option<String> },
    Error(String),
}

/// Model information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

// Internal OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclaration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
