//! Fakes shared by the chat tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::turn::TokenSink;
use crate::error::{ServiceResult, ToolError};
use crate::openai::{CompletionBackend, CompletionRequest, StreamEvent, ToolCallFragment};
use crate::tools::{BuiltinTools, ToolCall, ToolDeclaration, ToolExecutor};

/// Replays scripted streams and records every request it receives
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<ServiceResult<Vec<StreamEvent>>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    /// Leaves streams open after the script instead of closing them
    hold_open: bool,
    held: Mutex<Vec<mpsc::Sender<StreamEvent>>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<ServiceResult<Vec<StreamEvent>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        }
    }

    pub fn holding_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionBackend for ScriptedBackend {
    async fn chat_stream(
        &self,
        request: CompletionRequest,
    ) -> ServiceResult<mpsc::Receiver<StreamEvent>> {
        self.requests.lock().unwrap().push(request);
        let events = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected completion request")?;

        let (tx, rx) = mpsc::channel(events.len() + 1);
        for event in events {
            tx.try_send(event).unwrap();
        }
        if self.hold_open {
            self.held.lock().unwrap().push(tx);
        }
        Ok(rx)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub tokens: Vec<String>,
    pub tools: Vec<(String, String)>,
    pub finalized: bool,
    /// Cancels the token once this many tokens were pushed
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl TokenSink for RecordingSink {
    fn push_token(&mut self, token: &str) {
        self.tokens.push(token.to_string());
        if let Some((n, token)) = &self.cancel_after
            && self.tokens.len() == *n
        {
            token.cancel();
        }
    }

    fn tool_started(&mut self, tool_call_id: &str, tool: &str) {
        self.tools.push((tool_call_id.to_string(), tool.to_string()));
    }

    fn finalize(&mut self) {
        self.finalized = true;
    }
}

/// Declares the weather tool but cannot find anything at execution time
pub struct MissingTools;

impl ToolExecutor for MissingTools {
    fn declarations(&self) -> Vec<ToolDeclaration> {
        BuiltinTools.declarations()
    }

    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        Err(ToolError::NotFound {
            name: call.name.clone(),
        })
    }
}

pub struct SlowTools;

impl ToolExecutor for SlowTools {
    fn declarations(&self) -> Vec<ToolDeclaration> {
        BuiltinTools.declarations()
    }

    async fn execute(&self, _call: &ToolCall) -> Result<String, ToolError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("too late".to_string())
    }
}

pub fn content(text: &str) -> StreamEvent {
    StreamEvent::Content(text.to_string())
}

pub fn done() -> StreamEvent {
    StreamEvent::Done {
        finish_reason: Some("stop".to_string()),
    }
}

pub fn fragment(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> StreamEvent {
    StreamEvent::ToolCallFragment(ToolCallFragment {
        index,
        id: id.map(str::to_string),
        name: name.map(str::to_string),
        arguments: Some(args.to_string()),
    })
}

/// The weather call for Paris, split across two fragments
pub fn paris_fragments() -> Vec<StreamEvent> {
    vec![
        fragment(0, Some("a"), Some("get_current_weather"), "{\"location\""),
        fragment(0, None, None, ": \"Paris\"}"),
        StreamEvent::Done {
            finish_reason: Some("tool_calls".to_string()),
        },
    ]
}
