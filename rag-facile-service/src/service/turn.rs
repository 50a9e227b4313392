//! Chat turn controller.
//!
//! A turn streams one completion. If the model asked for tools, the calls are
//! executed in index order and a second completion, without tools, produces
//! the final answer. Messages produced during the turn are returned to the
//! caller for commit only once the turn reaches `Done`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::assembler::ToolCallAssembler;
use crate::error::{CompletionError, ServiceError, ServiceResult, ToolError};
use crate::openai::{
    ChatMessage, CompletionBackend, CompletionRequest, FunctionCallRequest, StreamEvent,
    ToolCallRequest,
};
use crate::tools::{ToolCall, ToolExecutor};

/// Receives a turn's output as it is produced
pub trait TokenSink: Send {
    /// Forward one content token. Called in arrival order, unbuffered.
    fn push_token(&mut self, token: &str);

    /// A tool call is about to run
    fn tool_started(&mut self, _tool_call_id: &str, _tool: &str) {}

    /// The turn completed; no more tokens follow
    fn finalize(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingStream,
    StreamingContent,
    ToolCallsPending,
    SecondPass,
    Done,
}

/// Result of a completed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// User message, tool round-trip messages and the final assistant message
    pub messages: Vec<ChatMessage>,
    /// Number of tool calls the model requested
    pub tool_calls: usize,
    pub second_pass: bool,
}

pub struct TurnController<'a, B, T> {
    pub backend: &'a B,
    pub tools: &'a T,
    pub model: Option<String>,
    pub tool_timeout: Duration,
}

impl<B: CompletionBackend, T: ToolExecutor> TurnController<'_, B, T> {
    /// Run one turn against a copy of the committed `history`.
    pub async fn run<S: TokenSink>(
        &self,
        session_id: &str,
        history: &[ChatMessage],
        user_message: ChatMessage,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> ServiceResult<TurnOutcome> {
        let mut messages = history.to_vec();
        messages.push(user_message.clone());
        let mut pending = vec![user_message];

        debug!(session_id = %session_id, state = ?TurnState::AwaitingStream, "Turn state");

        let mut assembler = ToolCallAssembler::new();
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: messages.clone(),
            tools: self.tools.declarations(),
        };
        let first_content = self
            .stream_pass(session_id, request, sink, cancel, Some(&mut assembler))
            .await?;

        if assembler.is_empty() {
            pending.push(ChatMessage::assistant(first_content));
            sink.finalize();
            debug!(session_id = %session_id, state = ?TurnState::Done, "Turn state");
            return Ok(TurnOutcome {
                messages: pending,
                tool_calls: 0,
                second_pass: false,
            });
        }

        debug!(
            session_id = %session_id,
            state = ?TurnState::ToolCallsPending,
            tool_call_count = assembler.len(),
            "Turn state"
        );

        let results = assembler.finalize();
        let requests = assembler
            .pending()
            .iter()
            .map(|p| ToolCallRequest {
                id: p.id.clone().unwrap_or_default(),
                call_type: "function".to_string(),
                function: FunctionCallRequest {
                    name: p.function_name.clone(),
                    arguments: p.function_arguments.clone(),
                },
            })
            .collect::<Vec<_>>();

        let assistant = ChatMessage::assistant_tool_calls(first_content, requests.clone());
        messages.push(assistant.clone());
        pending.push(assistant);

        for (request, result) in requests.iter().zip(results) {
            if cancel.is_cancelled() {
                return Err(cancelled(session_id));
            }

            let content = match result {
                Ok(call) => {
                    sink.tool_started(&request.id, &request.function.name);
                    self.execute_tool(session_id, &call, cancel).await?
                }
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        tool_call_id = %request.id,
                        error = %e,
                        "Skipping tool call with undecodable arguments"
                    );
                    e.to_string()
                }
            };

            let message = ChatMessage::tool_result(&request.id, &request.function.name, content);
            messages.push(message.clone());
            pending.push(message);
        }

        debug!(session_id = %session_id, state = ?TurnState::SecondPass, "Turn state");

        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            tools: Vec::new(),
        };
        let final_content = self
            .stream_pass(session_id, request, sink, cancel, None)
            .await?;

        pending.push(ChatMessage::assistant(final_content));
        sink.finalize();
        debug!(session_id = %session_id, state = ?TurnState::Done, "Turn state");

        Ok(TurnOutcome {
            messages: pending,
            tool_calls: requests.len(),
            second_pass: true,
        })
    }

    /// Stream one completion, forwarding content and feeding tool-call
    /// fragments to `assembler`. Returns the accumulated content.
    async fn stream_pass<S: TokenSink>(
        &self,
        session_id: &str,
        request: CompletionRequest,
        sink: &mut S,
        cancel: &CancellationToken,
        mut assembler: Option<&mut ToolCallAssembler>,
    ) -> ServiceResult<String> {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(session_id)),
            result = self.backend.chat_stream(request) => result?,
        };

        let mut content = String::new();
        let mut streaming = false;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(session_id)),
                event = stream.recv() => event,
            };

            match event {
                Some(StreamEvent::Content(text)) => {
                    if !streaming {
                        streaming = true;
                        debug!(
                            session_id = %session_id,
                            state = ?TurnState::StreamingContent,
                            "Turn state"
                        );
                    }
                    sink.push_token(&text);
                    content.push_str(&text);
                }
                Some(StreamEvent::ToolCallFragment(fragment)) => match assembler.as_deref_mut() {
                    Some(assembler) => {
                        if let Err(e) = assembler.consume(fragment) {
                            warn!(session_id = %session_id, error = %e, "Dropping tool call fragment");
                        }
                    }
                    None => {
                        warn!(
                            session_id = %session_id,
                            index = fragment.index,
                            "Ignoring tool call fragment on a pass without tools"
                        );
                    }
                },
                Some(StreamEvent::Done { finish_reason }) => {
                    debug!(
                        session_id = %session_id,
                        finish_reason = ?finish_reason,
                        content_length = content.len(),
                        "Completion stream finished"
                    );
                    return Ok(content);
                }
                Some(StreamEvent::Error(message)) => {
                    return Err(CompletionError::Stream { message }.into());
                }
                None => {
                    return Err(CompletionError::Stream {
                        message: "stream closed before completion".to_string(),
                    }
                    .into());
                }
            }
        }
    }

    /// Run one tool call. Failures and timeouts become the result text.
    async fn execute_tool(
        &self,
        session_id: &str,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> ServiceResult<String> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(session_id)),
            result = tokio::time::timeout(self.tool_timeout, self.tools.execute(call)) => result,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => Err(ToolError::Timeout {
                name: call.name.clone(),
                seconds: self.tool_timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(text) => {
                info!(
                    session_id = %session_id,
                    tool_call_id = %call.id,
                    tool_name = %call.name,
                    "Tool execution succeeded"
                );
                Ok(text)
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    tool_call_id = %call.id,
                    tool_name = %call.name,
                    error = %e,
                    "Tool execution failed"
                );
                Ok(e.to_string())
            }
        }
    }
}

fn cancelled(session_id: &str) -> ServiceError {
    ServiceError::Cancelled {
        session_id: session_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssemblyError;
    use crate::openai::Role;
    use crate::service::test_support::{
        MissingTools, RecordingSink, ScriptedBackend, SlowTools, content, done, fragment,
        paris_fragments,
    };
    use crate::tools::BuiltinTools;

    fn controller<'a, B, T>(backend: &'a B, tools: &'a T) -> TurnController<'a, B, T> {
        TurnController {
            backend,
            tools,
            model: None,
            tool_timeout: Duration::from_millis(200),
        }
    }

    fn history() -> Vec<ChatMessage> {
        vec![ChatMessage::system("You are a helpful assistant.")]
    }

    #[tokio::test]
    async fn test_no_tool_calls_issues_single_request() {
        let backend = ScriptedBackend::new(vec![Ok(vec![content("Bon"), content("jour"), done()])]);
        let mut sink = RecordingSink::default();

        let outcome = controller(&backend, &BuiltinTools)
            .run(
                "s1",
                &history(),
                ChatMessage::user("Salut"),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].messages.len(), 2);

        assert_eq!(sink.tokens, vec!["Bon", "jour"]);
        assert!(sink.finalized);
        assert!(!outcome.second_pass);
        assert_eq!(
            outcome.messages,
            vec![ChatMessage::user("Salut"), ChatMessage::assistant("Bonjour")]
        );
    }

    #[tokio::test]
    async fn test_paris_scenario_runs_tool_then_second_pass() {
        let backend = ScriptedBackend::new(vec![
            Ok(paris_fragments()),
            Ok(vec![content("It is 22 degrees in Paris."), done()]),
        ]);
        let mut sink = RecordingSink::default();

        let outcome = controller(&backend, &BuiltinTools)
            .run(
                "s1",
                &history(),
                ChatMessage::user("Weather in Paris?"),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls, 1);
        assert!(outcome.second_pass);
        assert_eq!(sink.tools, vec![("a".to_string(), "get_current_weather".to_string())]);
        assert_eq!(sink.tokens, vec!["It is 22 degrees in Paris."]);

        let roles: Vec<Role> = outcome.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );

        let assistant = &outcome.messages[1];
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].function.arguments, "{\"location\": \"Paris\"}");

        let tool = &outcome.messages[2];
        assert_eq!(tool.tool_call_id.as_deref(), Some("a"));
        assert_eq!(tool.name.as_deref(), Some("get_current_weather"));
        let result: serde_json::Value =
            serde_json::from_str(tool.content.as_deref().unwrap()).unwrap();
        assert_eq!(result["temperature"], "22");
        assert_eq!(result["unit"], "celsius");

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].tools.is_empty());
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[3], outcome.messages[2]);
    }

    #[tokio::test]
    async fn test_failing_tool_recorded_as_function_not_found() {
        let backend = ScriptedBackend::new(vec![
            Ok(paris_fragments()),
            Ok(vec![content("Sorry."), done()]),
        ]);
        let mut sink = RecordingSink::default();

        let outcome = controller(&backend, &MissingTools)
            .run(
                "s1",
                &history(),
                ChatMessage::user("Weather in Paris?"),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.messages[2],
            ChatMessage::tool_result("a", "get_current_weather", "Function not found")
        );
        assert_eq!(outcome.messages[3], ChatMessage::assistant("Sorry."));
    }

    #[tokio::test]
    async fn test_tool_timeout_is_a_tool_failure() {
        let backend = ScriptedBackend::new(vec![
            Ok(paris_fragments()),
            Ok(vec![content("No data."), done()]),
        ]);
        let mut sink = RecordingSink::default();

        let slow = TurnController {
            tool_timeout: Duration::from_secs(1),
            ..controller(&backend, &SlowTools)
        };
        let outcome = slow
            .run(
                "s1",
                &history(),
                ChatMessage::user("Weather in Paris?"),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.messages[2].content.as_deref(),
            Some("Tool get_current_weather timed out after 1s")
        );
    }

    #[tokio::test]
    async fn test_bad_arguments_answered_without_execution() {
        let backend = ScriptedBackend::new(vec![
            Ok(vec![
                fragment(0, Some("a"), Some("get_current_weather"), "{\"location\": \"London\"}"),
                fragment(1, Some("b"), Some("get_current_weather"), "{\"location\": "),
                done(),
            ]),
            Ok(vec![content("London is 18."), done()]),
        ]);
        let mut sink = RecordingSink::default();

        let outcome = controller(&backend, &BuiltinTools)
            .run(
                "s1",
                &history(),
                ChatMessage::user("London and somewhere?"),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls, 2);
        assert!(outcome.messages[2].content.as_deref().unwrap().contains("18"));

        let failed = &outcome.messages[3];
        assert_eq!(failed.tool_call_id.as_deref(), Some("b"));
        assert!(
            failed
                .content
                .as_deref()
                .unwrap()
                .starts_with("Invalid arguments for tool call b (index 1)")
        );
        // Only the valid call ran
        assert_eq!(sink.tools, vec![("a".to_string(), "get_current_weather".to_string())]);
    }

    #[tokio::test]
    async fn test_gap_fragment_dropped_and_turn_continues() {
        let backend = ScriptedBackend::new(vec![
            Ok(vec![
                fragment(0, Some("a"), Some("get_current_weather"), "{\"location\": \"Paris\"}"),
                fragment(2, Some("c"), Some("get_current_weather"), "{}"),
                done(),
            ]),
            Ok(vec![content("Paris is 22."), done()]),
        ]);
        let mut sink = RecordingSink::default();

        let outcome = controller(&backend, &BuiltinTools)
            .run(
                "s1",
                &history(),
                ChatMessage::user("Paris?"),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.messages.len(), 4);
        assert_eq!(outcome.messages[2].tool_call_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_upstream_failure_on_second_pass_is_fatal() {
        let backend = ScriptedBackend::new(vec![
            Ok(paris_fragments()),
            Err(CompletionError::Status {
                status: 503,
                message: "overloaded".to_string(),
            }
            .into()),
        ]);
        let mut sink = RecordingSink::default();

        let err = controller(&backend, &BuiltinTools)
            .run(
                "s1",
                &history(),
                ChatMessage::user("Paris?"),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "upstream_status");
        assert!(!sink.finalized);
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mid_stream_error_is_fatal() {
        let backend = ScriptedBackend::new(vec![Ok(vec![
            content("Partial"),
            StreamEvent::Error("connection reset".to_string()),
        ])]);
        let mut sink = RecordingSink::default();

        let err = controller(&backend, &BuiltinTools)
            .run(
                "s1",
                &history(),
                ChatMessage::user("Hi"),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Completion(CompletionError::Stream { ref message }) if message == "connection reset"
        ));
        assert_eq!(sink.tokens, vec!["Partial"]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_forwarding_immediately() {
        let cancel = CancellationToken::new();
        let backend =
            ScriptedBackend::new(vec![Ok(vec![content("one"), content("two"), content("three")])])
                .holding_open();
        let mut sink = RecordingSink {
            cancel_after: Some((1, cancel.clone())),
            ..Default::default()
        };

        let err = controller(&backend, &BuiltinTools)
            .run("s1", &history(), ChatMessage::user("Count"), &mut sink, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Cancelled { .. }));
        assert_eq!(sink.tokens, vec!["one"]);
        assert!(!sink.finalized);
    }

    #[test]
    fn test_assembly_error_text_is_model_readable() {
        let err = AssemblyError::ArgumentDecode {
            id: "b".to_string(),
            index: 1,
            message: "EOF while parsing a value at line 1 column 13".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid arguments for tool call b (index 1): EOF while parsing a value at line 1 column 13"
        );
    }
}
