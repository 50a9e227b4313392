//! Rebuilds complete tool calls from streamed fragments.
//!
//! The completion stream splits each tool call across many chunks that share
//! an `index`. Indices start at 0 each turn and never skip ahead.

use crate::error::AssemblyError;
use crate::openai::ToolCallFragment;
use crate::tools::ToolCall;

/// One tool call under construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingToolCall {
    pub index: usize,
    pub id: Option<String>,
    pub function_name: String,
    pub function_arguments: String,
}

impl PendingToolCall {
    fn id_or_empty(&self) -> String {
        self.id.clone().unwrap_or_default()
    }

    fn finalize(&self) -> Result<ToolCall, AssemblyError> {
        let raw = self.function_arguments.trim();
        let arguments = if raw.is_empty() {
            serde_json::Map::new()
        } else {
            match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(other) => {
                    return Err(AssemblyError::ArgumentDecode {
                        id: self.id_or_empty(),
                        index: self.index,
                        message: format!("expected a JSON object, got {}", json_kind(&other)),
                    });
                }
                Err(e) => {
                    return Err(AssemblyError::ArgumentDecode {
                        id: self.id_or_empty(),
                        index: self.index,
                        message: e.to_string(),
                    });
                }
            }
        };

        Ok(ToolCall {
            id: self.id_or_empty(),
            name: self.function_name.clone(),
            arguments,
        })
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Accumulates fragments for a single model turn
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    accumulators: Vec<PendingToolCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment into the accumulator at its index.
    ///
    /// A fragment whose index skips past the next free slot is rejected and
    /// leaves the assembler unchanged.
    pub fn consume(&mut self, fragment: ToolCallFragment) -> Result<(), AssemblyError> {
        let expected = self.accumulators.len();

        if fragment.index > expected {
            return Err(AssemblyError::ProtocolViolation {
                index: fragment.index,
                expected,
            });
        }

        if fragment.index == expected {
            self.accumulators.push(PendingToolCall {
                index: fragment.index,
                id: fragment.id,
                function_name: fragment.name.unwrap_or_default(),
                function_arguments: fragment.arguments.unwrap_or_default(),
            });
            return Ok(());
        }

        let pending = &mut self.accumulators[fragment.index];
        if let Some(id) = fragment.id {
            pending.id = Some(id);
        }
        if let Some(name) = fragment.name {
            pending.function_name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            pending.function_arguments.push_str(&arguments);
        }
        Ok(())
    }

    /// Parse every accumulator into a tool call, in index order.
    ///
    /// Each entry succeeds or fails on its own. Calling this again yields the
    /// same results.
    pub fn finalize(&self) -> Vec<Result<ToolCall, AssemblyError>> {
        self.accumulators
            .iter()
            .map(PendingToolCall::finalize)
            .collect()
    }

    pub fn pending(&self) -> &[PendingToolCall] {
        &self.accumulators
    }

    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }
}
