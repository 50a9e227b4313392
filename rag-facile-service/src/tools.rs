//! Tool definitions and execution for chat turns.
//!
//! This module contains:
//! - Core tool types (ToolDeclaration, ToolCall)
//! - The [`ToolExecutor`] seam used by the turn controller
//! - Submodules for the registry and individual tools

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;

use crate::error::ToolError;

pub mod registry;
pub mod weather;

pub use registry::{REGISTRY, ToolName};

/// Tool declaration in the completion API's `tools` format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDeclaration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A fully assembled, invocable tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    /// Fetch a required string argument
    pub fn required_str(&self, argument: &str) -> Result<&str, ToolError> {
        self.arguments
            .get(argument)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::MissingArgument {
                argument: argument.to_string(),
            })
    }

    /// Fetch an optional string argument
    pub fn optional_str(&self, argument: &str) -> Option<&str> {
        self.arguments.get(argument).and_then(|v| v.as_str())
    }
}

/// Executes assembled tool calls.
///
/// Implementations return the text placed in the `tool` message; an `Err`
/// is rendered to text by the caller, never propagated.
pub trait ToolExecutor: Send + Sync {
    /// Declarations offered to the model on the first pass
    fn declarations(&self) -> Vec<ToolDeclaration>;

    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<String, ToolError>> + Send;
}

/// Executes the built-in tools from [`REGISTRY`]
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTools;

impl ToolExecutor for BuiltinTools {
    fn declarations(&self) -> Vec<ToolDeclaration> {
        REGISTRY.declarations()
    }

    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let name = ToolName::from_str(&call.name).map_err(|_| ToolError::NotFound {
            name: call.name.clone(),
        })?;

        match name {
            ToolName::GetCurrentWeather => {
                let location = call.required_str("location")?;
                let unit = call.optional_str("unit");
                Ok(weather::get_current_weather(location, unit).to_string())
            }
        }
    }
}
