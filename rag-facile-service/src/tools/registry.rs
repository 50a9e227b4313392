//! Tool registry.
//!
//! Tool names are derived from enum variants via strum, so the name the
//! model calls and the name the executor matches on cannot drift apart.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::{FunctionDeclaration, ToolDeclaration, weather};

/// All tool names as an exhaustive enum.
///
/// Adding a new tool requires:
/// 1. Add variant here
/// 2. Return its metadata from [`metadata_for`]
/// 3. Add a handler in `BuiltinTools::execute` (compile error if missing)
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    EnumIter,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    GetCurrentWeather,
}

/// Metadata for a tool definition.
#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub name: ToolName,

    pub description: &'static str,

    /// JSON Schema for tool parameters (called lazily to avoid static initialization issues)
    pub parameters: fn() -> serde_json::Value,
}

fn metadata_for(name: ToolName) -> ToolMetadata {
    match name {
        ToolName::GetCurrentWeather => ToolMetadata {
            name,
            description: weather::DESCRIPTION,
            parameters: weather::parameters,
        },
    }
}

/// Central registry of all tools.
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, ToolMetadata>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let tools = ToolName::iter()
            .map(|name| (name, metadata_for(name)))
            .collect();
        Self { tools }
    }

    /// All tools in declaration order, in the completion API's format
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .values()
            .map(|t| ToolDeclaration {
                tool_type: "function".to_string(),
                function: FunctionDeclaration {
                    name: t.name.to_string(),
                    description: t.description.to_string(),
                    parameters: (t.parameters)(),
                },
            })
            .collect()
    }

    /// Get metadata by string name
    pub fn get_by_str(&self, name: &str) -> Option<&ToolMetadata> {
        ToolName::from_str(name)
            .ok()
            .and_then(|n| self.tools.get(&n))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global singleton registry instance
pub static REGISTRY: LazyLock<ToolRegistry> = LazyLock::new(ToolRegistry::new);
