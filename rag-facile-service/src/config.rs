//! Service configuration.
//!
//! Loaded once at startup from (lowest to highest precedence) built-in
//! defaults, an optional `config` file, `RAG_FACILE__*` environment variables,
//! and the plain `OPENAI_*` variables shared with the generated apps.

mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::load_config;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_openai")]
    pub openai: OpenAiConfig,

    #[serde(default = "default_chat")]
    pub chat: ChatConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// OpenAI-compatible completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_url")]
    pub base_url: String,

    /// Bearer token. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Chat turn behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Seeded as the first message of every new session
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Upper bound on a single tool invocation; exceeding it counts as a tool failure
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Per-attachment limit; larger files become inline error blocks
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,

    /// WebSocket frame limit for a whole client message, base64 attachments included
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: u64,

    /// Sessions untouched for this long are evicted; 0 keeps them until deleted
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl ChatConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn max_message_size(&self) -> usize {
        usize::try_from(self.max_message_bytes).unwrap_or(usize::MAX)
    }

    pub fn session_idle(&self) -> Option<Duration> {
        (self.session_idle_secs > 0).then(|| Duration::from_secs(self.session_idle_secs))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            openai: default_openai(),
            chat: default_chat(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        default_chat()
    }
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_openai() -> OpenAiConfig {
    OpenAiConfig {
        base_url: default_openai_url(),
        api_key: String::new(),
        model: default_model(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

fn default_openai_url() -> String {
    "https://albert.api.etalab.gouv.fr/v1".to_string()
}

fn default_model() -> String {
    "openweight-large".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_chat() -> ChatConfig {
    ChatConfig {
        system_prompt: default_system_prompt(),
        tool_timeout_secs: default_tool_timeout_secs(),
        max_attachment_bytes: default_max_attachment_bytes(),
        max_message_bytes: default_max_message_bytes(),
        session_idle_secs: default_session_idle_secs(),
    }
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    10
}

fn default_max_attachment_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_max_message_bytes() -> u64 {
    128 * 1024 * 1024
}

fn default_session_idle_secs() -> u64 {
    3600
}
