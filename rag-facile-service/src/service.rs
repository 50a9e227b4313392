mod assembler;
mod chat;
mod sessions;
mod state;
#[cfg(test)]
mod test_support;
mod turn;

pub use assembler::{PendingToolCall, ToolCallAssembler};
pub use chat::{ActiveTurns, AttachmentPayload, WsTokenSink, run_committed_turn};
pub use sessions::{Session, SessionStore, TurnGuard};
pub use state::{SessionHistory, SessionSnapshot};
pub use turn::{TokenSink, TurnController, TurnOutcome, TurnState};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::ServiceResult;
use crate::openai::OpenAiClient;
use crate::tools::BuiltinTools;
use crate::websocket::WebSocketManager;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Main service coordinator
pub struct ChatService {
    pub config: Arc<ServiceConfig>,
    pub openai: Arc<OpenAiClient>,
    pub sessions: Arc<SessionStore>,
    pub ws_manager: Arc<WebSocketManager>,
    tools: BuiltinTools,
    active_turns: Arc<ActiveTurns>,
    started_at: Instant,
}

impl ChatService {
    /// Create a new service instance
    pub async fn new(config: ServiceConfig) -> ServiceResult<Self> {
        info!("Initializing RAG Facile chat service");

        let openai = Arc::new(OpenAiClient::new(config.openai.clone())?);

        if openai.health_check().await {
            info!(url = %openai.base_url(), model = %config.openai.model, "Completion endpoint is available");
        } else {
            warn!(url = %openai.base_url(), "Completion endpoint is not available");
        }

        let sessions = Arc::new(SessionStore::new(config.chat.system_prompt.clone()));

        Ok(Self {
            config: Arc::new(config),
            openai,
            sessions,
            ws_manager: Arc::new(WebSocketManager::new()),
            tools: BuiltinTools,
            active_turns: Arc::new(ActiveTurns::new()),
            started_at: Instant::now(),
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn active_turn_count(&self) -> usize {
        self.active_turns.len()
    }

    /// Evict idle sessions in the background when `chat.session_idle_secs` is set
    pub fn spawn_session_sweeper(&self) {
        let Some(max_idle) = self
            .config
            .chat
            .session_idle()
            .and_then(|idle| chrono::Duration::from_std(idle).ok())
        else {
            info!("Idle session eviction disabled");
            return;
        };

        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let evicted = sessions.evict_idle(max_idle);
                if evicted > 0 {
                    info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
                }
            }
        });
    }
}
