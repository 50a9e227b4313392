//! Session store.
//!
//! Each session pairs its committed history with a turn lock. A turn holds
//! the owned lock guard for its whole duration, so at most one turn runs per
//! session while readers can still snapshot the committed history.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use super::state::{SessionHistory, SessionSnapshot};
use crate::openai::ChatMessage;

/// Proof that the holder owns the session's single turn slot
pub type TurnGuard = OwnedMutexGuard<()>;

#[derive(Debug)]
pub struct Session {
    history: RwLock<SessionHistory>,
    turn: Arc<Mutex<()>>,
}

impl Session {
    fn new(system_prompt: &str) -> Self {
        Self {
            history: RwLock::new(SessionHistory::new(system_prompt)),
            turn: Arc::new(Mutex::new(())),
        }
    }

    /// Claim the turn slot without waiting. `None` if a turn is in progress.
    pub fn try_begin_turn(&self) -> Option<TurnGuard> {
        self.turn.clone().try_lock_owned().ok()
    }

    pub fn is_busy(&self) -> bool {
        self.turn.try_lock().is_err()
    }

    /// Copy of the committed messages
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.history.read().await.messages().to_vec()
    }

    /// Append a finished turn's messages. Requires the turn slot.
    pub async fn commit(&self, _guard: &TurnGuard, messages: Vec<ChatMessage>) {
        self.history.write().await.commit(messages);
    }

    async fn history(&self) -> SessionHistory {
        self.history.read().await.clone()
    }
}

/// All live sessions, keyed by session id.
///
/// Any client-supplied id creates a session, so the store is only bounded by
/// `DELETE` and by `evict_idle`, which drops sessions idle past a cutoff.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    system_prompt: String,
}

impl SessionStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Fetch a session, creating it with a fresh history if absent
    pub fn get_or_create(&self, session_id: &str) -> Arc<Session> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id = %session_id, "Creating session");
                Arc::new(Session::new(&self.system_prompt))
            })
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let session = self.get(session_id)?;
        Some(SessionSnapshot {
            session_id: session_id.to_string(),
            busy: session.is_busy(),
            history: session.history().await,
        })
    }

    /// Drop a session. A turn already running keeps its own handle and
    /// finishes against the detached session.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Drop sessions with no running turn whose history has not changed for
    /// `max_idle`. Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let before = self.sessions.len();
        self.sessions.retain(|session_id, session| {
            if session.is_busy() {
                return true;
            }
            // A history being written to is in use
            let idle = session
                .history
                .try_read()
                .is_ok_and(|history| history.updated_at <= cutoff);
            if idle {
                debug!(session_id = %session_id, "Evicting idle session");
            }
            !idle
        });
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
