//! In-memory state for chat sessions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::openai::ChatMessage;

/// Ordered message history for one session.
///
/// Starts with a single system message and only ever grows.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHistory {
    messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionHistory {
    pub fn new(system_prompt: &str) -> Self {
        let now = Utc::now();
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append the messages of a completed turn
    pub fn commit(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
        self.updated_at = Utc::now();
    }
}

/// Session view returned by the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub busy: bool,
    #[serde(flatten)]
    pub history: SessionHistory,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::Role;

    #[test]
    fn test_seeded_with_system_prompt() {
        let history = SessionHistory::new("You are a helpful assistant.");
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, Role::System);
        assert_eq!(
            history.messages()[0].content.as_deref(),
            Some("You are a helpful assistant.")
        );
    }

    #[test]
    fn test_commit_appends_in_order() {
        let mut history = SessionHistory::new("sys");
        history.commit([ChatMessage::user("hi"), ChatMessage::assistant("hello")]);
        let roles: Vec<Role> = history.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert!(history.updated_at >= history.created_at);
    }
}
