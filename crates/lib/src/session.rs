//! Conversation session: the rolling message history for one connected client.
//!
//! A session lives exactly as long as its duplex channel. History is append-only and
//! only grows by whole turns (user message, then assistant message).

use crate::llm::ConversationMessage;

/// Unique session identifier (opaque string, used in logs).
pub type SessionId = String;

/// One client's conversation: id and ordered message history.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    messages: Vec<ConversationMessage>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an empty session with a generated id.
    pub fn new() -> Self {
        Self {
            id: format!("sess-{}", uuid::Uuid::new_v4()),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// History in order, oldest first.
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Record a completed turn: the user's message followed by the assistant's answer.
    pub fn commit_turn(&mut self, user: ConversationMessage, answer: impl Into<String>) {
        self.messages.push(user);
        self.messages.push(ConversationMessage::assistant(answer));
    }
}
