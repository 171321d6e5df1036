//! Chat conversation state.
//!
//! A [`ChatSession`] is the ordered message history of one conversation.
//! It starts with an assistant greeting and only ever grows. Sessions live
//! in memory; persisting individual messages is up to the caller.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{ChatMessage, DocumentChunk};

/// First assistant message of every session.
pub const GREETING: &str = "Hello! I'm your RAG Assistant. Upload some documents and then \
ask me questions about their content.";

/// Assistant message appended when answering fails.
pub const APOLOGY: &str = "I apologize, but I encountered an error while processing your \
request. Please try again.";

#[derive(Debug, Clone)]
pub struct ChatSession {
    id: String,
    messages: Vec<ChatMessage>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    /// New session with a random id, seeded with [`GREETING`].
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let mut session = Self {
            id: id.into(),
            messages: Vec::new(),
        };
        session.push_assistant(GREETING, Vec::new());
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Append the user's message. Input is trimmed; blank input is ignored
    /// and returns `None`.
    pub fn push_user(&mut self, text: &str) -> Option<&ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.messages.push(new_message(text, true, None));
        self.messages.last()
    }

    /// Append an assistant reply. Sources are attached only when non-empty.
    pub fn push_assistant(&mut self, text: &str, sources: Vec<DocumentChunk>) -> &ChatMessage {
        let sources = if sources.is_empty() {
            None
        } else {
            Some(sources)
        };
        self.messages.push(new_message(text, false, sources));
        &self.messages[self.messages.len() - 1]
    }

    /// Append the fixed [`APOLOGY`] reply.
    pub fn push_error(&mut self) -> &ChatMessage {
        self.push_assistant(APOLOGY, Vec::new())
    }
}

fn new_message(text: &str, is_user: bool, sources: Option<Vec<DocumentChunk>>) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4().to_string(),
        content: text.to_string(),
        is_user,
        timestamp: Utc::now(),
        sources,
    }
}
