//! Landing-page greeting bot.
//!
//! No retrieval and no LLM: it echoes the visitor's text back in a fixed
//! template. Used by `rag greet` and `POST /api/greet`.

use serde::Serialize;

/// Reply to a landing-page message, or `None` for blank input.
pub fn greet(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    Some(format!(
        "Hello! You said: \"{}\". How can I assist you further?",
        input
    ))
}

/// One exchange on the landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub user: String,
    pub reply: String,
}

/// Running landing-page conversation.
#[derive(Debug, Default, Clone)]
pub struct LandingConversation {
    exchanges: Vec<Exchange>,
}

impl LandingConversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message and return the reply; blank input is ignored.
    pub fn send(&mut self, input: &str) -> Option<&Exchange> {
        let reply = greet(input)?;
        self.exchanges.push(Exchange {
            user: input.trim().to_string(),
            reply,
        });
        self.exchanges.last()
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }
}
