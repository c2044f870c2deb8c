//! Per-session conversation history.
//!
//! A [`Conversation`] is owned by exactly one session and passed to the
//! RAG chain explicitly; nothing here is global.

use chrono::Utc;
use serde::Serialize;

use crate::models::{ConversationTurn, Role, SourceRef};

/// The last `n` of `turns`, oldest first.
///
/// This is the window the RAG chain puts into the prompt.
pub fn recent_turns(turns: &[ConversationTurn], n: usize) -> &[ConversationTurn] {
    let start = turns.len().saturating_sub(n);
    &turns[start..]
}

/// Append-only list of turns, cleared as a whole on reset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            sources: None,
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>, sources: Vec<SourceRef>) {
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            sources: Some(sources),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        recent_turns(&self.turns, n)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
