//! Conversation sessions, keyed by id.
//!
//! Each session owns its own [`Conversation`]; sessions never share
//! turns. Resetting a session touches nothing but its history.

use std::collections::HashMap;

use ragchat_core::conversation::Conversation;

/// Session used when a request does not name one.
pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Conversation>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.sessions.get(id)
    }

    pub fn get_or_create(&mut self, id: &str) -> &mut Conversation {
        self.sessions.entry(id.to_string()).or_default()
    }

    /// Clear a session's history. Returns whether the session existed.
    pub fn reset(&mut self, id: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(conv) => {
                conv.clear();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
