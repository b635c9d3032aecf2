//! Append-only chat history kept for the lifetime of the process.

use crate::message::ChatMessage;

/// Every chat message in arrival order.
///
/// Nothing is ever removed or rewritten. Clients joining late receive the
/// whole log, so it grows without bound until the process restarts.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Copy of the full history, oldest first.
    pub fn all(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
