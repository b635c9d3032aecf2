//! Who is logged in right now.
//!
//! The registry is owned by the relay task, so it needs no lock of its own:
//! every mutation and the snapshot taken after it run inside one event handler.

use crate::message::{ConnectionId, Roster};

/// Maps live connections to the display name they logged in with.
///
/// Names are not unique. Two connections may share a name and an empty name
/// is accepted as-is.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Roster,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `display_name` for `id`, replacing any earlier name.
    pub fn register(&mut self, id: ConnectionId, display_name: String) {
        self.sessions.insert(id, display_name);
    }

    /// Forgets `id`. Unknown ids are ignored, so repeated or late disconnects are harmless.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<String> {
        self.sessions.remove(&id)
    }

    /// Returns a copy of the roster that the caller may serialize freely.
    pub fn snapshot(&self) -> Roster {
        self.sessions.clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
