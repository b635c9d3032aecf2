//! Connection lifecycle and broadcast decisions.
//!
//! [`Coordinator`] is a plain state machine: feed it one [`RelayEvent`] at a
//! time together with something that implements [`Transport`], and it mutates
//! the roster and history and tells the transport what to send. It knows
//! nothing about sockets, which keeps every transition testable in isolation.
//!
//! ```text
//! connect ──▶ Connected ──login──▶ Identified ──disconnect──▶ Disconnected
//!                 │                   ▲    │
//!                 │                   └────┘ login (rename)
//!                 └────────────disconnect──────────────────▶ Disconnected
//! ```

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::{
    history::MessageLog,
    message::{ChatMessage, ConnectionId, ServerEvent},
    registry::SessionRegistry,
};

/// Outbound primitives the coordinator relies on.
pub trait Transport {
    /// Delivers `event` to every connected client, the originator included.
    fn send_to_all(&mut self, event: ServerEvent);

    /// Delivers `event` to a single connection. Unknown ids are dropped.
    fn send_to_one(&mut self, id: ConnectionId, event: ServerEvent);
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Connect(ConnectionId),
    Login {
        id: ConnectionId,
        name: String,
    },
    Message {
        id: ConnectionId,
        payload: ChatMessage,
    },
    Disconnect(ConnectionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Identified,
    Disconnected,
}

#[derive(Debug, Default)]
pub struct Coordinator {
    registry: SessionRegistry,
    log: MessageLog,
    // Ids are never reused, so a missing entry means disconnected (or never seen).
    connections: HashMap<ConnectionId, ConnectionState>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch<T: Transport>(&mut self, event: RelayEvent, transport: &mut T) {
        match event {
            RelayEvent::Connect(id) => self.on_connect(id),
            RelayEvent::Login { id, name } => self.on_login(id, name, transport),
            RelayEvent::Message { id, payload } => self.on_message(id, payload, transport),
            RelayEvent::Disconnect(id) => self.on_disconnect(id),
        }
    }

    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.connections
            .get(&id)
            .copied()
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn on_connect(&mut self, id: ConnectionId) {
        if self.connections.contains_key(&id) {
            warn!(connection = %id, "duplicate connect ignored");
            return;
        }
        self.connections.insert(id, ConnectionState::Connected);
        info!(
            connection = %id,
            connections = self.connections.len(),
            "client connected"
        );
    }

    fn on_login<T: Transport>(&mut self, id: ConnectionId, name: String, transport: &mut T) {
        let Some(state) = self.connections.get_mut(&id) else {
            debug!(connection = %id, "login from closed connection ignored");
            return;
        };
        *state = ConnectionState::Identified;

        info!(connection = %id, name = %name, "client logged in");
        self.registry.register(id, name);

        // Everyone, not just the newcomer, gets both so all clients converge on the same view.
        transport.send_to_all(ServerEvent::RosterUpdate(self.registry.snapshot()));
        transport.send_to_all(ServerEvent::HistorySync(self.log.all()));
    }

    fn on_message<T: Transport>(
        &mut self,
        id: ConnectionId,
        payload: ChatMessage,
        transport: &mut T,
    ) {
        if !self.connections.contains_key(&id) {
            debug!(connection = %id, "message from closed connection ignored");
            return;
        }

        // TODO: run payloads through a profanity filter before they reach the log.
        self.log.append(payload.clone());
        debug!(connection = %id, history = self.log.len(), "message appended");
        transport.send_to_all(ServerEvent::MessageBroadcast(payload));
    }

    fn on_disconnect(&mut self, id: ConnectionId) {
        if self.connections.remove(&id).is_none() {
            debug!(connection = %id, "disconnect for unknown connection ignored");
            return;
        }
        let name = self.registry.unregister(id);

        // Remaining clients are not sent a fresh roster here; they only learn
        // about departures on the next login.
        info!(
            connection = %id,
            name = ?name,
            connections = self.connections.len(),
            "client disconnected"
        );
    }
}
