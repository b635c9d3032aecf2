//! The relay task: a single owner for all chat state.
//!
//! Connection tasks never touch the roster or history directly. They talk to
//! the relay task through a cloneable [`RelayHandle`], and the relay task
//! drives the [`Coordinator`] one event at a time. Outbound events land in a
//! per-connection unbounded [`Inbox`], so fanning out never waits on a slow
//! socket.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Result, anyhow};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    coordinator::{Coordinator, RelayEvent, Transport},
    message::{ChatMessage, ClientEvent, ConnectionId, ServerEvent},
};

pub type Outbox = mpsc::UnboundedSender<Arc<ServerEvent>>;
pub type Inbox = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

enum Command {
    Connect { id: ConnectionId, outbox: Outbox },
    Event(RelayEvent),
    Shutdown,
}

#[derive(Clone)]
pub struct RelayHandle {
    commands: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
}

impl RelayHandle {
    /// Announces a new connection and returns its id plus the inbox its writer should drain.
    pub async fn connect(&self) -> Result<(ConnectionId, Inbox)> {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbox, inbox) = mpsc::unbounded_channel();
        self.send(Command::Connect { id, outbox }).await?;
        Ok((id, inbox))
    }

    pub async fn login(&self, id: ConnectionId, name: String) -> Result<()> {
        self.send(Command::Event(RelayEvent::Login { id, name })).await
    }

    pub async fn message(&self, id: ConnectionId, payload: ChatMessage) -> Result<()> {
        self.send(Command::Event(RelayEvent::Message { id, payload }))
            .await
    }

    /// Routes a decoded client frame to the matching relay event.
    pub async fn forward(&self, id: ConnectionId, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Login { name } => self.login(id, name).await,
            ClientEvent::Message { payload } => self.message(id, payload).await,
        }
    }

    /// Best effort: if the relay is already gone there is nothing left to clean up.
    pub async fn disconnect(&self, id: ConnectionId) {
        if self
            .send(Command::Event(RelayEvent::Disconnect(id)))
            .await
            .is_err()
        {
            debug!(connection = %id, "relay stopped before disconnect was delivered");
        }
    }

    /// Asks the relay task to stop. Every inbox closes once it exits.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("relay task has stopped"))
    }
}

/// Starts the relay task. `capacity` bounds the queue of pending inbound events.
pub fn spawn_relay(capacity: usize) -> (RelayHandle, JoinHandle<()>) {
    let (commands, receiver) = mpsc::channel(capacity.max(1));
    let handle = RelayHandle {
        commands,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    let task = tokio::spawn(run_relay(receiver));
    (handle, task)
}

async fn run_relay(mut commands: mpsc::Receiver<Command>) {
    let mut coordinator = Coordinator::new();
    let mut outboxes = Outboxes::default();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Connect { id, outbox } => {
                outboxes.attach(id, outbox);
                coordinator.dispatch(RelayEvent::Connect(id), &mut outboxes);
            }
            Command::Event(event) => {
                let leaving = match &event {
                    RelayEvent::Disconnect(id) => Some(*id),
                    _ => None,
                };
                coordinator.dispatch(event, &mut outboxes);
                if let Some(id) = leaving {
                    outboxes.detach(id);
                }
            }
            Command::Shutdown => break,
        }
    }

    info!(
        connections = coordinator.connection_count(),
        history = coordinator.log().len(),
        "relay stopped"
    );
}

#[derive(Default)]
struct Outboxes {
    outboxes: HashMap<ConnectionId, Outbox>,
}

impl Outboxes {
    fn attach(&mut self, id: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(id, outbox);
    }

    fn detach(&mut self, id: ConnectionId) {
        self.outboxes.remove(&id);
    }
}

impl Transport for Outboxes {
    fn send_to_all(&mut self, event: ServerEvent) {
        let event = Arc::new(event);
        for (id, outbox) in &self.outboxes {
            if outbox.send(Arc::clone(&event)).is_err() {
                debug!(connection = %id, event = event.name(), "outbox closed, dropping event");
            }
        }
    }

    fn send_to_one(&mut self, id: ConnectionId, event: ServerEvent) {
        let Some(outbox) = self.outboxes.get(&id) else {
            debug!(connection = %id, "no outbox for connection");
            return;
        };
        if outbox.send(Arc::new(event)).is_err() {
            debug!(connection = %id, "outbox closed, dropping event");
        }
    }
}
