//! A small real-time chat relay.
//!
//! Clients connect, log in with a display name and send chat messages that
//! are echoed to everybody. Every login pushes the current roster and the
//! complete message history to all connected clients, so late joiners catch
//! up and existing members converge on the same view. State lives in memory
//! only and is gone after a restart.
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`config`] holds the server settings built from the CLI.
//! - [`message`] defines connection ids, the client/server events and the
//!   JSON framing helpers.
//! - [`registry`] and [`history`] are the roster and the append-only log.
//! - [`coordinator`] is the per-connection state machine that decides what
//!   gets broadcast, independent of any socket.
//! - [`relay`] runs the coordinator on a single task and fans events out to
//!   per-connection inboxes.
//! - [`tcp`] and [`websocket`] are the two transports feeding the relay.
//! - [`server`] wires the transports and the relay together.
//! - [`client`] is a terminal client for the TCP transport.

pub mod cli;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod history;
pub mod message;
pub mod registry;
pub mod relay;
pub mod server;
pub mod tcp;
pub mod websocket;
