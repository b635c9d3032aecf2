//! Runtime settings for the relay server.
//!
//! The CLI fills in a [`RelayConfig`]; tests usually start from
//! [`RelayConfig::ephemeral`] so parallel runs never fight over ports.

use std::net::{Ipv4Addr, SocketAddr};

use crate::cli::ServeArgs;

pub const DEFAULT_TCP_PORT: u16 = 5000;
pub const DEFAULT_WS_PORT: u16 = 8080;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address for the newline-delimited JSON transport.
    pub tcp_listen: SocketAddr,
    /// Address for the HTTP server that upgrades `/ws` to a WebSocket.
    pub ws_listen: SocketAddr,
    /// How many inbound events may queue up before connection tasks wait on the relay.
    pub event_capacity: usize,
}

impl RelayConfig {
    /// Loopback on port 0 for both transports.
    pub fn ephemeral() -> Self {
        Self {
            tcp_listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ws_listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..Self::default()
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tcp_listen: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_TCP_PORT)),
            ws_listen: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_WS_PORT)),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl From<ServeArgs> for RelayConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            tcp_listen: args.tcp_listen,
            ws_listen: args.ws_listen,
            event_capacity: args.event_capacity,
        }
    }
}
