use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay, accepting TCP and WebSocket clients.
    Serve(ServeArgs),
    /// Connect to a relay over TCP and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address for the JSON-lines TCP transport. Use port 0 for an ephemeral port.
    #[arg(long, env = "RELAY_TCP_LISTEN", default_value = "127.0.0.1:5000")]
    pub tcp_listen: SocketAddr,

    /// Socket address for the WebSocket transport (served at `/ws`).
    #[arg(long, env = "RELAY_WS_LISTEN", default_value = "127.0.0.1:8080")]
    pub ws_listen: SocketAddr,

    /// Inbound events that may queue before connections wait on the relay.
    #[arg(long, env = "RELAY_EVENT_CAPACITY", default_value_t = 256)]
    pub event_capacity: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Display name announced on login.
    #[arg(long, env = "RELAY_NAME")]
    pub name: String,

    /// TCP address of the relay to connect to.
    #[arg(long, env = "RELAY_SERVER", default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,
}
