use std::{future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

use crate::{config::RelayConfig, relay::spawn_relay, tcp, websocket};

/// Both transports plus the relay task they share.
pub struct RelayServer {
    tcp: TcpListener,
    ws: TcpListener,
    event_capacity: usize,
}

impl RelayServer {
    pub fn new(tcp: TcpListener, ws: TcpListener, event_capacity: usize) -> Self {
        Self {
            tcp,
            ws,
            event_capacity,
        }
    }

    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let tcp = TcpListener::bind(config.tcp_listen)
            .await
            .with_context(|| format!("failed to bind tcp listener on {}", config.tcp_listen))?;
        let ws = TcpListener::bind(config.ws_listen)
            .await
            .with_context(|| format!("failed to bind websocket listener on {}", config.ws_listen))?;
        Ok(Self::new(tcp, ws, config.event_capacity))
    }

    pub fn tcp_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn ws_addr(&self) -> std::io::Result<SocketAddr> {
        self.ws.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let RelayServer {
            tcp: tcp_listener,
            ws: ws_listener,
            event_capacity,
        } = self;

        let (relay, relay_task) = spawn_relay(event_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let tcp_task = tokio::spawn(tcp::serve(tcp_listener, relay.clone(), stopped(stop_rx.clone())));
        let ws_task = tokio::spawn(websocket::serve(ws_listener, relay.clone(), stopped(stop_rx)));

        shutdown.await;
        info!("relay shutting down");

        let _ = stop_tx.send(true);
        // Stopping the relay closes every inbox, which in turn ends open connections.
        relay.shutdown().await;

        tcp_task.await.context("tcp listener task panicked")??;
        ws_task.await.context("websocket listener task panicked")??;
        relay_task.await.context("relay task panicked")?;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopping| *stopping).await;
}
