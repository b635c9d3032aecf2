//! Newline-delimited JSON transport over plain TCP.
//!
//! Each accepted socket becomes one connection on the relay. Frames read from
//! the socket are forwarded as relay events; a dedicated writer task drains the
//! connection's inbox back onto the socket.

use std::{future::Future, io, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
    task::JoinError,
};
use tracing::{debug, info, warn};

use crate::{
    message::{ClientEvent, ConnectionId, read_message, write_message},
    relay::{Inbox, RelayHandle},
};

/// Accepts TCP clients until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, relay: RelayHandle, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);

    loop {
        select! {
            _ = &mut shutdown => {
                info!("tcp listener shutting down");
                break;
            }
            accept_result = listener.accept() => {
                handle_accept_result(accept_result, &relay);
            }
        }
    }

    Ok(())
}

fn handle_accept_result(result: io::Result<(TcpStream, SocketAddr)>, relay: &RelayHandle) {
    match result {
        Ok((stream, peer)) => spawn_client_handler(stream, peer, relay),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_client_handler(stream: TcpStream, peer: SocketAddr, relay: &RelayHandle) {
    let relay = relay.clone();
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, peer, relay).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}

enum Closed {
    ByClient(Result<()>),
    ByWriter(Result<io::Result<()>, JoinError>),
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, relay: RelayHandle) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let (id, inbox) = relay.connect().await?;
    debug!(%peer, connection = %id, "tcp client attached");
    let mut outbound = tokio::spawn(pump_outbound(writer, inbox));

    let closed = select! {
        inbound = forward_inbound(&mut reader, &relay, id) => Closed::ByClient(inbound),
        finished = &mut outbound => Closed::ByWriter(finished),
    };
    relay.disconnect(id).await;

    match closed {
        // Detaching closed the inbox, so the writer flushes what is queued and stops.
        Closed::ByClient(inbound) => {
            let flushed = writer_outcome(outbound.await);
            inbound.and(flushed)
        }
        Closed::ByWriter(finished) => writer_outcome(finished),
    }
}

async fn forward_inbound<R>(reader: &mut R, relay: &RelayHandle, id: ConnectionId) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(event) = read_message::<_, ClientEvent>(reader)
        .await
        .with_context(|| format!("failed to read frame from {id}"))?
    {
        relay.forward(id, event).await?;
    }
    Ok(())
}

async fn pump_outbound<W>(mut writer: W, mut inbox: Inbox) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = inbox.recv().await {
        write_message(&mut writer, &*event).await?;
    }
    writer.shutdown().await
}

fn writer_outcome(result: Result<io::Result<()>, JoinError>) -> Result<()> {
    result
        .context("outbound writer task failed")?
        .context("failed to write to client")
}
