//! WebSocket transport for browser clients.
//!
//! Clients open `ws://<addr>/ws` and exchange the same JSON frames as the TCP
//! transport, one frame per text message. CORS is wide open so pages served
//! from any origin can connect.

use std::future::Future;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpListener, select, task::JoinError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::{
    message::{ClientEvent, ConnectionId, decode_frame, encode_frame},
    relay::{Inbox, RelayHandle},
};

pub const WEBSOCKET_PATH: &str = "/ws";

pub fn router(relay: RelayHandle) -> Router {
    Router::new()
        .route(WEBSOCKET_PATH, get(upgrade))
        .with_state(relay)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serves the WebSocket endpoint until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, relay: RelayHandle, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown)
        .await
        .context("websocket server failed")
}

async fn upgrade(ws: WebSocketUpgrade, State(relay): State<RelayHandle>) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(err) = handle_socket(socket, relay).await {
            warn!(error = ?err, "websocket connection closed with error");
        }
    })
}

enum Closed {
    ByClient(Result<()>),
    ByWriter(Result<Result<()>, JoinError>),
}

async fn handle_socket(socket: WebSocket, relay: RelayHandle) -> Result<()> {
    let (sink, mut stream) = socket.split();

    let (id, inbox) = relay.connect().await?;
    debug!(connection = %id, "websocket client attached");
    let mut outbound = tokio::spawn(pump_outbound(sink, inbox));

    let closed = select! {
        inbound = forward_inbound(&mut stream, &relay, id) => Closed::ByClient(inbound),
        finished = &mut outbound => Closed::ByWriter(finished),
    };
    relay.disconnect(id).await;

    match closed {
        Closed::ByClient(inbound) => {
            let flushed = writer_outcome(outbound.await);
            inbound.and(flushed)
        }
        Closed::ByWriter(finished) => writer_outcome(finished),
    }
}

async fn forward_inbound(
    stream: &mut SplitStream<WebSocket>,
    relay: &RelayHandle,
    id: ConnectionId,
) -> Result<()> {
    while let Some(frame) = stream.next().await {
        let frame = frame.with_context(|| format!("failed to read frame from {id}"))?;
        match frame {
            Message::Text(text) => {
                let event: ClientEvent = decode_frame(&text)
                    .with_context(|| format!("malformed frame from {id}"))?;
                relay.forward(id, event).await?;
            }
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of the protocol.
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    Ok(())
}

async fn pump_outbound(mut sink: SplitSink<WebSocket, Message>, mut inbox: Inbox) -> Result<()> {
    while let Some(event) = inbox.recv().await {
        let frame = encode_frame(&*event)?;
        sink.send(Message::Text(frame))
            .await
            .context("failed to send websocket frame")?;
    }
    if let Err(err) = sink.close().await {
        debug!(error = ?err, "websocket already closed");
    }
    Ok(())
}

fn writer_outcome(result: Result<Result<()>, JoinError>) -> Result<()> {
    result.context("outbound writer task failed")?
}
