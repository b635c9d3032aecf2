use std::{net::SocketAddr, time::Duration};

use anyhow::Result;
use chat_relay::{
    config::RelayConfig,
    message::{ChatMessage, ClientEvent, ServerEvent, read_message, write_message},
    server::RelayServer,
};
use serde_json::json;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn join_chat_and_leave_over_tcp() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;

    let (mut alice_reader, mut alice_writer) = connect_and_login(addr, "alice").await?;
    assert_eq!(roster_names(next_event(&mut alice_reader).await?), ["alice"]);
    assert_eq!(
        next_event(&mut alice_reader).await?,
        ServerEvent::HistorySync(Vec::new())
    );

    say(&mut alice_writer, json!({"name": "alice", "message": "hi"})).await?;
    assert_eq!(
        next_event(&mut alice_reader).await?,
        ServerEvent::MessageBroadcast(ChatMessage::from(
            json!({"name": "alice", "message": "hi"})
        ))
    );

    // Bob's login resyncs everyone, Alice included.
    let (mut bob_reader, mut bob_writer) = connect_and_login(addr, "bob").await?;
    for reader in [&mut alice_reader, &mut bob_reader] {
        assert_eq!(roster_names(next_event(reader).await?), ["alice", "bob"]);
        assert_eq!(
            next_event(reader).await?,
            ServerEvent::HistorySync(vec![ChatMessage::from(
                json!({"name": "alice", "message": "hi"})
            )])
        );
    }

    say(&mut bob_writer, json!("hello alice")).await?;
    for reader in [&mut alice_reader, &mut bob_reader] {
        assert_eq!(
            next_event(reader).await?,
            ServerEvent::MessageBroadcast(ChatMessage::from(json!("hello alice")))
        );
    }

    // The relay closes Bob's stream only after it has processed his disconnect.
    bob_writer.shutdown().await?;
    let closed = timeout(READ_TIMEOUT, read_message::<_, ServerEvent>(&mut bob_reader)).await??;
    assert!(closed.is_none());

    // Alice is not sent a new roster; her next event is her own echo.
    say(&mut alice_writer, json!("still here")).await?;
    assert_eq!(
        next_event(&mut alice_reader).await?,
        ServerEvent::MessageBroadcast(ChatMessage::from(json!("still here")))
    );

    // A newcomer sees that Bob is gone and gets the full history.
    let (mut carol_reader, _carol_writer) = connect_and_login(addr, "carol").await?;
    assert_eq!(roster_names(next_event(&mut carol_reader).await?), ["alice", "carol"]);
    match next_event(&mut carol_reader).await? {
        ServerEvent::HistorySync(history) => assert_eq!(history.len(), 3),
        other => panic!("expected history, got {other:?}"),
    }

    let _ = shutdown_tx.send(());
    server.await??;
    Ok(())
}

#[tokio::test]
async fn duplicate_names_are_both_listed() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;

    let (mut first, _first_writer) = connect_and_login(addr, "sam").await?;
    next_event(&mut first).await?;
    next_event(&mut first).await?;

    let (mut second, _second_writer) = connect_and_login(addr, "sam").await?;
    assert_eq!(roster_names(next_event(&mut second).await?), ["sam", "sam"]);

    let _ = shutdown_tx.send(());
    server.await??;
    Ok(())
}

#[tokio::test]
async fn malformed_frame_closes_the_connection() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;

    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    writer.write_all(b"this is not json\n").await?;

    let closed = timeout(READ_TIMEOUT, read_message::<_, ServerEvent>(&mut reader)).await??;
    assert!(closed.is_none());

    let _ = shutdown_tx.send(());
    server.await??;
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_open_connections() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let (mut reader, _writer) = connect_and_login(addr, "alice").await?;
    next_event(&mut reader).await?;
    next_event(&mut reader).await?;

    let _ = shutdown_tx.send(());
    server.await??;

    let closed = timeout(READ_TIMEOUT, read_message::<_, ServerEvent>(&mut reader)).await??;
    assert!(closed.is_none());
    Ok(())
}

async fn start_server() -> Result<(SocketAddr, oneshot::Sender<()>, JoinHandle<Result<()>>)> {
    let server = RelayServer::bind(&RelayConfig::ephemeral()).await?;
    let addr = server.tcp_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        server.run_until(shutdown).await
    });

    Ok((addr, shutdown_tx, handle))
}

async fn connect_and_login(
    addr: SocketAddr,
    name: &str,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();

    write_message(
        &mut writer,
        &ClientEvent::Login {
            name: name.to_string(),
        },
    )
    .await?;

    Ok((BufReader::new(reader), writer))
}

async fn say(writer: &mut OwnedWriteHalf, payload: serde_json::Value) -> Result<()> {
    write_message(
        writer,
        &ClientEvent::Message {
            payload: ChatMessage::from(payload),
        },
    )
    .await?;
    Ok(())
}

async fn next_event(reader: &mut BufReader<OwnedReadHalf>) -> Result<ServerEvent> {
    let event = timeout(READ_TIMEOUT, read_message::<_, ServerEvent>(reader))
        .await??
        .expect("connection closed while waiting for an event");
    Ok(event)
}

fn roster_names(event: ServerEvent) -> Vec<String> {
    match event {
        ServerEvent::RosterUpdate(roster) => roster.into_values().collect(),
        other => panic!("expected roster update, got {other:?}"),
    }
}
