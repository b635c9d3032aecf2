use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    message::{ChatMessage, ClientEvent, ServerEvent, decode_frame, write_message},
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut server_lines, mut writer) = establish_connection(&args).await?;
    send_login(&mut writer, &args.name).await?;
    write_stdout(&format!("*** joined as {}", args.name)).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut view = ChatView::default();

    run_client_loop(&mut server_lines, &mut writer, &mut stdin, &mut view, &args.name).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(
    args: &ClientArgs,
) -> Result<(Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader).lines(), writer))
}

async fn send_login(writer: &mut OwnedWriteHalf, name: &str) -> Result<()> {
    write_message(
        writer,
        &ClientEvent::Login {
            name: name.to_string(),
        },
    )
    .await?;
    Ok(())
}

async fn run_client_loop(
    server_lines: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut Lines<BufReader<tokio::io::Stdin>>,
    view: &mut ChatView,
    name: &str,
) -> Result<()> {
    // `Lines::next_line` is cancel safe, so neither side loses a partial line to `select!`.
    loop {
        select! {
            server_line = server_lines.next_line() => {
                if !handle_server_line(server_line, view).await? {
                    break;
                }
            }
            input = stdin.next_line() => {
                if !handle_stdin_input(input, writer, name).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_line(line: io::Result<Option<String>>, view: &mut ChatView) -> Result<bool> {
    let Some(line) = line? else {
        write_stdout("*** server closed the connection").await?;
        return Ok(false);
    };
    if line.trim().is_empty() {
        return Ok(true);
    }

    let event: ServerEvent = decode_frame(&line)?;
    for rendered in view.apply(event) {
        write_stdout(&rendered).await?;
    }
    Ok(true)
}

async fn handle_stdin_input(
    input: io::Result<Option<String>>,
    writer: &mut OwnedWriteHalf,
    name: &str,
) -> Result<bool> {
    let Some(input) = input? else {
        return Ok(false);
    };

    let text = input.trim_end();
    if text.is_empty() {
        return Ok(true);
    }

    if text.eq_ignore_ascii_case("/quit") {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    write_message(
        writer,
        &ClientEvent::Message {
            payload: ChatMessage::from(json!({ "name": name, "message": text })),
        },
    )
    .await?;
    Ok(true)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

/// What the terminal has already shown.
///
/// The relay resends the whole history on every login, so the view remembers
/// how many messages it printed and only renders the new tail. Broadcasts that
/// arrive before the first history sync are held back: that sync already
/// contains them, in log order.
#[derive(Debug, Default)]
struct ChatView {
    shown: usize,
    synced: bool,
}

impl ChatView {
    fn apply(&mut self, event: ServerEvent) -> Vec<String> {
        match event {
            ServerEvent::RosterUpdate(roster) => {
                let names: Vec<&str> = roster.values().map(String::as_str).collect();
                vec![format!("*** online: {}", names.join(", "))]
            }
            ServerEvent::HistorySync(history) => {
                let fresh: Vec<String> = history
                    .iter()
                    .skip(self.shown)
                    .map(render_message)
                    .collect();
                self.shown = self.shown.max(history.len());
                self.synced = true;
                fresh
            }
            ServerEvent::MessageBroadcast(_) if !self.synced => Vec::new(),
            ServerEvent::MessageBroadcast(message) => {
                self.shown += 1;
                vec![render_message(&message)]
            }
        }
    }
}

fn render_message(message: &ChatMessage) -> String {
    match message.as_value() {
        Value::Object(fields) => match (fields.get("name"), fields.get("message")) {
            (Some(Value::String(name)), Some(Value::String(text))) => format!("<{name}> {text}"),
            _ => message.as_value().to_string(),
        },
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
