use std::{collections::BTreeMap, fmt, io};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Identifies one live connection for as long as it stays open.
///
/// Ids are handed out by the relay and never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A chat message exactly as the client sent it.
///
/// The relay never looks inside; the schema belongs to the clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatMessage(Value);

impl ChatMessage {
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for ChatMessage {
    fn from(payload: Value) -> Self {
        Self(payload)
    }
}

/// Connection id to display name, ordered by id.
pub type Roster = BTreeMap<ConnectionId, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Login { name: String },
    Message { payload: ChatMessage },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    RosterUpdate(Roster),
    HistorySync(Vec<ChatMessage>),
    MessageBroadcast(ChatMessage),
}

impl ServerEvent {
    /// Wire name of the event, as it appears in the `event` field.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RosterUpdate(_) => "roster_update",
            ServerEvent::HistorySync(_) => "history_sync",
            ServerEvent::MessageBroadcast(_) => "message_broadcast",
        }
    }
}

pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    // Simple line-oriented framing keeps interoperability with netcat-style tools.
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }

        return decode_frame(trimmed).map(Some);
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = serde_json::to_vec(message).map_err(to_io_error)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Encodes one message as a standalone JSON document (used for WebSocket text frames).
pub fn encode_frame<T: Serialize>(message: &T) -> io::Result<String> {
    serde_json::to_string(message).map_err(to_io_error)
}

pub fn decode_frame<T: DeserializeOwned>(frame: &str) -> io::Result<T> {
    serde_json::from_str(frame).map_err(to_io_error)
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
