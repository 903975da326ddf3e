//! Event-stream codec for live subscriptions.
//!
//! A streaming `GET` on a node answers with `text/event-stream` frames:
//!
//! ```text
//! event: put
//! data: {"path":"/","data":{"-Nx..":{"titulo":"a","descricao":"b"}}}
//!
//! event: patch
//! data: {"path":"/-Nx..","data":{"titulo":"c"}}
//!
//! ```
//!
//! The first `put` carries the whole node; later events carry changes
//! relative to it. [`EventDecoder`] turns raw body chunks into
//! [`StreamEvent`]s regardless of where chunk boundaries fall.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::DataPath;

/// Errors produced while decoding an event stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The event name is not part of the protocol.
    #[error("unknown stream event: {0}")]
    UnknownEvent(String),
    /// The `data` payload of an event is not valid JSON for its kind.
    #[error("invalid data for {event} event: {source}")]
    InvalidData {
        /// Event whose payload failed to parse.
        event: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A line was not valid UTF-8.
    #[error("stream line is not valid UTF-8")]
    InvalidUtf8,
}

/// Payload of `put` and `patch` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathData {
    /// Path relative to the watched node, `/` for the node itself.
    pub path: String,
    /// New value (`put`) or children to merge (`patch`).
    #[serde(default)]
    pub data: Value,
}

impl PathData {
    /// Builds a payload for `path` relative to the watched node.
    #[must_use]
    pub fn new(path: &DataPath, data: Value) -> Self {
        Self {
            path: path.to_string(),
            data,
        }
    }

    /// The relative path as segments.
    #[must_use]
    pub fn data_path(&self) -> DataPath {
        DataPath::parse(&self.path)
    }
}

/// One decoded server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Replace the value at a path.
    Put(PathData),
    /// Set each child of `data` under a path.
    Patch(PathData),
    /// Heartbeat; carries no change.
    KeepAlive,
    /// The server stopped the stream (e.g. permission denied).
    Cancel(Option<String>),
    /// The credential used to open the stream is no longer valid.
    AuthRevoked,
}

impl StreamEvent {
    /// Event name as written on the `event:` line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Put(_) => "put",
            Self::Patch(_) => "patch",
            Self::KeepAlive => "keep-alive",
            Self::Cancel(_) => "cancel",
            Self::AuthRevoked => "auth_revoked",
        }
    }

    /// JSON written on the `data:` line.
    #[must_use]
    pub fn data_json(&self) -> String {
        match self {
            Self::Put(payload) | Self::Patch(payload) => {
                serde_json::to_string(payload).unwrap_or_else(|_| "null".to_string())
            }
            Self::Cancel(Some(reason)) => Value::String(reason.clone()).to_string(),
            Self::KeepAlive | Self::Cancel(None) | Self::AuthRevoked => "null".to_string(),
        }
    }

    /// A complete frame including the terminating blank line.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name(), self.data_json())
    }

    /// Reassembles an event from its `event:` name and `data:` text.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnknownEvent`] for names outside the protocol
    /// and [`StreamError::InvalidData`] when a `put`/`patch` payload is not
    /// a `{path, data}` object.
    pub fn from_parts(name: &str, data: &str) -> Result<Self, StreamError> {
        let payload = |event: &str| {
            serde_json::from_str::<PathData>(data).map_err(|source| StreamError::InvalidData {
                event: event.to_string(),
                source,
            })
        };
        match name {
            "put" => payload(name).map(Self::Put),
            "patch" => payload(name).map(Self::Patch),
            "keep-alive" => Ok(Self::KeepAlive),
            "cancel" => {
                let reason = match serde_json::from_str::<Value>(data) {
                    Ok(Value::String(reason)) => Some(reason),
                    _ => None,
                };
                Ok(Self::Cancel(reason))
            }
            "auth_revoked" => Ok(Self::AuthRevoked),
            other => Err(StreamError::UnknownEvent(other.to_string())),
        }
    }
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
pub struct EventDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl EventDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a body chunk and returns every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, StreamError>> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            match std::str::from_utf8(&line) {
                Ok(line) => {
                    if let Some(event) = self.feed_line(line) {
                        events.push(event);
                    }
                }
                Err(_) => events.push(Err(StreamError::InvalidUtf8)),
            }
        }
        events
    }

    fn feed_line(&mut self, line: &str) -> Option<Result<StreamEvent, StreamError>> {
        if line.is_empty() {
            if self.event.is_none() && self.data.is_empty() {
                return None;
            }
            let name = self.event.take().unwrap_or_else(|| "message".to_string());
            let data = self.data.join("\n");
            self.data.clear();
            return Some(StreamEvent::from_parts(&name, &data));
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}
