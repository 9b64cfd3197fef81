//! Reply events and the server-sent-events line protocol
//!
//! The decoder is line-granular: every `data:` line is decoded on its own,
//! without waiting for the blank line that terminates an SSE block.

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Event kind that carries a human reply
pub const MESSAGE_KIND: &str = "message";

/// Event type the server sends when the stream is established
pub const CONNECTED_KIND: &str = "connected";

/// A record pushed by the server on the session's event stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    pub from: String,
    pub content: String,
    pub timestamp: i64,
}

impl Event {
    /// Only a non-empty `message` counts as a reply
    pub fn is_deliverable(&self) -> bool {
        self.kind == MESSAGE_KIND && !self.content.is_empty()
    }
}

/// Classification of one line of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Blank line or `:` comment (keepalive)
    Ignore,
    EventType(&'a str),
    Data(&'a str),
    Other,
}

impl<'a> SseLine<'a> {
    pub fn parse(line: &'a str) -> Self {
        if line.is_empty() || line.starts_with(':') {
            return SseLine::Ignore;
        }
        if let Some(name) = line.strip_prefix("event:") {
            return SseLine::EventType(name.trim());
        }
        if let Some(payload) = line.strip_prefix("data:") {
            return SseLine::Data(payload.trim());
        }
        SseLine::Other
    }
}

/// Decode a `data:` payload, skipping anything that is not valid JSON
pub fn decode_data(payload: &str) -> Option<Event> {
    serde_json::from_str(payload).ok()
}

/// Feed one line of the stream; yields an event only when it is deliverable
pub fn decode_line(line: &str) -> Option<Event> {
    match SseLine::parse(line) {
        SseLine::Data(payload) => decode_data(payload).filter(Event::is_deliverable),
        // `event: connected` and every other event name carry no record
        SseLine::EventType(_) | SseLine::Ignore | SseLine::Other => None,
    }
}

/// Format a unix timestamp as local `HH:MM:SS`; zero means "now"
pub fn format_timestamp(ts: i64) -> String {
    let time = if ts == 0 {
        Local::now()
    } else {
        match Local.timestamp_opt(ts, 0).single() {
            Some(t) => t,
            None => Local::now(),
        }
    };
    time.format("%H:%M:%S").to_string()
}
