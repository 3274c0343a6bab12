//! Broadcast payloads.
//!
//! An `Event` is what producers (the persistence layer emitting domain
//! changes) hand to the namespace manager. It reaches sockets as a single
//! JSON text frame.
//!
//! Notes on fields:
//! - `topic`: topic name used for routing
//! - `kind`: producer-defined event name, e.g. `sample.update`
//! - `payload`: the changed entity, passed through untouched
//! - `timestamp`: milliseconds since UNIX epoch, set when the event is built

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tungstenite::protocol::Message as WsMessage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub topic: String,
    pub kind: String,
    pub payload: Value,
    pub timestamp: i64,
}

impl Event {
    pub fn new(topic: &str, kind: &str, payload: Value) -> Self {
        Self {
            topic: topic.to_string(),
            kind: kind.to_string(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_frame(&self) -> Result<WsMessage, serde_json::Error> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}
