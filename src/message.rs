//! Wire envelope and the tolerant JSON codec.
//!
//! Every frame on the wire is one JSON-encoded [`Envelope`]. Decoding is
//! deliberately lenient: a peer's payload is never rejected outright.
//! Structured JSON objects come through typed, any other valid JSON is
//! wrapped as a `raw` envelope, and input that is not JSON at all is
//! wrapped as a `text` envelope. Plain-text chat-style payloads are a
//! supported input class, not an error.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope kind used when wrapping valid JSON that is not an object.
pub const KIND_RAW: &str = "raw";

/// Envelope kind used when wrapping input that is not JSON.
pub const KIND_TEXT: &str = "text";

/// The structured message unit exchanged over the wire.
///
/// Fields beyond the known set are preserved in `extra` across a
/// decode/encode cycle, not stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Session/game namespace. Absent for generic chat-style payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,

    /// Tag distinguishing application-level message kinds, e.g. "move",
    /// "start", "tap", "result", "playerJoined", "turn", "raw", "text".
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// Sender role/name, when the sender chose to identify itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,

    /// Arbitrary JSON payload. Numbers, strings, maps, and arrays
    /// round-trip through encode/decode unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Sender-assigned milliseconds since epoch. Attached by the
    /// convenience constructors, never by decode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Unknown fields carried through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope with the current time attached.
    pub fn message(kind: impl Into<String>, data: Value) -> Self {
        Self {
            game: None,
            kind: kind.into(),
            player: None,
            data: Some(data),
            timestamp: Some(Utc::now().timestamp_millis()),
            extra: Map::new(),
        }
    }

    /// Create a game-scoped envelope with the current time attached.
    pub fn game_message(
        game: impl Into<String>,
        kind: impl Into<String>,
        player: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            game: Some(game.into()),
            kind: kind.into(),
            player: Some(player.into()),
            data: Some(data),
            timestamp: Some(Utc::now().timestamp_millis()),
            extra: Map::new(),
        }
    }

    /// Wrap a non-object JSON value.
    pub fn raw(value: Value) -> Self {
        Self {
            game: None,
            kind: KIND_RAW.to_string(),
            player: None,
            data: Some(value),
            timestamp: None,
            extra: Map::new(),
        }
    }

    /// Wrap input that failed to parse as JSON.
    pub fn text(input: impl Into<String>) -> Self {
        Self {
            game: None,
            kind: KIND_TEXT.to_string(),
            player: None,
            data: Some(Value::String(input.into())),
            timestamp: None,
            extra: Map::new(),
        }
    }

    /// Serialize the envelope to a JSON string for transmission.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a wire frame. This never fails:
    /// - a JSON object is returned as-is (unknown fields preserved);
    /// - other valid JSON is wrapped as `{type: "raw", data: <value>}`;
    /// - anything else is wrapped as `{type: "text", data: <input>}`.
    pub fn decode(input: &str) -> Self {
        match serde_json::from_str::<Value>(input) {
            Ok(value @ Value::Object(_)) => match serde_json::from_value(value.clone()) {
                Ok(envelope) => envelope,
                // Object with an unrepresentable shape, e.g. a non-string
                // "type" field. Degrade rather than drop.
                Err(_) => Self::raw(value),
            },
            Ok(value) => Self::raw(value),
            Err(_) => Self::text(input),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
