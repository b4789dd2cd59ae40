//! The chat message record.
//!
//! On the wire a message is a JSON object:
//!
//! ```json
//! {"sender":"alice","content":"hi","roomId":"r1","timeStamp":"2024-05-01T10:00:00.000Z"}
//! ```
//!
//! The timestamp is produced by whichever client sent the message and clocks
//! are not synchronised, so it is display-only.  Message order is always the
//! order of arrival at this client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    sender: String,
    content: String,
    /// History responses from the server omit the room; the session fills
    /// it in from the active room.
    #[serde(rename = "roomId", default)]
    room_id: String,
    #[serde(rename = "timeStamp", with = "timestamp", default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        room_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            room_id: room_id.into(),
            timestamp,
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Decodes a message body, assigning `room_id` when the payload has none.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when `body` is not a chat message.
    pub fn from_json(body: &str, room_id: &str) -> Result<Self, serde_json::Error> {
        let msg: ChatMessage = serde_json::from_str(body)?;
        Ok(msg.in_room_if_unset(room_id))
    }

    /// Serialises to the canonical JSON text.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if serialisation fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns the message with `room_id` set, unless it already names a room.
    pub fn in_room_if_unset(mut self, room_id: &str) -> Self {
        if self.room_id.is_empty() {
            self.room_id = room_id.to_string();
        }
        self
    }
}

/// Serde adapter for `timeStamp`.
///
/// Writes RFC 3339 with millisecond precision and a `Z` suffix, which is what
/// a browser's `JSON.stringify(new Date())` produces.  Reads RFC 3339, zone-less
/// ISO date-times (treated as UTC) and epoch milliseconds.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Text(text) => parse_text(&text).ok_or_else(|| {
                de::Error::custom(format!("unrecognised timestamp {text:?}"))
            }),
            Raw::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| de::Error::custom(format!("timestamp {ms} out of range"))),
        }
    }

    fn parse_text(text: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
