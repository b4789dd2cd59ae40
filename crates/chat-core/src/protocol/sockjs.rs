//! SockJS envelope framing.
//!
//! When a network intermediary blocks plain WebSocket upgrades, the broker is
//! still reachable through its SockJS endpoint.  SockJS wraps application
//! text in a one-letter envelope:
//!
//! | Server frame        | Meaning                                  |
//! |---------------------|------------------------------------------|
//! | `o`                 | session open                             |
//! | `h`                 | heartbeat                                |
//! | `a["m1","m2"]`      | one or more application messages         |
//! | `c[3000,"Go away!"]`| session closed with a code and reason    |
//!
//! Client→server traffic is a bare JSON array of strings (`["m1"]`).
//! Polling transports terminate each server frame with `\n`, which is
//! tolerated here.

use crate::protocol::codec::ProtocolError;

/// A decoded server→client SockJS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

/// Decodes one server frame.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedSockJs`] for an empty frame, an unknown
/// envelope letter, or a JSON payload of the wrong shape.
///
/// # Examples
///
/// ```rust
/// use chat_core::protocol::{decode_sockjs_frame, SockJsFrame};
///
/// let frame = decode_sockjs_frame("a[\"hello\"]\n").unwrap();
/// assert_eq!(frame, SockJsFrame::Messages(vec!["hello".to_string()]));
/// ```
pub fn decode_sockjs_frame(text: &str) -> Result<SockJsFrame, ProtocolError> {
    let text = text.trim_end_matches(['\n', '\r']);
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ProtocolError::MalformedSockJs("empty frame".to_string()))?;
    let payload = chars.as_str();

    match kind {
        'o' => Ok(SockJsFrame::Open),
        'h' => Ok(SockJsFrame::Heartbeat),
        'a' => serde_json::from_str::<Vec<String>>(payload)
            .map(SockJsFrame::Messages)
            .map_err(|e| ProtocolError::MalformedSockJs(format!("message array: {e}"))),
        'c' => serde_json::from_str::<(u16, String)>(payload)
            .map(|(code, reason)| SockJsFrame::Close { code, reason })
            .map_err(|e| ProtocolError::MalformedSockJs(format!("close frame: {e}"))),
        other => Err(ProtocolError::MalformedSockJs(format!(
            "unknown frame type {other:?}"
        ))),
    }
}

/// Encodes client messages as the JSON string array SockJS expects.
pub fn encode_sockjs_messages<S: AsRef<str>>(messages: &[S]) -> String {
    let refs: Vec<&str> = messages.iter().map(AsRef::as_ref).collect();
    // A slice of &str always serializes; the fallback keeps this infallible.
    serde_json::to_string(&refs).unwrap_or_else(|_| "[]".to_string())
}
