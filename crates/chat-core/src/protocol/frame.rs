//! STOMP frame model.
//!
//! A frame is a command line, an ordered list of headers, and an optional
//! body:
//!
//! ```text
//! SUBSCRIBE
//! id:sub-0
//! destination:/topic/room/lobby
//!
//! ^@
//! ```
//!
//! Headers are kept as an ordered `Vec` rather than a map because STOMP allows
//! repeated headers and says the *first* occurrence wins.  [`Frame::header`]
//! implements that rule.

use std::fmt;
use std::str::FromStr;

use crate::protocol::codec::ProtocolError;

/// Protocol versions the client offers in `CONNECT`.
pub const ACCEPT_VERSIONS: &str = "1.1,1.2";

/// Heart-beating is disabled in both directions; the transports have their
/// own keepalives.
pub const NO_HEART_BEAT: &str = "0,0";

/// Every command defined by STOMP 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// The exact command line as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// `CONNECT`, `STOMP` and `CONNECTED` frames carry header values verbatim;
    /// every other frame escapes them.
    pub fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header (builder style).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body (builder style).
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ── Client frame constructors ─────────────────────────────────────────────

    /// Session-negotiation frame.
    pub fn connect(host: &str) -> Self {
        Frame::new(Command::Connect)
            .with_header("accept-version", ACCEPT_VERSIONS)
            .with_header("host", host)
            .with_header("heart-beat", NO_HEART_BEAT)
    }

    /// Subscription request.  When `receipt` is set the broker acknowledges
    /// the subscription with a `RECEIPT` frame carrying the same id.
    pub fn subscribe(id: &str, destination: &str, receipt: Option<&str>) -> Self {
        let frame = Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination);
        match receipt {
            Some(r) => frame.with_header("receipt", r),
            None => frame,
        }
    }

    /// Cancels the subscription with the given id.
    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    /// Publishes `body` to `destination`.
    ///
    /// `content-length` is the UTF-8 byte length of the body so the receiver
    /// never has to scan for the terminating NUL.
    pub fn send(destination: &str, content_type: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        Frame::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", content_type)
            .with_header("content-length", body.len().to_string())
            .with_body(body)
    }

    /// Graceful session shutdown.
    pub fn disconnect(receipt: Option<&str>) -> Self {
        let frame = Frame::new(Command::Disconnect);
        match receipt {
            Some(r) => frame.with_header("receipt", r),
            None => frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parses_every_wire_name() {
        for cmd in [
            Command::Connect,
            Command::Stomp,
            Command::Send,
            Command::Subscribe,
            Command::Unsubscribe,
            Command::Ack,
            Command::Nack,
            Command::Begin,
            Command::Commit,
            Command::Abort,
            Command::Disconnect,
            Command::Connected,
            Command::Message,
            Command::Receipt,
            Command::Error,
        ] {
            assert_eq!(cmd.as_str().parse::<Command>().unwrap(), cmd);
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result = "PUBLISH".parse::<Command>();
        assert_eq!(
            result,
            Err(ProtocolError::UnknownCommand("PUBLISH".to_string()))
        );
    }

    #[test]
    fn test_connect_frames_do_not_escape_headers() {
        assert!(!Command::Connect.escapes_headers());
        assert!(!Command::Connected.escapes_headers());
        assert!(Command::Message.escapes_headers());
    }

    #[test]
    fn test_header_lookup_returns_first_occurrence() {
        // Arrange
        let frame = Frame::new(Command::Message)
            .with_header("destination", "/topic/a")
            .with_header("destination", "/topic/b");

        // Act / Assert
        assert_eq!(frame.header("destination"), Some("/topic/a"));
        assert_eq!(frame.header("missing"), None);
    }

    #[test]
    fn test_send_frame_sets_byte_content_length() {
        // "héllo" is 5 chars but 6 bytes
        let frame = Frame::send("/app/sendMessage/r1", "application/json", "héllo");
        assert_eq!(frame.header("content-length"), Some("6"));
    }

    #[test]
    fn test_subscribe_without_receipt_has_no_receipt_header() {
        let frame = Frame::subscribe("sub-0", "/topic/room/r1", None);
        assert_eq!(frame.header("receipt"), None);
        assert_eq!(frame.header("id"), Some("sub-0"));
    }
}
