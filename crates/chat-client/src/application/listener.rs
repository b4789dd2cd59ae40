//! Outward notification surface of a room session.

use std::fmt;

use chat_core::{ChatMessage, SessionStatus};

/// Category of a session failure, as reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport could not be opened, or the broker refused the session.
    ConnectFailure,
    /// The broker did not acknowledge CONNECT in time.
    HandshakeTimeout,
    NotConnected,
    /// `send` outside the `Active` state.
    SessionNotReady,
    /// An active session's connection dropped.
    TransportClosed,
    /// The priming history batch could not be fetched.
    HistoryLoadFailure,
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::ConnectFailure => "connect failure",
            ErrorKind::HandshakeTimeout => "handshake timeout",
            ErrorKind::NotConnected => "not connected",
            ErrorKind::SessionNotReady => "session not ready",
            ErrorKind::TransportClosed => "transport closed",
            ErrorKind::HistoryLoadFailure => "history load failure",
            ErrorKind::InvalidInput => "invalid input",
        };
        f.write_str(label)
    }
}

/// Receives every notification a [`RoomSession`] emits.
///
/// Calls are made from inside the session's own methods, one at a time and
/// in the order the underlying events happened.
///
/// [`RoomSession`]: crate::application::room_session::RoomSession
#[cfg_attr(test, mockall::automock)]
pub trait SessionListener: Send {
    /// A message was appended to the log.
    fn on_message(&mut self, message: &ChatMessage);

    fn on_status_change(&mut self, status: SessionStatus);

    /// A failure the caller did not trigger directly.  `detail` is the
    /// human-readable error.
    fn on_error(&mut self, kind: ErrorKind, detail: &str);
}
