//! Terminal front end.
//!
//! The session reports through a [`ChannelListener`], which forwards each
//! callback as a [`SessionNotification`] on an unbounded channel.  The main
//! loop receives them alongside stdin lines and feeds them to a
//! [`ConsoleView`], which keeps the numbered list of visible messages and the
//! locally pinned one, and returns the lines to print.

pub mod commands;
pub mod render;

use chat_core::{ChatMessage, SessionStatus};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::application::listener::{ErrorKind, SessionListener};

/// One session callback, as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotification {
    Message(ChatMessage),
    Status(SessionStatus),
    Error { kind: ErrorKind, detail: String },
}

/// [`SessionListener`] that forwards every callback onto a channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SessionNotification>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: SessionNotification) {
        // The receiver only goes away when the front end is shutting down.
        let _ = self.tx.send(notification);
    }
}

impl SessionListener for ChannelListener {
    fn on_message(&mut self, message: &ChatMessage) {
        self.forward(SessionNotification::Message(message.clone()));
    }

    fn on_status_change(&mut self, status: SessionStatus) {
        self.forward(SessionNotification::Status(status));
    }

    fn on_error(&mut self, kind: ErrorKind, detail: &str) {
        self.forward(SessionNotification::Error {
            kind,
            detail: detail.to_string(),
        });
    }
}

/// At most one message the user pinned.  Purely local; nothing is sent.
#[derive(Debug, Clone, Default)]
pub struct PinnedMessage {
    message: Option<ChatMessage>,
}

impl PinnedMessage {
    pub fn pin(&mut self, message: ChatMessage) {
        self.message = Some(message);
    }

    pub fn unpin(&mut self) {
        self.message = None;
    }

    pub fn get(&self) -> Option<&ChatMessage> {
        self.message.as_ref()
    }
}

/// What the terminal currently shows.
#[derive(Debug, Clone)]
pub struct ConsoleView {
    user: String,
    visible: Vec<ChatMessage>,
    pinned: PinnedMessage,
}

impl ConsoleView {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            visible: Vec::new(),
            pinned: PinnedMessage::default(),
        }
    }

    pub fn pinned(&self) -> Option<&ChatMessage> {
        self.pinned.get()
    }

    pub fn visible(&self) -> &[ChatMessage] {
        &self.visible
    }

    /// Applies a notification and returns the lines to print.
    pub fn apply(&mut self, notification: SessionNotification, now: DateTime<Utc>) -> Vec<String> {
        match notification {
            SessionNotification::Message(message) => {
                self.visible.push(message);
                let index = self.visible.len();
                vec![render::render_message(
                    index,
                    &self.visible[index - 1],
                    &self.user,
                    now,
                )]
            }
            SessionNotification::Status(status) => {
                if status == SessionStatus::Connecting {
                    self.visible.clear();
                    self.pinned.unpin();
                }
                status_line(status).into_iter().collect()
            }
            SessionNotification::Error { kind, detail } => {
                let mut lines = vec![format!("! {kind}: {detail}")];
                if matches!(
                    kind,
                    ErrorKind::ConnectFailure | ErrorKind::HandshakeTimeout | ErrorKind::TransportClosed
                ) {
                    lines.push("! type /rejoin to join the room again".to_string());
                }
                lines
            }
        }
    }

    /// Pins the `index`-th visible message (1-based) and returns the line to
    /// print.  An index with no message leaves the current pin alone.
    pub fn pin(&mut self, index: usize) -> String {
        let Some(message) = index
            .checked_sub(1)
            .and_then(|i| self.visible.get(i))
            .cloned()
        else {
            return format!("! no message number {index}");
        };
        let line = render::render_pinned(&message);
        self.pinned.pin(message);
        line
    }

    pub fn unpin(&mut self) -> String {
        self.pinned.unpin();
        "pin cleared".to_string()
    }
}

fn status_line(status: SessionStatus) -> Option<String> {
    match status {
        SessionStatus::Connecting => Some("* connecting...".to_string()),
        SessionStatus::Active => Some("* connected to chat".to_string()),
        SessionStatus::Idle => Some("* left the room".to_string()),
        SessionStatus::Failed => Some("* disconnected".to_string()),
        SessionStatus::Subscribing | SessionStatus::Closing => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio_test::{assert_err, assert_ok};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn msg(sender: &str, content: &str) -> ChatMessage {
        ChatMessage::new(sender, content, "r1", now())
    }

    #[test]
    fn test_channel_listener_forwards_in_call_order() {
        // Arrange
        let (mut listener, mut rx) = ChannelListener::new();

        // Act
        listener.on_status_change(SessionStatus::Active);
        listener.on_message(&msg("bob", "hi"));
        listener.on_error(ErrorKind::TransportClosed, "gone");

        // Assert
        assert_eq!(assert_ok!(rx.try_recv()), SessionNotification::Status(SessionStatus::Active));
        assert_eq!(assert_ok!(rx.try_recv()), SessionNotification::Message(msg("bob", "hi")));
        assert_eq!(
            assert_ok!(rx.try_recv()),
            SessionNotification::Error {
                kind: ErrorKind::TransportClosed,
                detail: "gone".to_string()
            }
        );
        assert_err!(rx.try_recv());
    }

    #[test]
    fn test_channel_listener_survives_closed_receiver() {
        let (mut listener, rx) = ChannelListener::new();
        drop(rx);
        listener.on_status_change(SessionStatus::Idle);
    }

    #[test]
    fn test_view_numbers_messages_and_pins_by_number() {
        // Arrange
        let mut view = ConsoleView::new("alice");
        view.apply(SessionNotification::Message(msg("bob", "first")), now());
        view.apply(SessionNotification::Message(msg("bob", "second")), now());

        // Act
        let line = view.pin(2);

        // Assert
        assert_eq!(line, "Pinned: second");
        assert_eq!(view.pinned().map(|m| m.content()), Some("second"));
    }

    #[test]
    fn test_pin_out_of_range_reports_and_keeps_current_pin() {
        // Arrange
        let mut view = ConsoleView::new("alice");
        view.apply(SessionNotification::Message(msg("bob", "only")), now());
        view.pin(1);

        // Act
        let past_end = view.pin(2);
        let zero = view.pin(0);

        // Assert
        assert_eq!(past_end, "! no message number 2");
        assert_eq!(zero, "! no message number 0");
        assert_eq!(view.pinned().map(|m| m.content()), Some("only"));
    }

    #[test]
    fn test_view_resets_on_new_connection() {
        let mut view = ConsoleView::new("alice");
        view.apply(SessionNotification::Message(msg("bob", "old room")), now());
        view.pin(1);

        view.apply(SessionNotification::Status(SessionStatus::Connecting), now());

        assert!(view.visible().is_empty());
        assert!(view.pinned().is_none());
    }

    #[test]
    fn test_failure_errors_suggest_rejoin() {
        let mut view = ConsoleView::new("alice");
        let lines = view.apply(
            SessionNotification::Error {
                kind: ErrorKind::TransportClosed,
                detail: "reset".to_string(),
            },
            now(),
        );
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("/rejoin"));
    }

    #[test]
    fn test_unpin_clears() {
        let mut view = ConsoleView::new("alice");
        view.apply(SessionNotification::Message(msg("bob", "x")), now());
        view.pin(1);
        view.unpin();
        assert!(view.pinned().is_none());
    }
}
