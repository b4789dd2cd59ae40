//! End-to-end room session scenarios over the in-memory transport.
//!
//! Each test plays the server through a `MemoryPeer` and controls when the
//! room history arrives through a gate, so the interleaving of history, live
//! traffic and user actions is exact.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chat_client::application::collaborators::{RoomHistory, RoomServiceError};
use chat_client::application::listener::{ErrorKind, SessionListener};
use chat_client::application::room_session::{RoomSession, SessionConfig, SessionError};
use chat_client::infrastructure::network::memory::{MemoryPeer, MemoryTransportFactory};
use chat_core::{ChatMessage, Command, RoomDescriptor, SessionStatus};
use chrono::{TimeZone, Utc};
use tokio::sync::oneshot;

// ── Doubles ───────────────────────────────────────────────────────────────────

type HistoryReply = Result<Vec<ChatMessage>, RoomServiceError>;

/// History service whose answer for a room is held until the test releases it.
/// Rooms without a gate answer immediately with no messages.
#[derive(Default)]
struct GatedHistory {
    gates: Mutex<HashMap<String, oneshot::Receiver<HistoryReply>>>,
}

impl GatedHistory {
    fn gate(&self, room_id: &str) -> oneshot::Sender<HistoryReply> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(room_id.to_string(), rx);
        tx
    }
}

#[async_trait]
impl RoomHistory for GatedHistory {
    async fn history(&self, room_id: &str) -> HistoryReply {
        let gate = self.gates.lock().unwrap().remove(room_id);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(RoomServiceError::Decode("gate dropped".into()))),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Message(String),
    Status(SessionStatus),
    Error(ErrorKind),
}

#[derive(Clone, Default)]
struct Recording {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recording {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Message(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    fn statuses(&self) -> Vec<SessionStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl SessionListener for Recording {
    fn on_message(&mut self, message: &ChatMessage) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Message(message.content().to_string()));
    }

    fn on_status_change(&mut self, status: SessionStatus) {
        self.events.lock().unwrap().push(Event::Status(status));
    }

    fn on_error(&mut self, kind: ErrorKind, _detail: &str) {
        self.events.lock().unwrap().push(Event::Error(kind));
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    session: RoomSession,
    transports: Arc<MemoryTransportFactory>,
    history: Arc<GatedHistory>,
    recording: Recording,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    fn with_config(config: SessionConfig) -> Self {
        let transports = Arc::new(MemoryTransportFactory::new());
        let history = Arc::new(GatedHistory::default());
        let recording = Recording::default();
        let session = RoomSession::new(
            config,
            transports.clone(),
            history.clone(),
            Box::new(recording.clone()),
        );
        Self {
            session,
            transports,
            history,
            recording,
        }
    }

    fn join(&mut self, room_id: &str) -> MemoryPeer {
        self.session
            .join(&RoomDescriptor::new(room_id), "alice")
            .unwrap();
        self.transports.latest().unwrap()
    }

    /// Opens the connection and acknowledges CONNECT.
    async fn handshake(&mut self, peer: &MemoryPeer) {
        peer.accept();
        self.session.run_until_settled().await;
        peer.deliver("CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0");
        self.session.run_until_settled().await;
    }

    async fn settle(&mut self) {
        self.session.run_until_settled().await;
    }

    fn contents(&self) -> Vec<String> {
        self.session
            .snapshot()
            .iter()
            .map(|m| m.content().to_string())
            .collect()
    }
}

fn chat(sender: &str, content: &str, room_id: &str) -> ChatMessage {
    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    ChatMessage::new(sender, content, room_id, ts)
}

fn message_frame(room_id: &str, message: &ChatMessage) -> String {
    format!(
        "MESSAGE\nsubscription:sub-0\nmessage-id:m-1\ndestination:/topic/room/{room_id}\n\
         content-type:application/json\n\n{}\0",
        message.to_json().unwrap()
    )
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_history_then_live_then_send_without_echo() {
    // Arrange: the room already holds two messages
    let mut h = Harness::new();
    let gate = h.history.gate("r1");
    let peer = h.join("r1");
    gate.send(Ok(vec![chat("bob", "m1", ""), chat("carol", "m2", "")]))
        .unwrap();
    h.handshake(&peer).await;
    assert_eq!(h.session.status(), SessionStatus::Active);
    assert_eq!(h.contents(), ["m1", "m2"]);

    // Act: a live message, then our own send
    peer.deliver(&message_frame("r1", &chat("bob", "m3", "r1")));
    h.settle().await;
    h.session.send("hello").unwrap();
    h.settle().await;

    // Assert: sent on the wire, not appended locally
    assert_eq!(h.contents(), ["m1", "m2", "m3"]);
    let send = peer.sent_frames().pop().unwrap();
    assert_eq!(send.command, Command::Send);
    assert_eq!(send.header("destination"), Some("/app/sendMessage/r1"));
    let published: ChatMessage = serde_json::from_str(&send.body).unwrap();
    assert_eq!(published.sender(), "alice");
    assert_eq!(published.content(), "hello");

    // Act: the broker echoes it back
    peer.deliver(&message_frame("r1", &published));
    h.settle().await;

    // Assert
    assert_eq!(h.contents(), ["m1", "m2", "m3", "hello"]);
    assert!(h.session.snapshot().iter().all(|m| m.room_id() == "r1"));
    assert_eq!(h.recording.messages(), ["m1", "m2", "m3", "hello"]);
}

#[tokio::test]
async fn test_live_messages_wait_for_history() {
    // Arrange
    let mut h = Harness::new();
    let gate = h.history.gate("r1");
    let peer = h.join("r1");
    h.handshake(&peer).await;
    assert_eq!(h.session.status(), SessionStatus::Active);

    // Act: live traffic arrives while history is still loading
    peer.deliver(&message_frame("r1", &chat("bob", "live", "r1")));
    h.settle().await;
    assert!(h.contents().is_empty());
    gate.send(Ok(vec![chat("carol", "old", "")])).unwrap();
    h.settle().await;

    // Assert
    assert_eq!(h.contents(), ["old", "live"]);
    assert_eq!(h.recording.messages(), ["old", "live"]);
}

#[tokio::test]
async fn test_history_failure_is_reported_and_live_traffic_continues() {
    // Arrange
    let mut h = Harness::new();
    let gate = h.history.gate("r1");
    let peer = h.join("r1");
    h.handshake(&peer).await;
    peer.deliver(&message_frame("r1", &chat("bob", "live", "r1")));
    h.settle().await;

    // Act
    gate.send(Err(RoomServiceError::Status {
        status: 500,
        body: "boom".into(),
    }))
    .unwrap();
    h.settle().await;

    // Assert
    assert_eq!(h.session.status(), SessionStatus::Active);
    assert!(h
        .recording
        .events()
        .contains(&Event::Error(ErrorKind::HistoryLoadFailure)));
    assert_eq!(h.contents(), ["live"]);
    assert!(!peer.closed_by_client());
}

#[tokio::test]
async fn test_ack_after_leave_is_ignored() {
    // Arrange: CONNECT is out, no reply yet
    let mut h = Harness::new();
    let peer = h.join("r1");
    peer.accept();
    h.settle().await;
    assert_eq!(h.session.status(), SessionStatus::Connecting);

    // Act
    h.session.leave();
    peer.deliver("CONNECTED\nversion:1.2\n\n\0");
    h.settle().await;

    // Assert
    assert_eq!(h.session.status(), SessionStatus::Idle);
    assert!(h.session.session().is_none());
    assert!(peer.closed_by_client());
    assert!(peer
        .sent_frames()
        .iter()
        .all(|f| f.command != Command::Subscribe));
    assert_eq!(h.recording.statuses().last(), Some(&SessionStatus::Idle));
}

#[tokio::test]
async fn test_switching_rooms_drops_old_room_traffic() {
    // Arrange
    let mut h = Harness::new();
    let old = h.join("r1");
    h.handshake(&old).await;

    // Act: join r2, then a delayed r1 message lands on the old connection
    let new = h.join("r2");
    old.deliver(&message_frame("r1", &chat("bob", "late", "r1")));
    h.handshake(&new).await;
    new.deliver(&message_frame("r2", &chat("dave", "fresh", "r2")));
    h.settle().await;

    // Assert
    assert_eq!(h.transports.created(), 2);
    assert!(old.closed_by_client());
    assert_eq!(h.session.session().unwrap().room_id(), "r2");
    assert_eq!(h.contents(), ["fresh"]);
    let subscribe = new
        .sent_frames()
        .into_iter()
        .find(|f| f.command == Command::Subscribe)
        .unwrap();
    assert_eq!(subscribe.header("destination"), Some("/topic/room/r2"));
}

#[tokio::test]
async fn test_leave_while_awaiting_subscribe_receipt_ignores_late_receipt() {
    // Arrange: receipts on, SUBSCRIBE written, RECEIPT not yet back
    let mut h = Harness::with_config(SessionConfig {
        subscribe_receipts: true,
        ..SessionConfig::default()
    });
    let peer = h.join("r1");
    h.handshake(&peer).await;
    assert_eq!(h.session.status(), SessionStatus::Subscribing);
    let receipt = peer
        .sent_frames()
        .into_iter()
        .find(|f| f.command == Command::Subscribe)
        .and_then(|f| f.header("receipt").map(str::to_string))
        .unwrap();

    // Act
    h.session.leave();
    peer.deliver(&format!("RECEIPT\nreceipt-id:{receipt}\n\n\0"));
    h.settle().await;

    // Assert
    assert_eq!(h.session.status(), SessionStatus::Idle);
    assert!(peer.closed_by_client());
    assert!(!h.recording.statuses().contains(&SessionStatus::Active));
    assert_eq!(h.recording.statuses().last(), Some(&SessionStatus::Idle));
}

#[tokio::test]
async fn test_history_from_previous_room_is_dropped_after_switch() {
    // Arrange: r1's history has been produced but not yet applied
    let mut h = Harness::new();
    let old_gate = h.history.gate("r1");
    let old = h.join("r1");
    h.handshake(&old).await;
    old_gate.send(Ok(vec![chat("bob", "r1-history", "r1")])).unwrap();
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    // Act
    let new_gate = h.history.gate("r2");
    let new = h.join("r2");
    h.handshake(&new).await;
    new_gate.send(Ok(vec![chat("dave", "r2-history", "r2")])).unwrap();
    h.settle().await;

    // Assert
    assert_eq!(h.contents(), ["r2-history"]);
    assert!(h.session.snapshot().iter().all(|m| m.room_id() == "r2"));
    assert!(!h.recording.messages().contains(&"r1-history".to_string()));
}

#[tokio::test]
async fn test_switching_rooms_starts_from_an_empty_log() {
    // Arrange: r1 has history and live traffic in the log
    let mut h = Harness::new();
    let r1_gate = h.history.gate("r1");
    let r1 = h.join("r1");
    r1_gate.send(Ok(vec![chat("bob", "old-1", "r1")])).unwrap();
    h.handshake(&r1).await;
    r1.deliver(&message_frame("r1", &chat("carol", "old-2", "r1")));
    h.settle().await;
    assert_eq!(h.contents(), ["old-1", "old-2"]);

    // Act: join r2 with its history held back
    let r2_gate = h.history.gate("r2");
    let r2 = h.join("r2");

    // Assert: nothing from r1 survives, even before r2 is set up
    assert!(h.contents().is_empty());
    h.handshake(&r2).await;
    assert_eq!(h.session.status(), SessionStatus::Active);
    assert!(h.contents().is_empty());

    r2_gate.send(Ok(vec![chat("dave", "new-1", "r2")])).unwrap();
    h.settle().await;
    assert_eq!(h.contents(), ["new-1"]);
}

#[tokio::test]
async fn test_duplicate_delivery_is_kept_twice() {
    let mut h = Harness::new();
    let peer = h.join("r1");
    h.handshake(&peer).await;
    let frame = message_frame("r1", &chat("bob", "again", "r1"));

    peer.deliver(&frame);
    peer.deliver(&frame);
    h.settle().await;

    let log = h.session.snapshot();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0], log[1]);
}

#[tokio::test]
async fn test_send_outside_active_is_not_ready() {
    // Arrange
    let mut h = Harness::new();
    assert_eq!(
        h.session.send("hi"),
        Err(SessionError::SessionNotReady(SessionStatus::Idle))
    );
    let peer = h.join("r1");

    // Act / Assert: while connecting
    assert_eq!(
        h.session.send("hi"),
        Err(SessionError::SessionNotReady(SessionStatus::Connecting))
    );

    // Act / Assert: after the connection drops
    h.handshake(&peer).await;
    peer.drop_connection("server restart");
    h.settle().await;
    assert_eq!(
        h.session.send("hi"),
        Err(SessionError::SessionNotReady(SessionStatus::Failed))
    );
    assert!(peer
        .sent_frames()
        .iter()
        .all(|f| f.command != Command::Send));
}

#[tokio::test]
async fn test_rejoin_after_drop_uses_a_fresh_connection() {
    let mut h = Harness::new();
    let first = h.join("r1");
    h.handshake(&first).await;
    first.drop_connection("reset");
    h.settle().await;
    assert_eq!(h.session.status(), SessionStatus::Failed);

    let second = h.join("r1");
    h.handshake(&second).await;

    assert_eq!(h.session.status(), SessionStatus::Active);
    assert_eq!(h.transports.created(), 2);
    assert_eq!(
        h.recording
            .events()
            .iter()
            .filter(|e| **e == Event::Error(ErrorKind::TransportClosed))
            .count(),
        1
    );
}
