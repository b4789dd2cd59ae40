//! RoomSession: the state machine that binds one broker connection to one
//! chat room.
//!
//! # Flow
//!
//! ```text
//! join(room, user)
//!   ├─ spawn history fetch ───────────────► history batch ─┐
//!   └─ open transport                                      │
//!        Opened     ──► CONNECT                            │
//!        CONNECTED  ──► SUBSCRIBE /topic/room/{id}         ▼
//!        (RECEIPT)  ──► Active          MESSAGE ──► MessageLog ──► on_message
//! ```
//!
//! # Status transitions
//!
//! | From                                 | To            | Trigger                                   |
//! |--------------------------------------|---------------|-------------------------------------------|
//! | `Idle`                               | `Connecting`  | `join`                                    |
//! | `Connecting`                         | `Subscribing` | CONNECTED received, SUBSCRIBE written     |
//! | `Subscribing`                        | `Active`      | RECEIPT received, or no receipt requested |
//! | `Connecting`, `Subscribing`, `Active`| `Closing`     | `leave`                                   |
//! | `Closing`                            | `Idle`        | teardown finished                         |
//! | `Connecting`, `Subscribing`, `Active`| `Failed`      | connect failure, timeout, transport loss  |
//! | `Failed`                             | `Idle`        | `leave`, or the next `join`               |
//!
//! `Failed` and `Idle` are resting states: nothing is connected and the next
//! `join` starts over.  A `join` while a session is live first tears the old
//! one down as if `leave` had been called.
//!
//! # Generations
//!
//! Every asynchronous outcome (transport events, the history batch) arrives on
//! a channel tagged with the generation that was current when the work was
//! started.  `join`, `leave` and every failure bump the generation, so a
//! continuation that resolves after the session it belonged to has ended is
//! recognised as stale and dropped.
//!
//! This is what makes a room switch safe.  The old connection may still have
//! frames in flight, and the old history request may already have completed
//! and be sitting in the channel.  Neither can reach the new room's log,
//! because both carry the old generation.  The in-flight history task is also
//! aborted on teardown, but the generation check does not rely on that.
//!
//! # History before live traffic
//!
//! The history fetch and the broker handshake run concurrently, and either
//! may finish first.  Live messages that arrive before the history batch is
//! applied are held back and appended right after it, so the log always reads
//! history first.  The log itself is cleared at `join`, so the previous
//! room's messages are gone before anything of the new room is shown.
//!
//! The fetch is bounded by [`SessionConfig::history_timeout`].  A fetch that
//! fails or runs past the limit is reported once as
//! [`ErrorKind::HistoryLoadFailure`]; the session stays up, the log starts
//! empty and the held-back live messages are released.  A stalled history
//! service therefore delays live traffic by at most the timeout.
//!
//! # Driving the session
//!
//! The session owns no task of its own.  The caller awaits [`RoomSession::pump`]
//! in its event loop (next to stdin, signals and so on), and each completed
//! `pump` applies one outcome.  Tests use [`RoomSession::run_until_settled`]
//! to apply everything that is ready.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use chat_core::{validate_identity, ChatMessage, RoomDescriptor, SessionStatus};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::application::broker::{BrokerClient, BrokerError, BrokerEvent, Subscription};
use crate::application::collaborators::{RoomHistory, RoomServiceError};
use crate::application::listener::{ErrorKind, SessionListener};
use crate::application::message_log::MessageLog;
use crate::application::transport::{TransportEvent, TransportEvents, TransportFactory};

/// Consecutive empty polls after which [`RoomSession::run_until_settled`]
/// considers the session quiescent.
const SETTLE_ROUNDS: usize = 3;

/// Errors surfaced by a room session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("could not connect: {0}")]
    ConnectFailure(String),

    #[error("broker did not acknowledge the session within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("not connected")]
    NotConnected,

    #[error("session is not active (status: {0})")]
    SessionNotReady(SessionStatus),

    #[error("connection closed: {0}")]
    TransportClosed(String),

    #[error("could not load room history: {0}")]
    HistoryLoadFailure(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::ConnectFailure(_) => ErrorKind::ConnectFailure,
            SessionError::HandshakeTimeout(_) => ErrorKind::HandshakeTimeout,
            SessionError::NotConnected => ErrorKind::NotConnected,
            SessionError::SessionNotReady(_) => ErrorKind::SessionNotReady,
            SessionError::TransportClosed(_) => ErrorKind::TransportClosed,
            SessionError::HistoryLoadFailure(_) => ErrorKind::HistoryLoadFailure,
            SessionError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Connection settings for a room session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker endpoint handed to the transport, e.g. `http://localhost:8080/chat`.
    pub endpoint: String,
    /// Value of the CONNECT frame's `host` header.
    pub host: String,
    pub handshake_timeout: Duration,
    /// Limit on the history fetch.  Past it the session carries on with an
    /// empty log and releases any held-back live messages.
    pub history_timeout: Duration,
    /// Ask the broker to confirm SUBSCRIBE with a RECEIPT before going active.
    pub subscribe_receipts: bool,
    pub topic_prefix: String,
    pub send_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/chat".to_string(),
            host: "localhost".to_string(),
            handshake_timeout: Duration::from_secs(10),
            history_timeout: Duration::from_secs(10),
            subscribe_receipts: false,
            topic_prefix: "/topic/room/".to_string(),
            send_prefix: "/app/sendMessage/".to_string(),
        }
    }
}

/// The live session: who is in which room, and how far setup has come.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    room_id: String,
    user_name: String,
    status: SessionStatus,
}

impl Session {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }
}

enum HistoryState {
    /// Fetch in flight; live messages wait here.
    Loading { buffered: Vec<ChatMessage> },
    Applied,
}

type HistoryResult = Result<Vec<ChatMessage>, RoomServiceError>;

/// Orchestrates one chat room over one broker connection.
pub struct RoomSession {
    config: SessionConfig,
    transports: Arc<dyn TransportFactory>,
    history: Arc<dyn RoomHistory>,
    listener: Box<dyn SessionListener>,
    log: MessageLog,
    session: Option<Session>,
    /// Status reported while no session exists (`Idle` or `Failed`).
    resting: SessionStatus,
    generation: u64,
    broker: Option<BrokerClient>,
    subscription: Option<Subscription>,
    history_state: HistoryState,
    history_task: Option<JoinHandle<()>>,
    transport_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    transport_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    history_tx: mpsc::UnboundedSender<(u64, HistoryResult)>,
    history_rx: mpsc::UnboundedReceiver<(u64, HistoryResult)>,
}

impl RoomSession {
    pub fn new(
        config: SessionConfig,
        transports: Arc<dyn TransportFactory>,
        history: Arc<dyn RoomHistory>,
        listener: Box<dyn SessionListener>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (history_tx, history_rx) = mpsc::unbounded_channel();
        Self {
            config,
            transports,
            history,
            listener,
            log: MessageLog::new(),
            session: None,
            resting: SessionStatus::Idle,
            generation: 0,
            broker: None,
            subscription: None,
            history_state: HistoryState::Applied,
            history_task: None,
            transport_tx,
            transport_rx,
            history_tx,
            history_rx,
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        self.session.as_ref().map_or(self.resting, Session::status)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// A copy of the message log in arrival order.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.log.snapshot()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Incremented whenever a session starts or ends.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Starts a session in `room` as `user_name`.
    ///
    /// Any previous session, live or failed, is torn down first.  The call
    /// returns once the connection attempt and history fetch have been
    /// started; progress is reported through the listener as [`pump`] applies
    /// their outcomes.  Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidInput`] when the room id or user name is
    /// blank.  The current session is left untouched in that case.
    ///
    /// [`pump`]: RoomSession::pump
    pub fn join(&mut self, room: &RoomDescriptor, user_name: &str) -> Result<(), SessionError> {
        validate_identity(&room.room_id, user_name)
            .map_err(|e| SessionError::InvalidInput(e.to_string()))?;

        self.leave();
        self.generation += 1;
        self.log.clear();
        let generation = self.generation;

        self.session = Some(Session {
            room_id: room.room_id.clone(),
            user_name: user_name.to_string(),
            status: SessionStatus::Idle,
        });
        info!(room = %room.room_id, user = user_name, generation, "joining room");
        self.transition(SessionStatus::Connecting);

        self.history_state = HistoryState::Loading {
            buffered: Vec::new(),
        };
        self.spawn_history_fetch(generation, room.room_id.clone());

        let mut broker = BrokerClient::new(
            self.transports.create(),
            self.config.host.clone(),
            self.config.handshake_timeout,
        );
        broker.open_transport(
            &self.config.endpoint,
            TransportEvents::new(generation, self.transport_tx.clone()),
        );
        self.broker = Some(broker);
        Ok(())
    }

    /// Publishes `text` to the room as the session's user.
    ///
    /// The message is not added to the log here; it shows up when the broker
    /// fans it back out on the room topic.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionNotReady`] unless the session is `Active`.
    /// - [`SessionError::InvalidInput`] for blank text.
    /// - [`SessionError::NotConnected`] if the connection dropped underneath.
    pub fn send(&mut self, text: &str) -> Result<(), SessionError> {
        let status = self.status();
        let (Some(session), Some(broker)) = (self.session.as_ref(), self.broker.as_mut()) else {
            return Err(SessionError::SessionNotReady(status));
        };
        if status != SessionStatus::Active {
            return Err(SessionError::SessionNotReady(status));
        }
        if text.trim().is_empty() {
            return Err(SessionError::InvalidInput("message is empty".to_string()));
        }

        let message = ChatMessage::new(
            session.user_name.clone(),
            text,
            session.room_id.clone(),
            Utc::now(),
        );
        let destination = format!("{}{}", self.config.send_prefix, session.room_id);
        broker
            .publish(&destination, &message)
            .map_err(|e| match e {
                BrokerError::Protocol(detail) => SessionError::InvalidInput(detail),
                other => {
                    debug!("publish failed: {other}");
                    SessionError::NotConnected
                }
            })
    }

    /// Ends the current session and returns to `Idle`.
    ///
    /// Safe to call in any state.  From `Connecting` or `Subscribing` the
    /// pending handshake is abandoned; anything it resolves to later is
    /// discarded.  From `Failed` this is the cleanup step back to `Idle`.
    pub fn leave(&mut self) {
        match self.status() {
            SessionStatus::Idle | SessionStatus::Closing => {}
            SessionStatus::Failed => {
                self.generation += 1;
                self.log.clear();
                self.end_session(SessionStatus::Idle);
            }
            SessionStatus::Connecting | SessionStatus::Subscribing | SessionStatus::Active => {
                info!(generation = self.generation, "leaving room");
                self.transition(SessionStatus::Closing);
                self.release_connection();
                self.generation += 1;
                self.log.clear();
                self.end_session(SessionStatus::Idle);
            }
        }
    }

    // ── Event loop ────────────────────────────────────────────────────────────

    /// Waits for the next transport event, history batch, or handshake
    /// deadline and applies it.
    ///
    /// Cancel-safe: dropping the future before it completes loses nothing.
    pub async fn pump(&mut self) {
        let deadline = self
            .broker
            .as_ref()
            .and_then(BrokerClient::handshake_deadline);

        tokio::select! {
            biased;
            Some((generation, result)) = self.history_rx.recv() => {
                self.apply_history(generation, result);
            }
            Some((generation, event)) = self.transport_rx.recv() => {
                self.on_transport_event(generation, event);
            }
            () = wait_until(deadline) => self.on_handshake_deadline(),
        }
    }

    /// Applies every outcome that is already available without waiting.
    ///
    /// Returns the number of outcomes applied.
    pub fn drain_ready(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok((generation, result)) = self.history_rx.try_recv() {
                self.apply_history(generation, result);
            } else if let Ok((generation, event)) = self.transport_rx.try_recv() {
                self.on_transport_event(generation, event);
            } else {
                break;
            }
            handled += 1;
        }

        let expired = self
            .broker
            .as_ref()
            .and_then(BrokerClient::handshake_deadline)
            .is_some_and(|deadline| Instant::now() >= deadline);
        if expired {
            self.on_handshake_deadline();
            handled += 1;
        }
        handled
    }

    /// Yields to other tasks and drains ready outcomes until nothing new has
    /// arrived for a few rounds.
    pub async fn run_until_settled(&mut self) {
        let mut quiet_rounds = 0;
        while quiet_rounds < SETTLE_ROUNDS {
            tokio::task::yield_now().await;
            if self.drain_ready() == 0 {
                quiet_rounds += 1;
            } else {
                quiet_rounds = 0;
            }
        }
    }

    // ── Continuations ─────────────────────────────────────────────────────────

    fn on_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || !self.status().is_live() {
            debug!(
                generation,
                current = self.generation,
                ?event,
                "dropping stale transport event"
            );
            return;
        }

        match event {
            TransportEvent::Opened => self.on_transport_opened(),
            TransportEvent::Message(text) => {
                let events = match self.broker.as_mut() {
                    Some(broker) => broker.handle_inbound(&text),
                    None => return,
                };
                for event in events {
                    if generation != self.generation {
                        debug!("discarding frames queued behind a session failure");
                        break;
                    }
                    self.on_broker_event(event);
                }
            }
            TransportEvent::ConnectFailed { reason } => {
                self.fail(SessionError::ConnectFailure(reason));
            }
            TransportEvent::Closed { reason } => {
                if let Some(broker) = self.broker.as_mut() {
                    broker.transport_closed();
                }
                let error = if self.status() == SessionStatus::Active {
                    SessionError::TransportClosed(reason)
                } else {
                    SessionError::ConnectFailure(format!("connection closed during setup: {reason}"))
                };
                self.fail(error);
            }
        }
    }

    fn on_transport_opened(&mut self) {
        if self.status() != SessionStatus::Connecting {
            debug!(status = %self.status(), "ignoring transport open outside Connecting");
            return;
        }
        let result = match self.broker.as_mut() {
            Some(broker) => broker.connect(),
            None => Err(BrokerError::NotConnected),
        };
        if let Err(e) = result {
            self.fail(SessionError::ConnectFailure(e.to_string()));
        }
    }

    fn on_broker_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected { .. } => self.on_handshake_complete(),
            BrokerEvent::SubscriptionConfirmed { handle } => {
                let ours = self
                    .subscription
                    .as_ref()
                    .is_some_and(|s| s.handle() == handle);
                if ours && self.status() == SessionStatus::Subscribing {
                    self.transition(SessionStatus::Active);
                } else {
                    debug!(%handle, "ignoring subscription confirmation");
                }
            }
            BrokerEvent::Receipt { id } => debug!(%id, "receipt"),
            BrokerEvent::Message {
                subscription,
                destination,
                body,
            } => self.on_room_message(&subscription, &destination, &body),
            BrokerEvent::ServerError { message } => {
                let error = if self.status() == SessionStatus::Active {
                    SessionError::TransportClosed(format!("broker error: {message}"))
                } else {
                    SessionError::ConnectFailure(format!("broker rejected session: {message}"))
                };
                self.fail(error);
            }
        }
    }

    fn on_handshake_complete(&mut self) {
        if self.status() != SessionStatus::Connecting {
            warn!(status = %self.status(), "handshake completed outside Connecting");
            return;
        }
        let Some(room_id) = self.session.as_ref().map(|s| s.room_id.clone()) else {
            return;
        };
        self.transition(SessionStatus::Subscribing);

        let topic = RoomDescriptor::new(room_id).topic(&self.config.topic_prefix);
        let want_receipt = self.config.subscribe_receipts;
        let result = match self.broker.as_mut() {
            Some(broker) => broker.subscribe(&topic, want_receipt),
            None => Err(BrokerError::NotConnected),
        };
        match result {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                if !want_receipt {
                    self.transition(SessionStatus::Active);
                }
            }
            Err(e) => self.fail(SessionError::ConnectFailure(format!("subscribe failed: {e}"))),
        }
    }

    fn on_room_message(&mut self, subscription: &str, destination: &str, body: &str) {
        let addressed_to_us = self.subscription.as_ref().is_some_and(|current| {
            current.handle() == subscription
                && (destination.is_empty() || destination == current.topic())
        });
        if !addressed_to_us {
            debug!(subscription, destination, "dropping message outside the active subscription");
            return;
        }
        let Some(room_id) = self.session.as_ref().map(|s| s.room_id.clone()) else {
            return;
        };
        match ChatMessage::from_json(body, &room_id) {
            Ok(message) => self.deliver(message),
            Err(e) => warn!(destination, "dropping undecodable chat message: {e}"),
        }
    }

    fn deliver(&mut self, message: ChatMessage) {
        match &mut self.history_state {
            HistoryState::Loading { buffered } => {
                debug!("holding live message until history is applied");
                buffered.push(message);
            }
            HistoryState::Applied => {
                self.listener.on_message(&message);
                self.log.append(message);
            }
        }
    }

    fn apply_history(&mut self, generation: u64, result: HistoryResult) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale history batch");
            return;
        }
        let buffered = match std::mem::replace(&mut self.history_state, HistoryState::Applied) {
            HistoryState::Loading { buffered } => buffered,
            HistoryState::Applied => {
                debug!("history already applied");
                return;
            }
        };
        self.history_task = None;
        let room_id = self
            .session
            .as_ref()
            .map(|s| s.room_id.clone())
            .unwrap_or_default();

        match result {
            Ok(batch) => {
                info!(room = %room_id, count = batch.len(), "history applied");
                let batch: Vec<ChatMessage> = batch
                    .into_iter()
                    .map(|m| m.in_room_if_unset(&room_id))
                    .collect();
                for message in &batch {
                    self.listener.on_message(message);
                }
                self.log.extend_history(batch);
            }
            Err(e) => {
                let error = SessionError::HistoryLoadFailure(e.to_string());
                warn!(room = %room_id, "{error}; continuing with an empty log");
                self.listener.on_error(error.kind(), &error.to_string());
            }
        }

        for message in buffered {
            self.listener.on_message(&message);
            self.log.append(message);
        }
    }

    fn on_handshake_deadline(&mut self) {
        let Some(broker) = self.broker.as_mut() else {
            return;
        };
        if let Err(e) = broker.check_handshake(Instant::now()) {
            let error = match e {
                BrokerError::HandshakeTimeout(timeout) => SessionError::HandshakeTimeout(timeout),
                other => SessionError::ConnectFailure(other.to_string()),
            };
            self.fail(error);
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn spawn_history_fetch(&mut self, generation: u64, room_id: String) {
        let history = Arc::clone(&self.history);
        let tx = self.history_tx.clone();
        let limit = self.config.history_timeout;
        self.history_task = Some(tokio::spawn(async move {
            let result = tokio::time::timeout(limit, history.history(&room_id))
                .await
                .unwrap_or_else(|_| Err(RoomServiceError::Timeout(limit)));
            if tx.send((generation, result)).is_err() {
                debug!("session dropped before history arrived");
            }
        }));
    }

    fn transition(&mut self, next: SessionStatus) {
        let current = self.status();
        if !current.can_transition_to(next) {
            warn!(%current, %next, "refusing invalid session transition");
            return;
        }
        match self.session.as_mut() {
            Some(session) => session.status = next,
            None => self.resting = next,
        }
        info!(from = %current, to = %next, "session status changed");
        self.listener.on_status_change(next);
    }

    /// Moves to `Idle` or `Failed` and drops the session record.
    fn end_session(&mut self, last: SessionStatus) {
        self.transition(last);
        if self.status() == last {
            self.session = None;
            self.resting = last;
        }
    }

    fn release_connection(&mut self) {
        if let Some(mut broker) = self.broker.take() {
            if let Some(subscription) = self.subscription.take() {
                broker.unsubscribe(&subscription);
            }
            broker.disconnect();
        }
        self.subscription = None;
        if let Some(task) = self.history_task.take() {
            task.abort();
        }
        self.history_state = HistoryState::Applied;
    }

    fn fail(&mut self, error: SessionError) {
        warn!(kind = %error.kind(), generation = self.generation, "session failed: {error}");
        self.release_connection();
        self.generation += 1;
        self.end_session(SessionStatus::Failed);
        self.listener.on_error(error.kind(), &error.to_string());
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.release_connection();
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
