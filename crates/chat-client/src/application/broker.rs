//! STOMP publish/subscribe client layered on a [`TransportSocket`].
//!
//! The broker client is a synchronous state machine: it writes frames through
//! the transport and turns inbound transport text into [`BrokerEvent`]s.  It
//! never waits on the network itself; the owning session feeds it inbound text
//! and polls [`BrokerClient::check_handshake`] when the deadline passes.
//!
//! # What is STOMP? (for newcomers)
//!
//! STOMP is a small text protocol for talking to a message broker.  Every
//! frame is a command line, a block of `name:value` headers, a blank line and
//! a body terminated by a NUL byte.  A client opens a session with `CONNECT`,
//! asks for the messages sent to a destination with `SUBSCRIBE`, and posts to
//! a destination with `SEND`.  The broker answers with `CONNECTED`, pushes
//! `MESSAGE` frames for each subscription, and reports failures with `ERROR`.
//!
//! The transport below this client already strips any SockJS envelope, so the
//! text handed to [`BrokerClient::handle_inbound`] is plain STOMP.  One
//! transport message may carry several frames, or only part of one; the
//! internal [`FrameBuffer`] reassembles them.
//!
//! # Handshake
//!
//! ```text
//! connect()      ──► CONNECT            state: Connecting, deadline armed
//! handle_inbound ◄── CONNECTED          state: Connected, BrokerEvent::Connected
//! check_handshake(now >= deadline)      state: Closed, BrokerError::HandshakeTimeout
//! ```
//!
//! # Inbound frame routing
//!
//! | Frame       | Condition                          | Result                                  |
//! |-------------|------------------------------------|-----------------------------------------|
//! | `CONNECTED` | state is Connecting                | `Connected`, deadline cleared           |
//! | `CONNECTED` | any other state                    | logged and dropped                      |
//! | `MESSAGE`   | `subscription` header is ours      | `Message`                               |
//! | `MESSAGE`   | unknown or cancelled subscription  | dropped                                 |
//! | `RECEIPT`   | id was requested by `subscribe`    | `SubscriptionConfirmed`                 |
//! | `RECEIPT`   | any other id                       | `Receipt`                               |
//! | `ERROR`     | always                             | `ServerError`, client closed            |
//! | other       | client-side commands               | logged and dropped                      |
//!
//! Processing stops at an `ERROR` frame: anything behind it in the same
//! transport message belongs to a session that no longer exists.
//!
//! # Receipts
//!
//! A subscription may ask for a receipt.  The receipt id is remembered until
//! the matching `RECEIPT` arrives, the subscription is cancelled, or the
//! client shuts down.  A receipt that shows up after any of those is reported
//! as a plain [`BrokerEvent::Receipt`], which the session ignores.
//!
//! # Undecodable input
//!
//! A malformed frame is logged and the rest of the current transport message
//! is dropped.  A frame that declares, or accumulates, more than
//! [`MAX_FRAME_SIZE`](chat_core::protocol::MAX_FRAME_SIZE) bytes is discarded
//! together with whatever was buffered behind it, so a hostile peer cannot
//! make the client hold an unbounded amount of text.  The next transport
//! message starts from a clean buffer.

use std::collections::HashMap;
use std::time::Duration;

use chat_core::protocol::{encode_frame, Command, Frame, FrameBuffer, SequenceCounter};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::transport::{TransportError, TransportEvents, TransportSocket};

/// Errors produced by the broker client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The operation needs a completed handshake.
    #[error("broker session is not connected")]
    NotConnected,

    /// No CONNECTED frame arrived within the configured interval.
    #[error("broker did not acknowledge the session within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A payload could not be encoded or a frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The broker sent an ERROR frame.
    #[error("broker error: {0}")]
    Server(String),
}

/// Lifecycle of one broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// The transport may be opening; no CONNECT sent yet.
    Disconnected,
    /// CONNECT sent, waiting for CONNECTED.
    Connecting,
    Connected,
    /// Disconnected, timed out, or rejected.  Terminal.
    Closed,
}

/// Handle for an active topic subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    topic: String,
    handle: String,
    receipt: Option<String>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The opaque subscription id sent in the SUBSCRIBE `id` header.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Receipt id requested for this subscription, if any.
    pub fn receipt(&self) -> Option<&str> {
        self.receipt.as_deref()
    }
}

/// What an inbound frame meant for the broker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The handshake completed.
    Connected { version: Option<String> },
    /// A message delivered on one of our subscriptions.
    Message {
        subscription: String,
        destination: String,
        body: String,
    },
    /// The broker acknowledged a SUBSCRIBE that asked for a receipt.
    SubscriptionConfirmed { handle: String },
    /// Any other receipt.
    Receipt { id: String },
    /// The broker rejected the session; the client is now closed.
    ServerError { message: String },
}

/// Frame protocol state for one connection.
pub struct BrokerClient {
    transport: Box<dyn TransportSocket>,
    host: String,
    handshake_timeout: Duration,
    state: BrokerState,
    deadline: Option<Instant>,
    inbound: FrameBuffer,
    ids: SequenceCounter,
    /// subscription id → destination
    subscriptions: HashMap<String, String>,
    /// receipt id → subscription id
    pending_receipts: HashMap<String, String>,
}

impl BrokerClient {
    /// Creates a client over `transport`.  `host` goes into the CONNECT
    /// frame's `host` header.
    pub fn new(
        transport: Box<dyn TransportSocket>,
        host: impl Into<String>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            host: host.into(),
            handshake_timeout,
            state: BrokerState::Disconnected,
            deadline: None,
            inbound: FrameBuffer::new(),
            ids: SequenceCounter::new(),
            subscriptions: HashMap::new(),
            pending_receipts: HashMap::new(),
        }
    }

    pub fn state(&self) -> BrokerState {
        self.state
    }

    /// Starts opening the underlying transport.
    pub fn open_transport(&mut self, endpoint: &str, events: TransportEvents) {
        debug!(endpoint, generation = events.generation(), "opening transport");
        self.transport.open(endpoint, events);
    }

    /// Sends CONNECT and arms the handshake deadline.
    ///
    /// The handshake resolves when [`handle_inbound`](Self::handle_inbound)
    /// yields [`BrokerEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotConnected`] if the client is not in its
    /// initial state, or [`BrokerError::Transport`] if the transport refuses
    /// the frame.
    pub fn connect(&mut self) -> Result<(), BrokerError> {
        if self.state != BrokerState::Disconnected {
            return Err(BrokerError::NotConnected);
        }
        self.transport
            .send(&encode_frame(&Frame::connect(&self.host)))?;
        self.state = BrokerState::Connecting;
        self.deadline = Some(Instant::now() + self.handshake_timeout);
        debug!(host = %self.host, timeout = ?self.handshake_timeout, "CONNECT sent");
        Ok(())
    }

    /// When the pending handshake expires, if one is pending.
    pub fn handshake_deadline(&self) -> Option<Instant> {
        match self.state {
            BrokerState::Connecting => self.deadline,
            _ => None,
        }
    }

    /// Fails the handshake if `now` is past its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::HandshakeTimeout`] and closes the transport when
    /// the deadline has passed without a CONNECTED frame.
    pub fn check_handshake(&mut self, now: Instant) -> Result<(), BrokerError> {
        match self.handshake_deadline() {
            Some(deadline) if now >= deadline => {
                warn!(timeout = ?self.handshake_timeout, "broker handshake timed out");
                self.shut_down();
                Err(BrokerError::HandshakeTimeout(self.handshake_timeout))
            }
            _ => Ok(()),
        }
    }

    /// Feeds one inbound transport message and returns the events it carried,
    /// in frame order.
    pub fn handle_inbound(&mut self, text: &str) -> Vec<BrokerEvent> {
        if self.state == BrokerState::Closed {
            debug!(len = text.len(), "ignoring inbound text on closed broker client");
            return Vec::new();
        }
        self.inbound.push(text);

        let mut events = Vec::new();
        loop {
            let frame = match self.inbound.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("dropping undecodable broker input: {e}");
                    break;
                }
            };
            if let Some(event) = self.on_frame(frame) {
                let fatal = matches!(event, BrokerEvent::ServerError { .. });
                events.push(event);
                if fatal {
                    break;
                }
            }
        }
        events
    }

    /// Subscribes to `topic`, optionally asking the broker for a receipt.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotConnected`] before the handshake completes.
    pub fn subscribe(
        &mut self,
        topic: &str,
        want_receipt: bool,
    ) -> Result<Subscription, BrokerError> {
        if self.state != BrokerState::Connected {
            return Err(BrokerError::NotConnected);
        }
        let handle = self.ids.next_id("sub");
        let receipt = want_receipt.then(|| self.ids.next_id("rcpt"));
        self.transport.send(&encode_frame(&Frame::subscribe(
            &handle,
            topic,
            receipt.as_deref(),
        )))?;

        self.subscriptions.insert(handle.clone(), topic.to_string());
        if let Some(receipt) = &receipt {
            self.pending_receipts.insert(receipt.clone(), handle.clone());
        }
        info!(topic, %handle, "subscribed");
        Ok(Subscription {
            topic: topic.to_string(),
            handle,
            receipt,
        })
    }

    /// Serialises `payload` as JSON and sends it to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotConnected`] before the handshake completes,
    /// [`BrokerError::Protocol`] if the payload does not serialise, and
    /// [`BrokerError::Transport`] if the transport refuses the frame.
    pub fn publish<T: Serialize>(
        &mut self,
        destination: &str,
        payload: &T,
    ) -> Result<(), BrokerError> {
        if self.state != BrokerState::Connected {
            return Err(BrokerError::NotConnected);
        }
        let body =
            serde_json::to_string(payload).map_err(|e| BrokerError::Protocol(e.to_string()))?;
        self.transport.send(&encode_frame(&Frame::send(
            destination,
            "application/json",
            body,
        )))?;
        debug!(destination, "published");
        Ok(())
    }

    /// Cancels `subscription`.  A no-op when it is already cancelled or the
    /// client is no longer connected.
    pub fn unsubscribe(&mut self, subscription: &Subscription) {
        if self.subscriptions.remove(&subscription.handle).is_none() {
            return;
        }
        if let Some(receipt) = &subscription.receipt {
            self.pending_receipts.remove(receipt);
        }
        if self.state != BrokerState::Connected {
            return;
        }
        match self
            .transport
            .send(&encode_frame(&Frame::unsubscribe(&subscription.handle)))
        {
            Ok(()) => info!(topic = %subscription.topic, "unsubscribed"),
            Err(e) => debug!("UNSUBSCRIBE not sent: {e}"),
        }
    }

    /// Ends the broker session and closes the transport.  Idempotent.
    pub fn disconnect(&mut self) {
        if self.state == BrokerState::Closed {
            return;
        }
        if self.state == BrokerState::Connected {
            if let Err(e) = self
                .transport
                .send(&encode_frame(&Frame::disconnect(None)))
            {
                debug!("DISCONNECT not sent: {e}");
            }
        }
        self.shut_down();
        info!("broker session closed");
    }

    /// Records that the transport closed underneath the client.
    pub fn transport_closed(&mut self) {
        if self.state != BrokerState::Closed {
            debug!(state = ?self.state, "transport closed under broker client");
        }
        self.shut_down();
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn shut_down(&mut self) {
        self.state = BrokerState::Closed;
        self.deadline = None;
        self.subscriptions.clear();
        self.pending_receipts.clear();
        self.inbound.clear();
        self.transport.close();
    }

    fn on_frame(&mut self, frame: Frame) -> Option<BrokerEvent> {
        match frame.command {
            Command::Connected => {
                if self.state != BrokerState::Connecting {
                    warn!(state = ?self.state, "unexpected CONNECTED frame");
                    return None;
                }
                self.state = BrokerState::Connected;
                self.deadline = None;
                let version = frame.header("version").map(str::to_string);
                info!(version = version.as_deref().unwrap_or("1.0"), "broker session established");
                Some(BrokerEvent::Connected { version })
            }
            Command::Message => {
                let subscription = frame.header("subscription").unwrap_or_default().to_string();
                if !self.subscriptions.contains_key(&subscription) {
                    debug!(%subscription, "dropping MESSAGE for unknown subscription");
                    return None;
                }
                let destination = frame.header("destination").unwrap_or_default().to_string();
                Some(BrokerEvent::Message {
                    subscription,
                    destination,
                    body: frame.body,
                })
            }
            Command::Receipt => {
                let id = frame.header("receipt-id").unwrap_or_default().to_string();
                match self.pending_receipts.remove(&id) {
                    Some(handle) => Some(BrokerEvent::SubscriptionConfirmed { handle }),
                    None => Some(BrokerEvent::Receipt { id }),
                }
            }
            Command::Error => {
                let message = frame
                    .header("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body.trim_end().to_string());
                warn!(%message, "broker sent ERROR frame");
                self.shut_down();
                Some(BrokerEvent::ServerError { message })
            }
            other => {
                warn!(command = %other, "ignoring unexpected client-side frame");
                None
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
