//! The duplex text connection the broker protocol runs over.
//!
//! A [`TransportSocket`] opens asynchronously: `open` only starts the attempt,
//! and the outcome arrives later as a [`TransportEvent`] on the channel the
//! caller passed in.  Every event is tagged with the generation the caller
//! supplied, so the session can discard events from a connection it has
//! already torn down.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

/// Errors returned synchronously by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// `send` was called while the connection is not open.  Nothing is queued.
    #[error("transport is not connected")]
    NotConnected,
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// The connection closed.
    #[error("connection closed: {0}")]
    Closed(String),
    /// A lower-level I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Asynchronous outcomes reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open and `send` will now succeed.
    Opened,
    /// One inbound text message, delivered in transport order.
    Message(String),
    /// The connection never opened.
    ConnectFailed { reason: String },
    /// An open connection was closed by the peer or an intermediary.
    Closed { reason: String },
}

/// Sender half handed to a transport on `open`.
///
/// Cloning is cheap; the transport's background tasks each keep a copy.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Delivers `event` tagged with this connection's generation.
    ///
    /// Returns `false` when the receiving session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        trace!(generation = self.generation, ?event, "transport event");
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// One duplex, message-oriented connection.
pub trait TransportSocket: Send {
    /// Starts connecting to `endpoint`.
    ///
    /// Completion is signalled through `events` with [`TransportEvent::Opened`]
    /// or [`TransportEvent::ConnectFailed`]; inbound text follows as
    /// [`TransportEvent::Message`].
    fn open(&mut self, endpoint: &str, events: TransportEvents);

    /// Sends one text message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] when the connection is not open.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Closes the connection.  Closing twice is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Builds a fresh transport for each session.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn TransportSocket>;
}
