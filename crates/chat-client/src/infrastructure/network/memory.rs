//! In-memory transport for tests and demos.
//!
//! [`MemoryTransportFactory`] hands out [`MemoryTransport`]s and keeps a
//! [`MemoryPeer`] for each, which plays the server side: it decides when the
//! connection opens, injects inbound text, drops the connection, and records
//! everything the client sent.  Nothing happens until the peer acts, so tests
//! control the exact interleaving of events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chat_core::{Frame, FrameBuffer};

use crate::application::transport::{
    TransportError, TransportEvent, TransportEvents, TransportFactory, TransportSocket,
};

#[derive(Debug, Default)]
struct PeerState {
    endpoint: Option<String>,
    events: Option<TransportEvents>,
    open: bool,
    closed_by_client: bool,
    sent: Vec<String>,
}

/// Server side of one in-memory connection.
#[derive(Debug, Clone, Default)]
pub struct MemoryPeer {
    state: Arc<Mutex<PeerState>>,
}

impl MemoryPeer {
    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emits `event` to the client that opened this connection.  Events sent
    /// before `open` are discarded.
    fn emit(&self, event: TransportEvent) -> bool {
        let events = self.lock().events.clone();
        events.is_some_and(|events| events.emit(event))
    }

    /// Completes the client's `open`.
    pub fn accept(&self) -> bool {
        self.lock().open = true;
        self.emit(TransportEvent::Opened)
    }

    /// Fails the client's `open`.
    pub fn refuse(&self, reason: &str) -> bool {
        self.emit(TransportEvent::ConnectFailed {
            reason: reason.to_string(),
        })
    }

    /// Delivers one inbound text message.
    pub fn deliver(&self, text: &str) -> bool {
        self.emit(TransportEvent::Message(text.to_string()))
    }

    /// Closes an open connection from the server side.
    pub fn drop_connection(&self, reason: &str) -> bool {
        self.lock().open = false;
        self.emit(TransportEvent::Closed {
            reason: reason.to_string(),
        })
    }

    /// Endpoint the client asked for, once it has called `open`.
    pub fn endpoint(&self) -> Option<String> {
        self.lock().endpoint.clone()
    }

    /// Every text message the client sent, in order.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// The client's sent text decoded as broker frames.
    pub fn sent_frames(&self) -> Vec<Frame> {
        let mut buffer = FrameBuffer::new();
        for text in self.sent() {
            buffer.push(&text);
        }
        std::iter::from_fn(|| buffer.next_frame().ok().flatten()).collect()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Whether the client called `close`.
    pub fn closed_by_client(&self) -> bool {
        self.lock().closed_by_client
    }
}

/// Client side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    peer: MemoryPeer,
}

impl MemoryTransport {
    /// Creates a connected pair.
    pub fn pair() -> (Self, MemoryPeer) {
        let peer = MemoryPeer::default();
        (Self { peer: peer.clone() }, peer)
    }
}

impl TransportSocket for MemoryTransport {
    fn open(&mut self, endpoint: &str, events: TransportEvents) {
        let mut state = self.peer.lock();
        state.endpoint = Some(endpoint.to_string());
        state.events = Some(events);
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let mut state = self.peer.lock();
        if !state.open {
            return Err(TransportError::NotConnected);
        }
        state.sent.push(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.peer.lock();
        state.open = false;
        state.closed_by_client = true;
    }

    fn is_open(&self) -> bool {
        self.peer.lock().open
    }
}

/// Factory that records the peer of every transport it creates.
#[derive(Debug, Default)]
pub struct MemoryTransportFactory {
    peers: Mutex<Vec<MemoryPeer>>,
}

impl MemoryTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<'_, Vec<MemoryPeer>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Peer of the `index`-th transport created, oldest first.
    pub fn peer(&self, index: usize) -> Option<MemoryPeer> {
        self.peers().get(index).cloned()
    }

    /// Peer of the most recently created transport.
    pub fn latest(&self) -> Option<MemoryPeer> {
        self.peers().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.peers().len()
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn create(&self) -> Box<dyn TransportSocket> {
        let (transport, peer) = MemoryTransport::pair();
        self.peers().push(peer);
        Box::new(transport)
    }
}
