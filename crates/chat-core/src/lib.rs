//! # chat-core
//!
//! Shared library for the room chat client containing the broker wire codec,
//! the SockJS transport framing, and the chat domain types.
//!
//! It has zero dependencies on sockets, async runtimes, or terminals; every
//! function here is a pure transformation that can be tested in isolation.
//!
//! # Architecture overview
//!
//! The chat client talks to a room-scoped message broker over one duplex
//! connection.  On top of that connection runs a text frame protocol (STOMP):
//! the client negotiates a session, subscribes to the room topic, and sends
//! chat messages addressed to the room's send destination.
//!
//! - **`protocol`** – How text travels over the connection.  STOMP frames are
//!   encoded to `COMMAND\nheader:value\n\nbody\0` and decoded back into
//!   [`Frame`] values.  When native WebSockets are blocked, the same frames are
//!   wrapped in SockJS envelopes (`a["..."]`).
//!
//! - **`domain`** – The values the rest of the client reasons about:
//!   [`ChatMessage`], [`RoomDescriptor`], and the [`SessionStatus`] lifecycle.

pub mod domain;
pub mod protocol;

pub use domain::message::ChatMessage;
pub use domain::room::{validate_identity, DomainError, RoomDescriptor};
pub use domain::status::SessionStatus;
pub use protocol::codec::{decode_frame, encode_frame, FrameBuffer, ProtocolError};
pub use protocol::frame::{Command, Frame};
