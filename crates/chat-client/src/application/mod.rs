//! Application layer of the chat client.
//!
//! # Components
//!
//! - **`transport`** – The [`TransportSocket`](transport::TransportSocket)
//!   trait: one duplex text connection whose outcomes arrive as
//!   generation-tagged events.
//!
//! - **`broker`** – [`BrokerClient`](broker::BrokerClient) speaks STOMP over a
//!   transport: handshake, subscribe, publish, teardown.
//!
//! - **`room_session`** – [`RoomSession`](room_session::RoomSession), the state
//!   machine that owns the broker client for one room and feeds the log.
//!
//! - **`message_log`** – Arrival-ordered message list for the active room.
//!
//! - **`collaborators`** / **`listener`** – The room services the session
//!   calls out to and the notification surface it reports through.

pub mod broker;
pub mod collaborators;
pub mod listener;
pub mod message_log;
pub mod room_session;
pub mod transport;
