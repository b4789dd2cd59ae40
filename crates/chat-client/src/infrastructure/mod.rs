//! Infrastructure layer for the chat client.
//!
//! Contains the adapters the application layer is driven through: network
//! transports, the room REST services, configuration storage, and the
//! terminal front end.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `chat_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`network`** – [`TransportSocket`] implementations: native WebSocket,
//!   SockJS over WebSocket, SockJS XHR polling, and the fallback negotiator
//!   that tries them in order.  An in-memory transport is also provided for
//!   tests.
//!
//! - **`http`** – `reqwest` client for room creation, room lookup and
//!   message history.
//!
//! - **`storage`** – TOML configuration file in the platform config directory.
//!
//! - **`console`** – Line-oriented terminal presentation: message rendering,
//!   relative timestamps, input commands, and the channel-backed session
//!   listener.
//!
//! [`TransportSocket`]: crate::application::transport::TransportSocket

pub mod console;
pub mod http;
pub mod network;
pub mod storage;
