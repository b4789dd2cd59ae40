//! chat-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does chat-client do?
//!
//! The client joins one chat room at a time on a STOMP message broker:
//!
//! 1. Confirms the room exists (or creates it) through the room-admin HTTP API.
//! 2. Opens a duplex connection to the broker endpoint, falling back from a
//!    native WebSocket to SockJS transports when the upgrade is blocked.
//! 3. Negotiates a broker session (CONNECT/CONNECTED) and subscribes to the
//!    room topic.
//! 4. Seeds the message log with the room's history, then appends live
//!    messages in the order they arrive.
//! 5. Publishes typed messages to the room; they appear in the log only once
//!    the broker echoes them back.

/// Application layer: the session core and the seams it is driven through.
pub mod application;

/// Infrastructure layer: network transports, HTTP services, config, console.
pub mod infrastructure;
