//! HTTP adapters for the chat server's REST API.

pub mod rooms;

pub use rooms::HttpRoomService;
