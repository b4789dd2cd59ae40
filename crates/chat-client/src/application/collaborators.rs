//! Request/response services the session relies on but does not own.
//!
//! Both are injected as trait objects so the session can be driven by test
//! doubles; the HTTP implementations live in
//! `infrastructure::http::rooms`.

use std::time::Duration;

use async_trait::async_trait;
use chat_core::{ChatMessage, RoomDescriptor};
use thiserror::Error;

/// Errors returned by the room services.
#[derive(Debug, Error)]
pub enum RoomServiceError {
    #[error("room {0:?} not found")]
    RoomNotFound(String),

    #[error("room {0:?} already exists")]
    RoomAlreadyExists(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("invalid service URL: {0}")]
    InvalidUrl(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Source of the messages a room already holds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomHistory: Send + Sync {
    /// Returns the room's stored messages, oldest first.
    async fn history(&self, room_id: &str) -> Result<Vec<ChatMessage>, RoomServiceError>;
}

/// Creates rooms and confirms that they exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomAdmin: Send + Sync {
    /// # Errors
    ///
    /// [`RoomServiceError::RoomAlreadyExists`] when the id is taken.
    async fn create_room(&self, room_id: &str) -> Result<RoomDescriptor, RoomServiceError>;

    /// # Errors
    ///
    /// [`RoomServiceError::RoomNotFound`] when no such room exists.
    async fn join_room(&self, room_id: &str) -> Result<RoomDescriptor, RoomServiceError>;
}
