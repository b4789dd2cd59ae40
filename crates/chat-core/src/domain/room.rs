//! Room descriptor and join-form validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for the room / user identity a session is opened with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("room id must not be empty")]
    EmptyRoomId,
    #[error("user name must not be empty")]
    EmptyUserName,
}

/// A room confirmed to exist by the room-admin service.
///
/// The server also returns the room's stored messages in the same object;
/// those are ignored here because history is fetched separately, once per
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDescriptor {
    #[serde(rename = "roomId")]
    pub room_id: String,
    /// Server-side storage id, when the server exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RoomDescriptor {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            id: None,
        }
    }

    /// Broker destination the room's messages are fanned out on.
    pub fn topic(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.room_id)
    }
}

/// Checks that both identity fields are non-blank.
///
/// # Errors
///
/// Returns the first empty field as a [`DomainError`].
pub fn validate_identity(room_id: &str, user_name: &str) -> Result<(), DomainError> {
    if room_id.trim().is_empty() {
        return Err(DomainError::EmptyRoomId);
    }
    if user_name.trim().is_empty() {
        return Err(DomainError::EmptyUserName);
    }
    Ok(())
}
