//! Domain types: the chat message record, the room descriptor returned by the
//! room-admin service, and the session lifecycle states.

pub mod message;
pub mod room;
pub mod status;

pub use message::ChatMessage;
pub use room::{validate_identity, DomainError, RoomDescriptor};
pub use status::SessionStatus;
