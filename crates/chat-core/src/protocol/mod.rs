//! Protocol module containing the STOMP frame model, its text codec, and the
//! SockJS envelope used by the fallback transports.

pub mod codec;
pub mod frame;
pub mod sequence;
pub mod sockjs;

pub use codec::{decode_frame, encode_frame, FrameBuffer, ProtocolError, MAX_FRAME_SIZE};
pub use frame::{Command, Frame};
pub use sequence::SequenceCounter;
pub use sockjs::{decode_sockjs_frame, encode_sockjs_messages, SockJsFrame};
