//! Signaling wire protocol: JSON message types and the text codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_frame_payload, encode_frame_payload, ProtocolError};
pub use messages::*;
