//! # mirror-core
//!
//! Shared library for Remote Mirror containing the signaling wire protocol,
//! the domain types exchanged between the device and its peer, and the
//! latest-wins frame buffer.
//!
//! This crate is used by the device application and the rendezvous server.
//! It has no dependency on sockets, WebSocket libraries, or OS input APIs.
//!
//! # Architecture overview (for beginners)
//!
//! Remote Mirror lets a desktop *viewer* watch and control a handheld
//! *device* even though neither knows the other's address.  Both connect to a
//! *rendezvous server* and meet under a 6-digit session code that the user
//! reads off the device and types into the viewer.
//!
//! This crate (`mirror-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Pure types with no I/O: the [`SessionCode`], the pairing
//!   [`SessionState`] machine, encoded [`Frame`]s, and inbound [`Command`]s
//!   together with their typed form, [`ControlAction`].
//!
//! - **`protocol`** – How messages travel on the signaling channel.  Every
//!   message is a JSON object whose `"type"` field selects the schema.  Frame
//!   bytes are base64-encoded so they survive a text channel.
//!
//! - **`buffer`** – The [`FrameBuffer`]: a single slot that always holds the
//!   most recently produced frame.  Writers never wait for readers, readers
//!   never wait for writers, and nothing queues up under load.

pub mod buffer;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mirror_core::FrameBuffer` instead of `mirror_core::buffer::frame_buffer::FrameBuffer`.
pub use buffer::frame_buffer::{FrameBuffer, FrameWatcher};
pub use domain::command::{Command, CommandError, ControlAction, NormalizedPoint, SystemKey};
pub use domain::frame::Frame;
pub use domain::session::{CodePolicy, Role, SessionCode, SessionCodeError, SessionState};
pub use protocol::messages::{DeviceMessage, ServerMessage, ViewerMessage};
pub use protocol::codec::{
    decode_frame_payload, decode_text, encode_frame_payload, encode_text, ProtocolError,
};
