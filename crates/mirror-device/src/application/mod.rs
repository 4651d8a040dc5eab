//! Application layer: device use cases independent of transports and OS APIs.
//!
//! - [`dispatch_command`] – validates viewer commands and routes them to the
//!   input-injection and capture capabilities.
//! - [`frame_relay`] – fans captured frames out to the local buffer and the
//!   signaling uplink.

pub mod dispatch_command;
pub mod frame_relay;
