//! Domain layer: pure types shared by the device and the rendezvous server.
//!
//! Nothing in here performs I/O, spawns tasks, or reads the environment.
//!
//! - [`session`] – session codes, roles, and the pairing state machine.
//! - [`frame`] – the immutable encoded-image payload.
//! - [`command`] – inbound control commands and their validated form.

pub mod command;
pub mod frame;
pub mod session;
