//! mirror-device library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does mirror-device do? (for beginners)
//!
//! The *device* is the handheld whose screen is being mirrored.  It cannot
//! be reached directly from the viewer's network, so both sides meet on a
//! rendezvous server under a six-digit session code.
//!
//! The device agent:
//!
//! 1. Opens a WebSocket to the rendezvous server and registers its code.
//! 2. Waits for a viewer to join the same code.
//! 3. Once paired, publishes captured JPEG frames two ways: base64 over the
//!    signaling channel, and raw over a local multipart HTTP stream whose URL
//!    it announces to the viewer.
//! 4. Receives `command` messages (taps, swipes, system keys, camera on/off)
//!    and routes them to the input injection and capture back-ends.
//! 5. Starts over with a new session whenever the current one ends.

/// Application layer: command dispatch and frame fan-out.
pub mod application;

/// Infrastructure layer: signaling, HTTP streaming, capture, config.
pub mod infrastructure;
