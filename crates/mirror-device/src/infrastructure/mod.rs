//! Infrastructure layer for the device agent.
//!
//! Contains the adapters that touch the outside world: the WebSocket link to
//! the rendezvous server, the HTTP stream servers, capture sources, input
//! injection back-ends, and the configuration file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mirror_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`signaling`** – `SignalingSession`: registers the session code, tracks
//!   pairing, emits ordered session events, and uplinks frames.
//! - **`stream_server`** – `StreamServer`: multipart JPEG over plain HTTP for
//!   viewers on the local network.
//! - **`capture`** – replayed screen and camera sources plus the switch that
//!   starts and stops them.
//! - **`input_injection`** – `InputInjector` back-ends (logging and mock).
//! - **`storage`** – TOML configuration.
//! - **`supervisor`** – `DeviceSupervisor`: rebuilds sessions after a
//!   disconnect and wires them to everything above.

pub mod capture;
pub mod input_injection;
pub mod signaling;
pub mod storage;
pub mod stream_server;
pub mod supervisor;
