//! mirror-rendezvous library crate.
//!
//! The rendezvous server is the meeting point for a device and a viewer that
//! cannot reach each other directly.  Both connect out to it over WebSocket
//! and name the same six-digit session code; the server pairs them and then
//! relays their traffic.
//!
//! # Architecture
//!
//! ```text
//! device ──register{code}──▶ ┌──────────────────────┐ ◀──join{code}── viewer
//!                            │ mirror-rendezvous     │
//!                            │   domain/registry     │  code → {device, viewer}
//!                            │   infrastructure/ws   │  accept loop + relay
//!                            └──────────────────────┘
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O: the registry is generic over the peer handle.
//! - `infrastructure` owns sockets and tasks.

/// Domain layer: session registry.
pub mod domain;

/// Infrastructure layer: WebSocket server.
pub mod infrastructure;
