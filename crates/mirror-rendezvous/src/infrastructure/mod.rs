//! Infrastructure layer for the rendezvous server.
//!
//! - **`ws_server`** – WebSocket accept loop and per-connection tasks that
//!   pair devices with viewers and relay their traffic.

pub mod ws_server;

pub use ws_server::RendezvousServer;
