//! Domain layer for the rendezvous server.
//!
//! Pure bookkeeping with no I/O: which connection holds which role under
//! which session code.  The registry is generic over the peer handle so the
//! infrastructure layer can store channel senders while tests store plain
//! values.

pub mod registry;

pub use registry::{Attached, Binding, RegistryError, SessionRegistry};
