//! Input injection back-ends.
//!
//! The device build picks one of these at startup:
//!
//! - [`logging::LoggingInjector`] records every gesture in the log.  It is the
//!   default on hosts without an accessibility service to drive.
//! - [`mock::MockInjector`] records calls in memory for tests.

pub mod logging;
pub mod mock;
