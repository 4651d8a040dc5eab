//! CommandDispatcher: routes inbound viewer commands to device capabilities.
//!
//! This use case sits at the application layer.  It validates each
//! [`Command`] into a [`ControlAction`] and hands it to one of two capability
//! interfaces implemented in the infrastructure layer:
//!
//! - [`InputInjector`] for taps, swipes, and system keys.
//! - [`CaptureControl`] for switching the camera stream on and off.
//!
//! Nothing here ever fails outward.  A command the device cannot use is
//! logged and dropped, and a collaborator failure is logged and swallowed, so
//! one bad message can never end the signaling session.

use std::sync::Arc;
use std::time::Duration;

use mirror_core::{Command, ControlAction, NormalizedPoint, SystemKey};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Duration of every injected swipe gesture.
pub const SWIPE_DURATION: Duration = Duration::from_millis(400);

/// Error type for input injection operations.
#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("input backend error: {0}")]
    Backend(String),
}

/// Error type for capture control operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No producer is configured for the requested source.
    #[error("no {0} capture source configured")]
    Unavailable(&'static str),

    /// The source directory could not be listed.
    #[error("failed to read capture directory {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source directory holds no JPEG files.
    #[error("no JPEG frames found in {0}")]
    Empty(std::path::PathBuf),
}

/// Gesture and navigation injection into the device UI.
///
/// Coordinates are screen fractions; implementations resolve them against the
/// real screen bounds.
pub trait InputInjector: Send + Sync {
    /// Taps a single point.
    fn tap(&self, point: NormalizedPoint) -> Result<(), InjectionError>;

    /// Performs a straight-line swipe lasting `duration`.
    fn swipe(
        &self,
        from: NormalizedPoint,
        to: NormalizedPoint,
        duration: Duration,
    ) -> Result<(), InjectionError>;

    /// Performs a system navigation action.
    fn global_action(&self, key: SystemKey) -> Result<(), InjectionError>;
}

/// Switches the camera producer on and off.
pub trait CaptureControl: Send + Sync {
    fn start_camera(&self) -> Result<(), CaptureError>;
    fn stop_camera(&self) -> Result<(), CaptureError>;
}

/// The command dispatch use case.
///
/// Holds no state of its own; it can be shared freely and called from any
/// task.
#[derive(Clone)]
pub struct CommandDispatcher {
    injector: Arc<dyn InputInjector>,
    capture: Arc<dyn CaptureControl>,
}

impl CommandDispatcher {
    /// Creates a dispatcher over the given capabilities.
    pub fn new(injector: Arc<dyn InputInjector>, capture: Arc<dyn CaptureControl>) -> Self {
        Self { injector, capture }
    }

    /// Validates and executes one command.
    ///
    /// Returns the action that was carried out, or `None` when the command
    /// was invalid or its collaborator failed.  Callers use the return value
    /// for follow-up work such as announcing the camera stream after
    /// [`ControlAction::CameraOn`].
    pub fn dispatch(&self, command: &Command) -> Option<ControlAction> {
        let action = match ControlAction::parse(command) {
            Ok(action) => action,
            Err(e) => {
                warn!("dropping command {:?}: {e}", command.action);
                return None;
            }
        };

        debug!("dispatching {} command", action.name());

        let result = match action {
            ControlAction::Tap(point) => self.injector.tap(point).map_err(|e| e.to_string()),
            ControlAction::Swipe { from, to } => self
                .injector
                .swipe(from, to, SWIPE_DURATION)
                .map_err(|e| e.to_string()),
            ControlAction::Key(key) => self.injector.global_action(key).map_err(|e| e.to_string()),
            ControlAction::CameraOn => self.capture.start_camera().map_err(|e| e.to_string()),
            ControlAction::CameraOff => self.capture.stop_camera().map_err(|e| e.to_string()),
        };

        match result {
            Ok(()) => Some(action),
            Err(e) => {
                error!("{} command failed: {e}", action.name());
                None
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
