//! Inbound control commands.
//!
//! The viewer sends commands as loosely typed JSON: an `action` name plus
//! whatever parameters that action needs, flattened into the same object.
//!
//! ```json
//! {"type":"command","action":"touch","x":0.42,"y":0.77}
//! {"type":"command","action":"key_event","key_code":4}
//! ```
//!
//! [`Command`] keeps that loose shape.  [`ControlAction::parse`] validates it
//! into a typed action, so everything downstream of the parser works with
//! coordinates that are known to be in range and keys that are known to exist.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// A control instruction as received from the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Action name, e.g. `"touch"`.
    pub action: String,
    /// Action-specific parameters (scalars keyed by name).
    pub params: Map<String, Value>,
}

impl Command {
    /// Builds a command from an action name and its parameters.
    pub fn new(action: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }

    /// Builds a command with no parameters.
    pub fn bare(action: impl Into<String>) -> Self {
        Self::new(action, Map::new())
    }

    /// Adds one parameter, builder style.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Why a [`Command`] could not be turned into a [`ControlAction`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// The action name is not one this device understands.
    #[error("unknown action: {0:?}")]
    UnknownAction(String),

    /// A required parameter is absent.
    #[error("missing parameter {0:?}")]
    MissingParam(&'static str),

    /// A parameter is present but has the wrong type or is out of range.
    #[error("invalid parameter {name:?}: {reason}")]
    InvalidParam {
        name: &'static str,
        reason: &'static str,
    },

    /// The key code is an integer but not one of the supported system keys.
    #[error("unmapped key code {0}")]
    UnmappedKey(i64),
}

// ── Typed actions ─────────────────────────────────────────────────────────────

/// A point in screen-fraction coordinates.
///
/// `(0, 0)` is the top-left corner and `(1, 1)` the bottom-right corner of
/// the device screen.  The input-injection backend resolves fractions against
/// the real screen bounds, so the viewer never needs to know the resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    /// Creates a point, rejecting coordinates outside `[0, 1]` (and NaN).
    pub fn new(x: f64, y: f64) -> Option<Self> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if in_range(x) && in_range(y) {
            Some(Self {
                x: x as f32,
                y: y as f32,
            })
        } else {
            None
        }
    }
}

impl fmt::Display for NormalizedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.x, self.y)
    }
}

/// System-level navigation actions the device can perform.
///
/// The discriminants are the Android `KeyEvent` codes viewers send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemKey {
    Home = 3,
    Back = 4,
    Lock = 26,
    Recents = 187,
}

impl SystemKey {
    /// Maps a key code to a system key.
    pub fn from_key_code(code: i64) -> Option<Self> {
        match code {
            3 => Some(SystemKey::Home),
            4 => Some(SystemKey::Back),
            26 => Some(SystemKey::Lock),
            187 => Some(SystemKey::Recents),
            _ => None,
        }
    }

    /// The key code viewers send for this key.
    pub fn key_code(self) -> i64 {
        self as i64
    }
}

/// A validated control action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    /// Tap a single point.
    Tap(NormalizedPoint),
    /// Straight-line gesture from one point to another.
    Swipe {
        from: NormalizedPoint,
        to: NormalizedPoint,
    },
    /// System navigation key.
    Key(SystemKey),
    /// Start the camera stream.
    CameraOn,
    /// Stop the camera stream.
    CameraOff,
}

impl ControlAction {
    /// Validates a loosely typed [`Command`].
    ///
    /// # Errors
    ///
    /// - [`CommandError::UnknownAction`] for an unrecognised action name.
    /// - [`CommandError::MissingParam`] / [`CommandError::InvalidParam`] when
    ///   coordinates are absent, not numbers, or outside `[0, 1]`, or the key
    ///   code is not an integer.
    /// - [`CommandError::UnmappedKey`] for an integer key code with no system
    ///   action.
    pub fn parse(command: &Command) -> Result<Self, CommandError> {
        let params = &command.params;
        match command.action.as_str() {
            "touch" => Ok(ControlAction::Tap(point(params, "x", "y")?)),
            "swipe" => Ok(ControlAction::Swipe {
                from: point(params, "x1", "y1")?,
                to: point(params, "x2", "y2")?,
            }),
            "key_event" => {
                let code = params
                    .get("key_code")
                    .ok_or(CommandError::MissingParam("key_code"))?
                    .as_i64()
                    .ok_or(CommandError::InvalidParam {
                        name: "key_code",
                        reason: "not an integer",
                    })?;
                SystemKey::from_key_code(code)
                    .map(ControlAction::Key)
                    .ok_or(CommandError::UnmappedKey(code))
            }
            "camera_on" => Ok(ControlAction::CameraOn),
            "camera_off" => Ok(ControlAction::CameraOff),
            other => Err(CommandError::UnknownAction(other.to_string())),
        }
    }

    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            ControlAction::Tap(_) => "tap",
            ControlAction::Swipe { .. } => "swipe",
            ControlAction::Key(_) => "key",
            ControlAction::CameraOn => "camera_on",
            ControlAction::CameraOff => "camera_off",
        }
    }
}

fn coordinate(params: &Map<String, Value>, name: &'static str) -> Result<f64, CommandError> {
    params
        .get(name)
        .ok_or(CommandError::MissingParam(name))?
        .as_f64()
        .ok_or(CommandError::InvalidParam {
            name,
            reason: "not a number",
        })
}

fn point(
    params: &Map<String, Value>,
    x_name: &'static str,
    y_name: &'static str,
) -> Result<NormalizedPoint, CommandError> {
    let x = coordinate(params, x_name)?;
    let y = coordinate(params, y_name)?;
    NormalizedPoint::new(x, y).ok_or(CommandError::InvalidParam {
        name: if (0.0..=1.0).contains(&x) { y_name } else { x_name },
        reason: "outside [0, 1]",
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_touch() {
        // Arrange
        let cmd = Command::bare("touch").with_param("x", 0.5).with_param("y", 0.25);

        // Act
        let action = ControlAction::parse(&cmd).unwrap();

        // Assert
        assert_eq!(
            action,
            ControlAction::Tap(NormalizedPoint { x: 0.5, y: 0.25 })
        );
    }

    #[test]
    fn test_parse_touch_accepts_integer_coordinates_at_bounds() {
        let cmd = Command::bare("touch").with_param("x", 0).with_param("y", 1);
        assert_eq!(
            ControlAction::parse(&cmd).unwrap(),
            ControlAction::Tap(NormalizedPoint { x: 0.0, y: 1.0 })
        );
    }

    #[test]
    fn test_parse_touch_rejects_string_coordinate() {
        let cmd = Command::bare("touch").with_param("x", "bad");
        assert_eq!(
            ControlAction::parse(&cmd),
            Err(CommandError::InvalidParam {
                name: "x",
                reason: "not a number"
            })
        );
    }

    #[test]
    fn test_parse_touch_rejects_missing_y() {
        let cmd = Command::bare("touch").with_param("x", 0.1);
        assert_eq!(
            ControlAction::parse(&cmd),
            Err(CommandError::MissingParam("y"))
        );
    }

    #[test]
    fn test_parse_touch_rejects_out_of_range() {
        let cmd = Command::bare("touch").with_param("x", 0.5).with_param("y", 1.5);
        assert!(matches!(
            ControlAction::parse(&cmd),
            Err(CommandError::InvalidParam { name: "y", .. })
        ));
    }

    #[test]
    fn test_parse_swipe() {
        let cmd = Command::bare("swipe")
            .with_param("x1", 0.1)
            .with_param("y1", 0.9)
            .with_param("x2", 0.1)
            .with_param("y2", 0.2);

        let action = ControlAction::parse(&cmd).unwrap();

        assert_eq!(
            action,
            ControlAction::Swipe {
                from: NormalizedPoint { x: 0.1, y: 0.9 },
                to: NormalizedPoint { x: 0.1, y: 0.2 },
            }
        );
    }

    #[test]
    fn test_parse_swipe_requires_all_four_coordinates() {
        let cmd = Command::bare("swipe")
            .with_param("x1", 0.1)
            .with_param("y1", 0.9)
            .with_param("x2", 0.1);
        assert_eq!(
            ControlAction::parse(&cmd),
            Err(CommandError::MissingParam("y2"))
        );
    }

    #[test]
    fn test_parse_key_event_maps_system_keys() {
        for (code, key) in [
            (4, SystemKey::Back),
            (3, SystemKey::Home),
            (187, SystemKey::Recents),
            (26, SystemKey::Lock),
        ] {
            let cmd = Command::bare("key_event").with_param("key_code", code);
            assert_eq!(ControlAction::parse(&cmd), Ok(ControlAction::Key(key)));
        }
    }

    #[test]
    fn test_parse_key_event_unmapped_code() {
        // 24 is volume-up: a real key code, but not a supported system action.
        let cmd = Command::bare("key_event").with_param("key_code", 24);
        assert_eq!(ControlAction::parse(&cmd), Err(CommandError::UnmappedKey(24)));
    }

    #[test]
    fn test_parse_key_event_rejects_fractional_code() {
        let cmd = Command::bare("key_event").with_param("key_code", 4.5);
        assert!(matches!(
            ControlAction::parse(&cmd),
            Err(CommandError::InvalidParam { name: "key_code", .. })
        ));
    }

    #[test]
    fn test_parse_camera_actions() {
        assert_eq!(
            ControlAction::parse(&Command::bare("camera_on")),
            Ok(ControlAction::CameraOn)
        );
        assert_eq!(
            ControlAction::parse(&Command::bare("camera_off")),
            Ok(ControlAction::CameraOff)
        );
    }

    #[test]
    fn test_parse_unknown_action() {
        assert_eq!(
            ControlAction::parse(&Command::bare("unknown_action")),
            Err(CommandError::UnknownAction("unknown_action".to_string()))
        );
    }

    #[test]
    fn test_normalized_point_rejects_nan() {
        assert!(NormalizedPoint::new(f64::NAN, 0.5).is_none());
    }

    #[test]
    fn test_system_key_code_roundtrip() {
        assert_eq!(SystemKey::Recents.key_code(), 187);
        assert_eq!(SystemKey::from_key_code(187), Some(SystemKey::Recents));
    }
}
