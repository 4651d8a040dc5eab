//! Session identity and the pairing state machine.
//!
//! # How pairing works (for beginners)
//!
//! The device opens a WebSocket to the rendezvous server and registers a
//! random 6-digit [`SessionCode`].  The user reads the code off the device
//! and types it into the viewer, which joins the same code.  When both sides
//! are present the server tells each of them they are *paired*, and from then
//! on it relays their messages to each other.
//!
//! ```text
//!   Created ──registered──▶ Registered ──paired──▶ Paired
//!      │                        │                    │
//!      └────────────────────────┴────────────────────┴──▶ Disconnected (terminal)
//! ```
//!
//! `Disconnected` is terminal: a session instance never comes back from it.
//! Retrying means building a new session, and the [`CodePolicy`] decides
//! whether that new session keeps the old code.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of digits in a [`SessionCode`].
pub const SESSION_CODE_LEN: usize = 6;

/// Smallest generated code.  Generated codes never start with a zero so they
/// read the same however the user's keyboard or UI treats leading zeros.
const SESSION_CODE_MIN: u32 = 100_000;
/// Largest generated code.
const SESSION_CODE_MAX: u32 = 999_999;

// ── Session code ──────────────────────────────────────────────────────────────

/// Error returned when text cannot be parsed as a [`SessionCode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionCodeError {
    /// The text did not have exactly six characters.
    #[error("session code must be 6 digits, got {0} characters")]
    WrongLength(usize),

    /// The text contained something other than ASCII digits.
    #[error("session code must contain only digits: {0:?}")]
    NotNumeric(String),
}

/// A 6-digit numeric code identifying one signaling session.
///
/// The user communicates this code out-of-band (reads it aloud, types it)
/// so the viewer can find the device on the rendezvous server.
///
/// # Example
///
/// ```rust
/// use mirror_core::SessionCode;
///
/// let code = SessionCode::generate();
/// assert_eq!(code.as_str().len(), 6);
///
/// let parsed: SessionCode = "482913".parse().unwrap();
/// assert_eq!(parsed.as_str(), "482913");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Generates a fresh code uniformly at random from `100000..=999999`.
    pub fn generate() -> Self {
        let n = rand::thread_rng().gen_range(SESSION_CODE_MIN..=SESSION_CODE_MAX);
        Self(n.to_string())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionCode {
    type Err = SessionCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != SESSION_CODE_LEN {
            return Err(SessionCodeError::WrongLength(s.chars().count()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionCodeError::NotNumeric(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SessionCode {
    type Error = SessionCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Code policy ───────────────────────────────────────────────────────────────

/// What happens to the session code when the owner rebuilds a session after
/// a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodePolicy {
    /// Every new session gets a fresh random code.  The user must share the
    /// new code again, but a leaked code stops working after one session.
    #[default]
    Regenerate,
    /// The new session re-registers the previous code so a viewer that knows
    /// it can simply join again.
    Preserve,
}

impl CodePolicy {
    /// Returns the code the next session should register.
    pub fn next_code(self, previous: &SessionCode) -> SessionCode {
        match self {
            CodePolicy::Regenerate => SessionCode::generate(),
            CodePolicy::Preserve => previous.clone(),
        }
    }
}

// ── Roles ─────────────────────────────────────────────────────────────────────

/// Which end of a session a connection represents.
///
/// The aliases accept the role names used by older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The handheld being viewed and controlled.
    #[serde(alias = "phone")]
    Device,
    /// The desktop peer watching and sending commands.
    #[serde(alias = "pc")]
    Viewer,
}

impl Role {
    /// Returns the opposite role.
    pub fn other(self) -> Self {
        match self {
            Role::Device => Role::Viewer,
            Role::Viewer => Role::Device,
        }
    }

    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Device => "device",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Session state ─────────────────────────────────────────────────────────────

/// Lifecycle state of one signaling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// The channel is open but the server has not acknowledged the code yet.
    #[default]
    Created,
    /// The server acknowledged the code; waiting for a viewer.
    Registered,
    /// A viewer joined the code.
    Paired,
    /// The session is over.  Terminal.
    Disconnected,
}

impl SessionState {
    /// Returns `true` once the session can never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Disconnected)
    }

    /// Returns `true` while outbound media is worth sending: the server knows
    /// our code and the session has not ended.
    pub fn accepts_frames(self) -> bool {
        matches!(self, SessionState::Registered | SessionState::Paired)
    }

    /// State after a `registered` acknowledgement, or `None` when the
    /// acknowledgement does not apply (already registered, paired, or over).
    pub fn after_registered(self) -> Option<Self> {
        match self {
            SessionState::Created => Some(SessionState::Registered),
            _ => None,
        }
    }

    /// State after a `paired` notification, or `None` for a duplicate or
    /// late notification.
    ///
    /// Pairing straight from `Created` is accepted: the server may coalesce
    /// the acknowledgement and the pairing when the viewer was already
    /// waiting.
    pub fn after_paired(self) -> Option<Self> {
        match self {
            SessionState::Created | SessionState::Registered => Some(SessionState::Paired),
            _ => None,
        }
    }

    /// Short lowercase label for logs and status text.
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Registered => "registered",
            SessionState::Paired => "paired",
            SessionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_is_six_digits() {
        for _ in 0..1_000 {
            let code = SessionCode::generate();
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
            assert_ne!(code.as_str().as_bytes()[0], b'0', "no leading zero");
        }
    }

    #[test]
    fn test_generated_codes_vary() {
        // Arrange / Act
        let codes: std::collections::HashSet<_> =
            (0..50).map(|_| SessionCode::generate()).collect();

        // Assert: 50 draws from 900 000 values colliding down to one is
        // practically impossible.
        assert!(codes.len() > 1);
    }

    #[test]
    fn test_parse_valid_code() {
        let code: SessionCode = "123456".parse().unwrap();
        assert_eq!(code.to_string(), "123456");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let code: SessionCode = " 654321\n".parse().unwrap();
        assert_eq!(code.as_str(), "654321");
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(
            "12345".parse::<SessionCode>(),
            Err(SessionCodeError::WrongLength(5))
        );
    }

    #[test]
    fn test_parse_rejects_non_digits() {
        assert!(matches!(
            "12a456".parse::<SessionCode>(),
            Err(SessionCodeError::NotNumeric(_))
        ));
    }

    #[test]
    fn test_code_serializes_as_plain_string() {
        let code: SessionCode = "111222".parse().unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"111222\"");
    }

    #[test]
    fn test_code_deserialize_validates() {
        assert!(serde_json::from_str::<SessionCode>("\"abc\"").is_err());
    }

    #[test]
    fn test_preserve_policy_keeps_code() {
        let code: SessionCode = "777777".parse().unwrap();
        assert_eq!(CodePolicy::Preserve.next_code(&code), code);
    }

    #[test]
    fn test_regenerate_policy_returns_valid_code() {
        let code: SessionCode = "777777".parse().unwrap();
        let next = CodePolicy::Regenerate.next_code(&code);
        assert_eq!(next.as_str().len(), 6);
    }

    #[test]
    fn test_code_policy_default_is_regenerate() {
        assert_eq!(CodePolicy::default(), CodePolicy::Regenerate);
    }

    #[test]
    fn test_role_accepts_legacy_aliases() {
        assert_eq!(serde_json::from_str::<Role>("\"phone\"").unwrap(), Role::Device);
        assert_eq!(serde_json::from_str::<Role>("\"pc\"").unwrap(), Role::Viewer);
        assert_eq!(serde_json::to_string(&Role::Device).unwrap(), "\"device\"");
    }

    #[test]
    fn test_role_other() {
        assert_eq!(Role::Device.other(), Role::Viewer);
        assert_eq!(Role::Viewer.other(), Role::Device);
    }

    // ── State machine ─────────────────────────────────────────────────────────

    #[test]
    fn test_registered_moves_created_to_registered() {
        assert_eq!(
            SessionState::Created.after_registered(),
            Some(SessionState::Registered)
        );
    }

    #[test]
    fn test_registered_ignored_after_pairing() {
        assert_eq!(SessionState::Paired.after_registered(), None);
        assert_eq!(SessionState::Disconnected.after_registered(), None);
    }

    #[test]
    fn test_paired_moves_registered_to_paired() {
        assert_eq!(
            SessionState::Registered.after_paired(),
            Some(SessionState::Paired)
        );
    }

    #[test]
    fn test_duplicate_paired_is_rejected() {
        assert_eq!(SessionState::Paired.after_paired(), None);
    }

    #[test]
    fn test_disconnected_is_terminal() {
        assert!(SessionState::Disconnected.is_terminal());
        assert_eq!(SessionState::Disconnected.after_paired(), None);
        assert!(!SessionState::Paired.is_terminal());
    }

    #[test]
    fn test_accepts_frames_only_while_registered_or_paired() {
        assert!(!SessionState::Created.accepts_frames());
        assert!(SessionState::Registered.accepts_frames());
        assert!(SessionState::Paired.accepts_frames());
        assert!(!SessionState::Disconnected.accepts_frames());
    }
}
