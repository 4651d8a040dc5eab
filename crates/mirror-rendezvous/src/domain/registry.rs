//! Session registry: pairs a device and a viewer under one code.
//!
//! # Model (for beginners)
//!
//! ```text
//! "482913" ─▶ { device: conn A, viewer: conn B }   paired
//! "105522" ─▶ { device: conn C, viewer: -      }   waiting for a viewer
//! ```
//!
//! Each slot remembers the connection id (`Uuid`) that filled it.  A slot is
//! only cleared by the connection that owns it, so a stale connection closing
//! late can never evict a newer peer that re-registered the same code.
//! A session with both slots empty is dropped.

use std::collections::HashMap;

use mirror_core::Role;
use thiserror::Error;
use uuid::Uuid;

/// Registry failures.  The messages are sent to clients verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("code missing")]
    CodeMissing,

    /// The connection relayed traffic before registering or joining.
    #[error("not registered")]
    NotRegistered,

    /// The other role has no connection.
    #[error("{0} not connected")]
    PeerAbsent(Role),
}

/// The session slot a connection occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub code: String,
    pub role: Role,
}

/// Result of [`SessionRegistry::attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attached<T> {
    /// The other role is not present yet.
    Alone(Binding),
    /// Both roles are present; each handle should be told it is paired.
    Paired {
        binding: Binding,
        device: T,
        viewer: T,
    },
}

impl<T> Attached<T> {
    pub fn binding(&self) -> &Binding {
        match self {
            Attached::Alone(binding) | Attached::Paired { binding, .. } => binding,
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    conn: Uuid,
    handle: T,
}

#[derive(Debug)]
struct Session<T> {
    device: Option<Slot<T>>,
    viewer: Option<Slot<T>>,
}

impl<T> Default for Session<T> {
    fn default() -> Self {
        Self {
            device: None,
            viewer: None,
        }
    }
}

impl<T> Session<T> {
    fn slot(&self, role: Role) -> &Option<Slot<T>> {
        match role {
            Role::Device => &self.device,
            Role::Viewer => &self.viewer,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Slot<T>> {
        match role {
            Role::Device => &mut self.device,
            Role::Viewer => &mut self.viewer,
        }
    }

    fn is_empty(&self) -> bool {
        self.device.is_none() && self.viewer.is_none()
    }
}

/// All live sessions, keyed by code.
#[derive(Debug)]
pub struct SessionRegistry<T> {
    sessions: HashMap<String, Session<T>>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }
}

impl<T: Clone> SessionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts connection `conn` into the `role` slot of `code`, replacing any
    /// previous occupant.  Surrounding whitespace in `code` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CodeMissing`] if `code` is blank.
    pub fn attach(
        &mut self,
        code: &str,
        role: Role,
        conn: Uuid,
        handle: T,
    ) -> Result<Attached<T>, RegistryError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(RegistryError::CodeMissing);
        }

        let session = self.sessions.entry(code.to_string()).or_default();
        *session.slot_mut(role) = Some(Slot { conn, handle });

        let binding = Binding {
            code: code.to_string(),
            role,
        };
        Ok(match (&session.device, &session.viewer) {
            (Some(device), Some(viewer)) => Attached::Paired {
                binding,
                device: device.handle.clone(),
                viewer: viewer.handle.clone(),
            },
            _ => Attached::Alone(binding),
        })
    }

    /// Returns the handle of the other role in `binding`'s session.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotRegistered`] if `binding` is `None`.
    /// - [`RegistryError::PeerAbsent`] if the other slot is empty.
    pub fn peer_of(&self, binding: Option<&Binding>) -> Result<T, RegistryError> {
        let binding = binding.ok_or(RegistryError::NotRegistered)?;
        let other = binding.role.other();
        self.sessions
            .get(&binding.code)
            .and_then(|session| session.slot(other).as_ref())
            .map(|slot| slot.handle.clone())
            .ok_or(RegistryError::PeerAbsent(other))
    }

    /// Removes `conn` from its slot if it still owns it.
    ///
    /// Returns the other role's handle when the slot was cleared and a peer
    /// is present, so the caller can tell it the connection left.
    pub fn detach(&mut self, binding: &Binding, conn: Uuid) -> Option<T> {
        let session = self.sessions.get_mut(&binding.code)?;

        let owned = session
            .slot(binding.role)
            .as_ref()
            .is_some_and(|slot| slot.conn == conn);
        let peer = if owned {
            *session.slot_mut(binding.role) = None;
            session
                .slot(binding.role.other())
                .as_ref()
                .map(|slot| slot.handle.clone())
        } else {
            None
        };

        if session.is_empty() {
            self.sessions.remove(&binding.code);
        }
        peer
    }

    /// Number of codes with at least one connection.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether both roles of `code` are connected.
    pub fn is_paired(&self, code: &str) -> bool {
        self.sessions
            .get(code)
            .is_some_and(|s| s.device.is_some() && s.viewer.is_some())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(code: &str, role: Role) -> Binding {
        Binding {
            code: code.to_string(),
            role,
        }
    }

    #[test]
    fn test_attach_single_role_is_alone() {
        // Arrange
        let mut reg = SessionRegistry::new();

        // Act
        let attached = reg.attach("482913", Role::Device, Uuid::new_v4(), "dev").unwrap();

        // Assert
        assert_eq!(attached, Attached::Alone(binding("482913", Role::Device)));
        assert_eq!(reg.session_count(), 1);
        assert!(!reg.is_paired("482913"));
    }

    #[test]
    fn test_attach_both_roles_pairs() {
        let mut reg = SessionRegistry::new();
        reg.attach("482913", Role::Device, Uuid::new_v4(), "dev").unwrap();

        let attached = reg.attach(" 482913 ", Role::Viewer, Uuid::new_v4(), "view").unwrap();

        assert_eq!(
            attached,
            Attached::Paired {
                binding: binding("482913", Role::Viewer),
                device: "dev",
                viewer: "view",
            }
        );
        assert!(reg.is_paired("482913"));
    }

    #[test]
    fn test_attach_blank_code_is_rejected() {
        let mut reg: SessionRegistry<&str> = SessionRegistry::new();
        assert_eq!(
            reg.attach("   ", Role::Device, Uuid::new_v4(), "dev"),
            Err(RegistryError::CodeMissing)
        );
        assert_eq!(reg.session_count(), 0);
    }

    #[test]
    fn test_peer_of_requires_registration() {
        let reg: SessionRegistry<&str> = SessionRegistry::new();
        assert_eq!(reg.peer_of(None), Err(RegistryError::NotRegistered));
    }

    #[test]
    fn test_peer_of_reports_absent_role() {
        let mut reg = SessionRegistry::new();
        reg.attach("111111", Role::Viewer, Uuid::new_v4(), "view").unwrap();

        let err = reg
            .peer_of(Some(&binding("111111", Role::Viewer)))
            .unwrap_err();

        assert_eq!(err, RegistryError::PeerAbsent(Role::Device));
        assert_eq!(err.to_string(), "device not connected");
    }

    #[test]
    fn test_detach_notifies_peer_and_drops_empty_session() {
        // Arrange
        let mut reg = SessionRegistry::new();
        let dev = Uuid::new_v4();
        let view = Uuid::new_v4();
        reg.attach("222222", Role::Device, dev, "dev").unwrap();
        reg.attach("222222", Role::Viewer, view, "view").unwrap();

        // Act / Assert
        assert_eq!(reg.detach(&binding("222222", Role::Viewer), view), Some("dev"));
        assert_eq!(reg.session_count(), 1);
        assert_eq!(reg.detach(&binding("222222", Role::Device), dev), None);
        assert_eq!(reg.session_count(), 0);
    }

    #[test]
    fn test_stale_connection_cannot_evict_replacement() {
        // Arrange: the device reconnects under the same code before the old
        // connection's close is processed.
        let mut reg = SessionRegistry::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        reg.attach("333333", Role::Device, old, "old").unwrap();
        reg.attach("333333", Role::Device, new, "new").unwrap();
        reg.attach("333333", Role::Viewer, Uuid::new_v4(), "view").unwrap();

        // Act
        let notified = reg.detach(&binding("333333", Role::Device), old);

        // Assert
        assert_eq!(notified, None);
        assert!(reg.is_paired("333333"));
        assert_eq!(
            reg.peer_of(Some(&binding("333333", Role::Viewer))),
            Ok("new")
        );
    }
}
