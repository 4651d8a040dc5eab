//! JSON message types for the signaling channel.
//!
//! Every message is a JSON object with a `"type"` field that identifies the
//! variant.  All other fields are flattened into the same object:
//!
//! ```json
//! {"type":"register","code":"482913","role":"device"}
//! {"type":"paired","code":"482913","your_role":"device"}
//! {"type":"command","action":"touch","x":0.5,"y":0.5}
//! ```
//!
//! # Message flow
//!
//! ```text
//! Device → Server:  DeviceMessage   (register, frame, stream_info, heartbeat)
//! Viewer → Server:  ViewerMessage   (join, command, heartbeat)
//! Server → either:  ServerMessage   (acknowledgements, pairing, relayed traffic)
//! ```
//!
//! The server relays peer traffic verbatim, so a `command` the viewer sends
//! arrives at the device as a [`ServerMessage::Command`] with identical
//! fields.  Three enums keep each direction honest: a device cannot build a
//! `join`, and the viewer cannot build a `frame`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::command::Command;
use crate::domain::session::{Role, SessionCode};

// ── Device → Server ───────────────────────────────────────────────────────────

/// Messages the device sends on the signaling channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage {
    /// Claims a session code.  First message after the channel opens.
    Register { code: SessionCode, role: Role },

    /// One encoded frame, base64 in `data`.
    Frame { data: String },

    /// Where the viewer can pull the HTTP stream.  An empty `url` means the
    /// device has no reachable address.
    StreamInfo { url: String },

    /// Application-level keep-alive.
    Heartbeat,
}

impl DeviceMessage {
    /// Registration message for the device role.
    pub fn register(code: SessionCode) -> Self {
        DeviceMessage::Register {
            code,
            role: Role::Device,
        }
    }
}

// ── Viewer → Server ───────────────────────────────────────────────────────────

/// Messages the viewer sends on the signaling channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    /// Joins the session the device registered.
    Join { code: SessionCode, role: Role },

    /// A control command for the device.  Parameters sit beside `action`.
    Command {
        action: String,
        #[serde(flatten)]
        params: Map<String, Value>,
    },

    /// Application-level keep-alive.
    Heartbeat,
}

impl ViewerMessage {
    /// Join message for the viewer role.
    pub fn join(code: SessionCode) -> Self {
        ViewerMessage::Join {
            code,
            role: Role::Viewer,
        }
    }
}

impl From<Command> for ViewerMessage {
    fn from(command: Command) -> Self {
        ViewerMessage::Command {
            action: command.action,
            params: command.params,
        }
    }
}

// ── Server → peers ────────────────────────────────────────────────────────────

/// Messages a peer receives from the rendezvous server.
///
/// Includes both the server's own notifications and peer traffic the server
/// relays.  Types this build does not know decode as [`ServerMessage::Unknown`]
/// instead of failing, so a newer server cannot break an older client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The device's `register` was accepted.
    Registered {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },

    /// The viewer's `join` was accepted.
    Joined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },

    /// The viewer joined a code whose device is not connected yet.
    Waiting {
        #[serde(default)]
        message: String,
    },

    /// Both roles are present.  Sent once to each side.
    Paired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        your_role: Option<Role>,
    },

    /// Relayed viewer command.
    Command {
        action: String,
        #[serde(flatten)]
        params: Map<String, Value>,
    },

    /// Relayed stream location.
    StreamInfo { url: String },

    /// Relayed base64 frame.
    Frame { data: String },

    /// The other side of the session went away.
    PeerDisconnected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },

    /// Relayed keep-alive.
    Heartbeat,

    /// The server rejected something we sent.
    Error {
        #[serde(default)]
        message: String,
    },

    /// Any message type this build does not recognise.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Builds an error reply.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Extracts the command from a relayed `command` message.
    pub fn into_command(self) -> Option<Command> {
        match self {
            ServerMessage::Command { action, params } => Some(Command::new(action, params)),
            _ => None,
        }
    }

    /// Wire name of the message type, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Registered { .. } => "registered",
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::Waiting { .. } => "waiting",
            ServerMessage::Paired { .. } => "paired",
            ServerMessage::Command { .. } => "command",
            ServerMessage::StreamInfo { .. } => "stream_info",
            ServerMessage::Frame { .. } => "frame",
            ServerMessage::PeerDisconnected { .. } => "peer_disconnected",
            ServerMessage::Heartbeat => "heartbeat",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Unknown => "unknown",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
