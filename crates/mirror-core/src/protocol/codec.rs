//! Text codec for the signaling channel.
//!
//! Messages travel as WebSocket text frames holding one JSON object each.
//! Frames cannot travel as raw bytes on a text channel, so their payload is
//! carried as standard base64 (RFC 4648, padded) in the `data` field.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::domain::frame::Frame;

/// Errors that can occur while encoding or decoding signaling text.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The text is not valid JSON or does not match any known message shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A value could not be serialised.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// A frame's `data` field is not valid base64.
    #[error("invalid frame payload: {0}")]
    InvalidFramePayload(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Serialises a message into the JSON text sent on the channel.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serde cannot represent the value.
pub fn encode_text<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Parses one text frame from the channel.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedMessage`] for invalid JSON or a shape
/// that matches none of `T`'s variants.
pub fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}

/// Base64-encodes a frame for the `data` field of a `frame` message.
///
/// # Examples
///
/// ```rust
/// use mirror_core::{encode_frame_payload, Frame};
///
/// let frame = Frame::new(vec![0xFF, 0xD8, 0xFF]);
/// assert_eq!(encode_frame_payload(&frame), "/9j/");
/// ```
pub fn encode_frame_payload(frame: &Frame) -> String {
    STANDARD.encode(frame.as_bytes())
}

/// Decodes the `data` field of a `frame` message.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidFramePayload`] if `data` is not valid
/// padded base64.
pub fn decode_frame_payload(data: &str) -> Result<Frame, ProtocolError> {
    STANDARD
        .decode(data)
        .map(Frame::from)
        .map_err(|e| ProtocolError::InvalidFramePayload(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
