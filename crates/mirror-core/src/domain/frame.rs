//! Encoded image frames.
//!
//! A [`Frame`] is the output of the capture collaborator's encoder: one
//! complete JPEG image.  Frames carry no sequence number.  The only ordering
//! guarantee anywhere in the system is "most recent wins".

use bytes::Bytes;

/// JPEG start-of-image marker.  Every well-formed frame begins with it.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// An immutable encoded image.
///
/// Cloning a `Frame` is cheap: the bytes are reference counted and shared, so
/// the same frame can be held by the frame buffer, every HTTP viewer, and the
/// signaling writer at once without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Wraps encoded image bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// The encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// A shared handle to the encoded bytes.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Length of the encoded payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the payload starts with the JPEG start-of-image marker.
    pub fn is_jpeg(&self) -> bool {
        self.data.starts_with(&JPEG_SOI)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&'static [u8]> for Frame {
    fn from(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }
}
