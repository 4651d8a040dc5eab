//! The latest-wins frame slot.
//!
//! # How it works (for beginners)
//!
//! Capture produces frames at whatever rate the encoder manages.  Delivery
//! (HTTP viewers, the signaling uplink) consumes them at whatever rate the
//! network allows.  A queue between the two would grow without bound whenever
//! the network is slower than the encoder, and every frame in it would be
//! stale by the time it was sent.
//!
//! [`FrameBuffer`] is a single slot instead.  `set` overwrites it, `get`
//! copies out whatever is there, and neither ever blocks on the other.  A
//! frame that is overwritten before anyone reads it is simply gone.
//!
//! Under the hood the slot is a `tokio::sync::watch` channel: the sender side
//! owns the value and every reader gets a cheap clone.  Because `Frame` is a
//! reference-counted byte buffer, a clone never copies image data.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::frame::Frame;

/// A thread-safe single-value cell holding the most recent frame.
///
/// Cloning a `FrameBuffer` gives another handle to the **same** slot.
///
/// # Example
///
/// ```rust
/// use mirror_core::{Frame, FrameBuffer};
///
/// let buffer = FrameBuffer::new();
/// assert!(buffer.get().is_none());
///
/// buffer.set(Frame::new(vec![1, 2, 3]));
/// buffer.set(Frame::new(vec![4, 5, 6]));
/// assert_eq!(buffer.get().unwrap().as_bytes(), &[4, 5, 6]);
/// ```
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    slot: Arc<watch::Sender<Option<Frame>>>,
}

impl FrameBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }

    /// Replaces the stored frame.  Never blocks on readers.
    pub fn set(&self, frame: Frame) {
        self.slot.send_replace(Some(frame));
    }

    /// Returns the most recently set frame, or `None` if nothing has been set.
    pub fn get(&self) -> Option<Frame> {
        self.slot.borrow().clone()
    }

    /// Empties the slot, e.g. when the capture source stops.
    pub fn clear(&self) {
        self.slot.send_replace(None);
    }

    /// Returns a watcher that wakes whenever a new frame is set.
    pub fn subscribe(&self) -> FrameWatcher {
        FrameWatcher {
            rx: self.slot.subscribe(),
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Async view of a [`FrameBuffer`] for consumers that want to wait for the
/// next frame instead of polling.
///
/// A watcher only ever sees the latest frame: if several frames are set
/// between two calls to [`FrameWatcher::next_frame`], the intermediate ones
/// are skipped.
#[derive(Debug, Clone)]
pub struct FrameWatcher {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameWatcher {
    /// Waits for a frame newer than the last one this watcher returned.
    ///
    /// Returns `None` once every [`FrameBuffer`] handle has been dropped.
    /// A `clear` does not wake the watcher with a value; it keeps waiting for
    /// the next real frame.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(frame) = self.rx.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
