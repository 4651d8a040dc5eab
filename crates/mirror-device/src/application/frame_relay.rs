//! FrameRelay: fans each captured frame out to local and remote viewers.
//!
//! A capture producer calls [`FrameRelay::publish`] for every encoded frame.
//! The relay stores the frame in its [`FrameBuffer`], where the HTTP stream
//! server picks it up, and forwards it to the signaling uplink when a viewer
//! is paired.
//!
//! The uplink is injected with [`FrameRelay::attach`] and removed with
//! [`FrameRelay::detach`], so the session owner decides which session (if
//! any) receives frames.  Producers never look a session up themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use mirror_core::{Frame, FrameBuffer};
use tracing::debug;

/// Log one line per this many published frames.
const FRAME_LOG_EVERY: u64 = 30;

/// A best-effort remote sink for frames.
pub trait FrameUplink: Send + Sync {
    /// Returns `true` while a viewer is paired and frames are worth sending.
    fn is_paired(&self) -> bool;

    /// Hands a frame to the uplink.  Must not block.
    fn send_frame(&self, frame: Frame);
}

/// Publishes frames to a [`FrameBuffer`] and an optional uplink.
pub struct FrameRelay {
    name: &'static str,
    buffer: FrameBuffer,
    uplink: RwLock<Option<Arc<dyn FrameUplink>>>,
    published: AtomicU64,
    forwarded: AtomicU64,
}

impl FrameRelay {
    /// Creates a relay writing into `buffer`.  `name` labels log lines
    /// (e.g. `"screen"`, `"camera"`).
    pub fn new(name: &'static str, buffer: FrameBuffer) -> Self {
        Self {
            name,
            buffer,
            uplink: RwLock::new(None),
            published: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
        }
    }

    /// Stores `frame` as the latest frame and forwards it to a paired uplink.
    ///
    /// Never blocks: the buffer write is a pointer swap and the uplink hands
    /// the frame to its own writer task.
    pub fn publish(&self, frame: Frame) {
        self.buffer.set(frame.clone());
        let published = self.published.fetch_add(1, Ordering::Relaxed) + 1;

        let uplink = self
            .uplink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(uplink) = uplink {
            if uplink.is_paired() {
                uplink.send_frame(frame);
                self.forwarded.fetch_add(1, Ordering::Relaxed);
            }
        }

        if published % FRAME_LOG_EVERY == 0 {
            debug!(
                "{} relay: {published} frames published, {} forwarded",
                self.name,
                self.forwarded.load(Ordering::Relaxed)
            );
        }
    }

    /// Routes future frames to `uplink`, replacing any previous one.
    pub fn attach(&self, uplink: Arc<dyn FrameUplink>) {
        *self.uplink.write().unwrap_or_else(PoisonError::into_inner) = Some(uplink);
    }

    /// Stops forwarding frames remotely.  The buffer keeps being updated.
    pub fn detach(&self) {
        *self.uplink.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The buffer this relay writes to.
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Total frames passed to [`FrameRelay::publish`].
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames handed to an uplink.
    pub fn forwarded_count(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
