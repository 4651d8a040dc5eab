//! Replay capture: a frame producer that cycles over JPEG files on disk.
//!
//! Real screen and camera capture live outside this crate.  `ReplayCapture`
//! stands in for them: it publishes the `.jpg`/`.jpeg` files of one directory
//! in name order, looping forever, at a fixed frame rate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mirror_core::Frame;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::dispatch_command::CaptureError;
use crate::application::frame_relay::FrameRelay;

/// A directory of JPEG files replayed as a frame stream.
#[derive(Debug, Clone)]
pub struct ReplayCapture {
    dir: PathBuf,
    fps: u32,
}

impl ReplayCapture {
    /// `fps` of zero is treated as one frame per second.
    pub fn new(dir: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            dir: dir.into(),
            fps: fps.max(1),
        }
    }

    /// Time between two published frames.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.fps
    }

    /// Lists the JPEG files to replay, sorted by file name.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::Io`] if the directory cannot be read.
    /// - [`CaptureError::Empty`] if it holds no JPEG files.
    pub fn list_frames(&self) -> Result<Vec<PathBuf>, CaptureError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| CaptureError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_jpeg_path(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::Empty(self.dir.clone()));
        }
        Ok(files)
    }

    /// Starts the replay loop, publishing through `relay`.
    ///
    /// The file list is taken once, up front.  A file that cannot be read
    /// later is skipped for that tick.
    ///
    /// # Errors
    ///
    /// Same as [`ReplayCapture::list_frames`].
    pub fn spawn(&self, relay: Arc<FrameRelay>) -> Result<JoinHandle<()>, CaptureError> {
        let files = self.list_frames()?;
        info!(
            "{} capture: replaying {} frames from {} at {} fps",
            relay.name(),
            files.len(),
            self.dir.display(),
            self.fps
        );
        Ok(tokio::spawn(replay_loop(files, self.frame_period(), relay)))
    }
}

fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

async fn replay_loop(files: Vec<PathBuf>, period: Duration, relay: Arc<FrameRelay>) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for path in files.iter().cycle() {
        ticker.tick().await;
        match tokio::fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => relay.publish(Frame::from(bytes)),
            Ok(_) => debug!("{} capture: skipping empty file {}", relay.name(), path.display()),
            Err(e) => warn!(
                "{} capture: dropping frame {}: {e}",
                relay.name(),
                path.display()
            ),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
