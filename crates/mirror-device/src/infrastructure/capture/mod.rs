//! Capture sources and the switch that turns them on and off.
//!
//! The device has two independent sources, screen and camera, each feeding
//! its own [`FrameRelay`].  [`CaptureSwitch`] owns both and implements
//! [`CaptureControl`] so the command dispatcher can toggle the camera.

pub mod replay;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::info;

use crate::application::dispatch_command::{CaptureControl, CaptureError};
use crate::application::frame_relay::FrameRelay;

pub use replay::ReplayCapture;

/// One capture source and its running producer task, if any.
struct CaptureSource {
    kind: &'static str,
    replay: Option<ReplayCapture>,
    relay: Arc<FrameRelay>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureSource {
    fn new(kind: &'static str, dir: Option<PathBuf>, fps: u32, relay: Arc<FrameRelay>) -> Self {
        Self {
            kind,
            replay: dir.map(|dir| ReplayCapture::new(dir, fps)),
            relay,
            task: Mutex::new(None),
        }
    }

    /// Starts the producer.  Does nothing if it is already running.
    fn start(&self) -> Result<(), CaptureError> {
        let replay = self
            .replay
            .as_ref()
            .ok_or(CaptureError::Unavailable(self.kind))?;

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }
        *task = Some(replay.spawn(Arc::clone(&self.relay))?);
        Ok(())
    }

    /// Stops the producer and clears the last frame so stream viewers stop
    /// receiving parts.
    fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            info!("{} capture stopped", self.kind);
        }
        self.relay.buffer().clear();
    }

    fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

/// Owns the screen and camera sources.
pub struct CaptureSwitch {
    screen: CaptureSource,
    camera: CaptureSource,
}

impl CaptureSwitch {
    /// A source with no directory is unavailable; starting it returns
    /// [`CaptureError::Unavailable`].
    pub fn new(
        screen_dir: Option<PathBuf>,
        camera_dir: Option<PathBuf>,
        fps: u32,
        screen_relay: Arc<FrameRelay>,
        camera_relay: Arc<FrameRelay>,
    ) -> Self {
        Self {
            screen: CaptureSource::new("screen", screen_dir, fps, screen_relay),
            camera: CaptureSource::new("camera", camera_dir, fps, camera_relay),
        }
    }

    pub fn start_screen(&self) -> Result<(), CaptureError> {
        self.screen.start()
    }

    /// Stops both sources.
    pub fn stop_all(&self) {
        self.screen.stop();
        self.camera.stop();
    }

    pub fn is_screen_running(&self) -> bool {
        self.screen.is_running()
    }

    pub fn is_camera_running(&self) -> bool {
        self.camera.is_running()
    }
}

impl CaptureControl for CaptureSwitch {
    fn start_camera(&self) -> Result<(), CaptureError> {
        self.camera.start()
    }

    fn stop_camera(&self) -> Result<(), CaptureError> {
        self.camera.stop();
        Ok(())
    }
}

impl Drop for CaptureSwitch {
    fn drop(&mut self) {
        self.stop_all();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::{Frame, FrameBuffer};

    fn relays() -> (Arc<FrameRelay>, Arc<FrameRelay>) {
        (
            Arc::new(FrameRelay::new("screen", FrameBuffer::new())),
            Arc::new(FrameRelay::new("camera", FrameBuffer::new())),
        )
    }

    #[test]
    fn test_start_without_directory_is_unavailable() {
        let (screen, camera) = relays();
        let switch = CaptureSwitch::new(None, None, 10, screen, camera);

        assert!(matches!(
            switch.start_screen(),
            Err(CaptureError::Unavailable("screen"))
        ));
        assert!(matches!(
            switch.start_camera(),
            Err(CaptureError::Unavailable("camera"))
        ));
    }

    #[tokio::test]
    async fn test_camera_start_is_idempotent_and_stop_clears_buffer() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.jpg"), [0xFF, 0xD8]).unwrap();
        let (screen, camera) = relays();
        let switch = CaptureSwitch::new(
            None,
            Some(dir.path().to_path_buf()),
            20,
            screen,
            Arc::clone(&camera),
        );

        // Act
        switch.start_camera().unwrap();
        switch.start_camera().unwrap();
        assert!(switch.is_camera_running());
        camera.publish(Frame::new(vec![1]));
        switch.stop_camera().unwrap();

        // Assert
        assert!(!switch.is_camera_running());
        assert!(camera.buffer().get().is_none());
    }

    #[tokio::test]
    async fn test_stop_all_stops_screen() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("s.jpg"), [0xFF, 0xD8]).unwrap();
        let (screen, camera) = relays();
        let switch =
            CaptureSwitch::new(Some(dir.path().to_path_buf()), None, 20, screen, camera);

        switch.start_screen().unwrap();
        assert!(switch.is_screen_running());

        switch.stop_all();

        assert!(!switch.is_screen_running());
    }
}
