//! Mock input injector for unit and integration testing.
//!
//! # Why a mock injector?
//!
//! A real injector drives the device's accessibility service.  That needs a
//! running device, it really touches the screen, and nothing it does can be
//! observed from Rust test code.
//!
//! `MockInjector` replaces all of that with in-memory recording.  Each gesture
//! is pushed into a `Mutex<Vec<...>>` so assertions can inspect exactly what
//! was injected and in what order.
//!
//! # Usage in tests
//!
//! ```ignore
//! let injector = Arc::new(MockInjector::new());
//! let dispatcher = CommandDispatcher::new(injector.clone(), capture);
//!
//! dispatcher.dispatch(&Command::bare("touch").with_param("x", 0.5).with_param("y", 0.5));
//!
//! assert_eq!(injector.taps.lock().unwrap().len(), 1);
//! ```
//!
//! # `should_fail` flag
//!
//! Set `should_fail = true` to make every method return
//! `InjectionError::Backend`.  This exercises error paths in callers.

use std::sync::Mutex;
use std::time::Duration;

use mirror_core::{NormalizedPoint, SystemKey};

use crate::application::dispatch_command::{InjectionError, InputInjector};

/// Records all calls without touching any UI.
#[derive(Debug, Default)]
pub struct MockInjector {
    /// Every point passed to `tap`.
    pub taps: Mutex<Vec<NormalizedPoint>>,
    /// Every `(from, to, duration)` passed to `swipe`.
    pub swipes: Mutex<Vec<(NormalizedPoint, NormalizedPoint, Duration)>>,
    /// Every key passed to `global_action`.
    pub keys: Mutex<Vec<SystemKey>>,
    /// When `true`, every method returns `InjectionError::Backend`.
    pub should_fail: bool,
}

impl MockInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of recorded gestures of any kind.
    pub fn total_calls(&self) -> usize {
        self.taps.lock().unwrap().len()
            + self.swipes.lock().unwrap().len()
            + self.keys.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), InjectionError> {
        if self.should_fail {
            Err(InjectionError::Backend("mock failure".into()))
        } else {
            Ok(())
        }
    }
}

impl InputInjector for MockInjector {
    fn tap(&self, point: NormalizedPoint) -> Result<(), InjectionError> {
        self.check()?;
        self.taps.lock().unwrap().push(point);
        Ok(())
    }

    fn swipe(
        &self,
        from: NormalizedPoint,
        to: NormalizedPoint,
        duration: Duration,
    ) -> Result<(), InjectionError> {
        self.check()?;
        self.swipes.lock().unwrap().push((from, to, duration));
        Ok(())
    }

    fn global_action(&self, key: SystemKey) -> Result<(), InjectionError> {
        self.check()?;
        self.keys.lock().unwrap().push(key);
        Ok(())
    }
}
