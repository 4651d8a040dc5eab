//! An injector that writes each gesture to the log instead of the UI.

use std::time::Duration;

use mirror_core::{NormalizedPoint, SystemKey};
use tracing::info;

use crate::application::dispatch_command::{InjectionError, InputInjector};

/// Logs every gesture at `info` level.  Never fails.
#[derive(Debug, Default)]
pub struct LoggingInjector;

impl LoggingInjector {
    pub fn new() -> Self {
        Self
    }
}

impl InputInjector for LoggingInjector {
    fn tap(&self, point: NormalizedPoint) -> Result<(), InjectionError> {
        info!("tap at ({:.3}, {:.3})", point.x, point.y);
        Ok(())
    }

    fn swipe(
        &self,
        from: NormalizedPoint,
        to: NormalizedPoint,
        duration: Duration,
    ) -> Result<(), InjectionError> {
        info!(
            "swipe ({:.3}, {:.3}) -> ({:.3}, {:.3}) over {}ms",
            from.x,
            from.y,
            to.x,
            to.y,
            duration.as_millis()
        );
        Ok(())
    }

    fn global_action(&self, key: SystemKey) -> Result<(), InjectionError> {
        info!("global action {key:?} (key code {})", key.key_code());
        Ok(())
    }
}
