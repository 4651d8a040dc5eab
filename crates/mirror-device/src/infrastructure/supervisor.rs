//! DeviceSupervisor: owns the signaling session lifecycle.
//!
//! # What does the supervisor do? (for beginners)
//!
//! A [`SignalingSession`] never reconnects.  The supervisor is the loop that
//! keeps the device reachable:
//!
//! ```text
//! loop {
//!     create session ─▶ attach relays ─▶ connect() ─▶ log code
//!       │
//!       ├─ Paired          → start screen capture, announce screen URL
//!       ├─ Command(cmd)    → CommandDispatcher (camera_on → announce camera URL)
//!       └─ Disconnected    → detach relays, stop captures, wait, next code
//! }
//! ```
//!
//! The next code comes from the configured [`CodePolicy`]: a fresh random
//! code (`regenerate`, the default) or the previous one (`preserve`).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{CodePolicy, ControlAction, SessionCode};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::dispatch_command::{CommandDispatcher, InputInjector};
use crate::application::frame_relay::FrameRelay;
use crate::infrastructure::capture::CaptureSwitch;
use crate::infrastructure::signaling::{
    DisconnectReason, SessionEvent, SessionEvents, SignalingConfig, SignalingSession,
};

/// Settings for the supervisor loop.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub signaling: SignalingConfig,
    pub code_policy: CodePolicy,
    /// Pause between a disconnect (or failed connect) and the next attempt.
    pub reconnect_delay: Duration,
    pub screen_port: u16,
    pub camera_port: u16,
    /// Host announced in stream URLs.  Detected when `None`.
    pub advertise_host: Option<IpAddr>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig::default(),
            code_policy: CodePolicy::default(),
            reconnect_delay: Duration::from_secs(3),
            screen_port: 8080,
            camera_port: 8081,
            advertise_host: None,
        }
    }
}

/// Builds the stream URL announced to the viewer.
///
/// Returns an empty string, meaning "relay only", when no address reachable
/// from the viewer's network is known: no address, the unspecified address,
/// or the emulator NAT range `10.0.2.x`.
pub fn stream_url(host: Option<IpAddr>, port: u16) -> String {
    match host {
        Some(ip) if is_reachable(ip) => format!("http://{}/stream", SocketAddr::new(ip, port)),
        _ => String::new(),
    }
}

fn is_reachable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            !v4.is_unspecified() && (a, b, c) != (10, 0, 2)
        }
        IpAddr::V6(v6) => !v6.is_unspecified(),
    }
}

/// How one session ended, from the supervisor's point of view.
enum SessionOutcome {
    Ended(DisconnectReason),
    Shutdown,
}

/// Keeps one signaling session alive at a time and wires it to the relays,
/// the capture sources, and the command dispatcher.
pub struct DeviceSupervisor {
    config: SupervisorConfig,
    screen_relay: Arc<FrameRelay>,
    camera_relay: Arc<FrameRelay>,
    capture: Arc<CaptureSwitch>,
    dispatcher: CommandDispatcher,
    current_code: watch::Sender<Option<SessionCode>>,
}

impl DeviceSupervisor {
    pub fn new(
        config: SupervisorConfig,
        screen_relay: Arc<FrameRelay>,
        camera_relay: Arc<FrameRelay>,
        capture: Arc<CaptureSwitch>,
        injector: Arc<dyn InputInjector>,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(injector, capture.clone());
        let (current_code, _) = watch::channel(None);
        Self {
            config,
            screen_relay,
            camera_relay,
            capture,
            dispatcher,
            current_code,
        }
    }

    /// Observes the code of the live session.  `None` between sessions.
    pub fn watch_code(&self) -> watch::Receiver<Option<SessionCode>> {
        self.current_code.subscribe()
    }

    /// Runs sessions until `shutdown` becomes `true` (or its sender is
    /// dropped), then disconnects the live session and returns.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let delay = self.config.reconnect_delay;
        let mut code: Option<SessionCode> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let created = tokio::select! {
                created = SignalingSession::create(self.config.signaling.clone(), code.clone()) => created,
                _ = shutdown.wait_for(|stop| *stop) => break,
            };

            let (session, mut events) = match created {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("{e}; retrying in {}s", delay.as_secs_f32());
                    if wait_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            let outcome = self.drive(&session, &mut events, &mut shutdown).await;

            self.screen_relay.detach();
            self.camera_relay.detach();
            self.capture.stop_all();
            self.current_code.send_replace(None);

            let previous = session.code().clone();
            drop(session);

            match outcome {
                SessionOutcome::Shutdown => break,
                SessionOutcome::Ended(reason) => {
                    info!(
                        "session {previous} ended ({reason}); new session in {}s",
                        delay.as_secs_f32()
                    );
                }
            }

            code = Some(self.config.code_policy.next_code(&previous));
            if wait_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        info!("device supervisor stopped");
    }

    /// Runs one session until it disconnects or shutdown is requested.
    async fn drive(
        &self,
        session: &SignalingSession,
        events: &mut SessionEvents,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionOutcome {
        let handle = session.handle();
        self.screen_relay.attach(Arc::new(handle.clone()));
        self.camera_relay.attach(Arc::new(handle.clone()));

        session.connect();
        info!("session code: {} (share it with the viewer)", session.code());
        self.current_code.send_replace(Some(session.code().clone()));

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = shutdown.wait_for(|stop| *stop) => {
                    session.disconnect();
                    return SessionOutcome::Shutdown;
                }
            };

            match event {
                Some(SessionEvent::Registered) => {
                    debug!("waiting for a viewer on code {}", session.code());
                }
                Some(SessionEvent::Paired) => {
                    if let Err(e) = self.capture.start_screen() {
                        warn!("screen capture not started: {e}");
                    }
                    handle.notify_stream_ready(self.url_for(self.config.screen_port));
                }
                Some(SessionEvent::Command(command)) => {
                    if let Some(ControlAction::CameraOn) = self.dispatcher.dispatch(&command) {
                        handle.notify_stream_ready(self.url_for(self.config.camera_port));
                    }
                }
                Some(SessionEvent::Disconnected(reason)) => return SessionOutcome::Ended(reason),
                None => return SessionOutcome::Ended(DisconnectReason::ChannelClosed),
            }
        }
    }

    fn url_for(&self, port: u16) -> String {
        let host = self
            .config
            .advertise_host
            .or_else(|| local_ip_address::local_ip().ok());
        stream_url(host, port)
    }
}

/// Sleeps for `delay`.  Returns `true` if shutdown was requested meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => true,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
