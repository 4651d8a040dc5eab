//! Signaling session: the device's WebSocket link to the rendezvous server.
//!
//! # Lifecycle (for beginners)
//!
//! A [`SignalingSession`] is one attempt at being reachable under one session
//! code.  It opens the WebSocket when it is created and then runs two
//! background tasks:
//!
//! - The **reader** parses every inbound text frame, drives the pairing state
//!   machine, and emits [`SessionEvent`]s in arrival order on one channel.
//! - The **writer** owns the sending half of the socket.  Control messages
//!   reach it through an unbounded queue.  Frames reach it through a
//!   keep-latest slot, so a slow network drops stale frames instead of
//!   queueing them.  The writer also sends a WebSocket ping every
//!   `ping_interval` so idle proxies keep the connection open.
//!
//! ```text
//!   owner ──connect()/notify_stream_ready()──▶ [control queue] ──┐
//!   relay ──send_frame()──────────────────────▶ [frame slot] ────┼─▶ writer ─▶ socket
//!                                                                │
//!   owner ◀──SessionEvent── [event channel] ◀── reader ◀─────────┘─── socket
//! ```
//!
//! The session never reconnects.  Once it emits
//! [`SessionEvent::Disconnected`] it is finished and emits nothing else; the
//! owner builds a fresh session if it wants to try again.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use mirror_core::protocol::codec::{decode_text, encode_text};
use mirror_core::{
    encode_frame_payload, Command, DeviceMessage, Frame, FrameBuffer, FrameWatcher, ServerMessage,
    SessionCode, SessionState,
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::application::frame_relay::FrameUplink;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Public rendezvous server used when nothing else is configured.
pub const DEFAULT_RENDEZVOUS_URL: &str = "wss://connect-your-phone.onrender.com";

/// Shortest allowed delay between pairing and the first stream announcement.
pub const MIN_PAIRING_GRACE: Duration = Duration::from_millis(500);

/// Shortest allowed keepalive interval.
const MIN_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Log one line per this many frames written to the socket.
const FRAME_LOG_EVERY: u64 = 30;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Settings for one signaling session.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// `ws://` or `wss://` URL of the rendezvous server.
    pub rendezvous_url: String,
    /// How long after pairing stream announcements are held back, giving the
    /// viewer time to set up before it starts pulling the stream.  Values
    /// below [`MIN_PAIRING_GRACE`] are raised to it.
    pub pairing_grace: Duration,
    /// Interval between WebSocket pings.
    pub ping_interval: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            rendezvous_url: DEFAULT_RENDEZVOUS_URL.to_string(),
            pairing_grace: MIN_PAIRING_GRACE,
            ping_interval: Duration::from_secs(20),
        }
    }
}

/// Errors returned to the owner of a session.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The WebSocket to the rendezvous server could not be opened.
    #[error("failed to connect to rendezvous server at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: WsError,
    },
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The socket was closed, by either side.
    ChannelClosed,
    /// The socket failed with a transport error.
    ChannelFailed(String),
    /// The server reported that the paired viewer left.
    PeerLeft,
    /// The owner called [`SignalingSession::disconnect`].
    Local,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ChannelClosed => f.write_str("channel closed"),
            DisconnectReason::ChannelFailed(e) => write!(f, "channel failed: {e}"),
            DisconnectReason::PeerLeft => f.write_str("peer left"),
            DisconnectReason::Local => f.write_str("closed locally"),
        }
    }
}

/// Notifications delivered to the session owner, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The server accepted our code.
    Registered,
    /// A viewer joined.  Emitted at most once.
    Paired,
    /// A viewer command, in arrival order.
    Command(Command),
    /// The session is over.  Always the last event, emitted at most once.
    Disconnected(DisconnectReason),
}

/// Receiving end of a session's event channel.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

// ── Shared session state ──────────────────────────────────────────────────────

/// Work items for the writer task.
#[derive(Debug)]
enum Outbound {
    /// Send now.
    Send(DeviceMessage),
    /// Send no earlier than the given instant.
    SendAfter(Instant, DeviceMessage),
    /// Send a Close frame and stop.
    Close,
}

/// Where stream announcements stand relative to pairing.
enum Announcements {
    /// Not paired yet: announcements wait here for `paired`.
    BeforePairing(Vec<DeviceMessage>),
    /// Paired at this instant; announcements go out after the grace period.
    PairedAt(Instant),
}

/// State shared by the session, its handles, and its two tasks.
struct Shared {
    code: SessionCode,
    grace: Duration,
    state: watch::Sender<SessionState>,
    /// Taken (set to `None`) by the terminal transition, so nothing can be
    /// emitted after `Disconnected`.
    events: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    frame_slot: FrameBuffer,
    announcements: Mutex<Announcements>,
    register_queued: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Applies `step` to the current state; returns `true` if it changed.
    fn transition(&self, step: impl FnOnce(SessionState) -> Option<SessionState>) -> bool {
        self.state.send_if_modified(|state| match step(*state) {
            Some(next) => {
                *state = next;
                true
            }
            None => false,
        })
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = lock(&self.events).as_ref() {
            let _ = tx.send(event);
        }
    }

    fn queue(&self, item: Outbound) {
        // The writer is gone once the socket is closed; dropping is correct then.
        let _ = self.outbound.send(item);
    }

    /// The single terminal transition.  Returns `false` if the session had
    /// already ended.
    fn terminate(&self, reason: DisconnectReason) -> bool {
        let ended = self.transition(|state| {
            if state.is_terminal() {
                None
            } else {
                Some(SessionState::Disconnected)
            }
        });
        if !ended {
            return false;
        }

        info!("session {} disconnected: {reason}", self.code);
        let tx = lock(&self.events).take();
        if let Some(tx) = tx {
            let _ = tx.send(SessionEvent::Disconnected(reason));
        }
        self.frame_slot.clear();
        self.queue(Outbound::Close);
        true
    }

    fn offer_frame(&self, frame: Frame) {
        if self.state().accepts_frames() {
            self.frame_slot.set(frame);
        }
    }

    fn notify_stream_ready(&self, url: String) {
        if self.state().is_terminal() {
            debug!("stream_info dropped: session {} is over", self.code);
            return;
        }
        info!("announcing stream url {url:?}");
        let msg = DeviceMessage::StreamInfo { url };
        let mut announcements = lock(&self.announcements);
        match &mut *announcements {
            Announcements::BeforePairing(held) => {
                debug!("stream_info held until a viewer pairs");
                held.push(msg);
            }
            Announcements::PairedAt(paired) => {
                let at = *paired + self.grace;
                if at > Instant::now() {
                    self.queue(Outbound::SendAfter(at, msg));
                } else {
                    self.queue(Outbound::Send(msg));
                }
            }
        }
    }

    /// Records the pairing instant and schedules any announcement made
    /// before it for the end of the grace period.
    fn mark_paired(&self) {
        let now = Instant::now();
        let mut announcements = lock(&self.announcements);
        let previous = std::mem::replace(&mut *announcements, Announcements::PairedAt(now));
        if let Announcements::BeforePairing(held) = previous {
            for msg in held {
                self.queue(Outbound::SendAfter(now + self.grace, msg));
            }
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One signaling session with the rendezvous server.
///
/// Dropping the session disconnects it.
pub struct SignalingSession {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl SignalingSession {
    /// Opens the signaling channel and starts the reader and writer tasks.
    ///
    /// Uses `code` if given, otherwise generates a fresh one.  Nothing is sent
    /// until [`SignalingSession::connect`] is called.
    ///
    /// Returns the session together with its event receiver.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::Connect`] if the WebSocket handshake fails.
    pub async fn create(
        config: SignalingConfig,
        code: Option<SessionCode>,
    ) -> Result<(Self, SessionEvents), SignalingError> {
        let code = code.unwrap_or_else(SessionCode::generate);

        let (ws, _response) = connect_async(config.rendezvous_url.as_str())
            .await
            .map_err(|source| SignalingError::Connect {
                url: config.rendezvous_url.clone(),
                source,
            })?;
        info!(
            "signaling channel open to {} for code {code}",
            config.rendezvous_url
        );

        let (sink, source) = ws.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let frame_slot = FrameBuffer::new();
        let frame_watcher = frame_slot.subscribe();
        let (state_tx, _) = watch::channel(SessionState::Created);

        let shared = Arc::new(Shared {
            code,
            grace: config.pairing_grace.max(MIN_PAIRING_GRACE),
            state: state_tx,
            events: Mutex::new(Some(event_tx)),
            outbound: outbound_tx,
            frame_slot,
            announcements: Mutex::new(Announcements::BeforePairing(Vec::new())),
            register_queued: AtomicBool::new(false),
        });

        let reader = tokio::spawn(run_reader(Arc::clone(&shared), source));
        tokio::spawn(run_writer(
            Arc::clone(&shared),
            sink,
            outbound_rx,
            frame_watcher,
            config.ping_interval.max(MIN_PING_INTERVAL),
        ));

        Ok((Self { shared, reader }, event_rx))
    }

    /// Registers the session code with the server.
    ///
    /// Only the first call has an effect.
    pub fn connect(&self) {
        if self.shared.state().is_terminal() {
            warn!("connect() on a disconnected session ignored");
            return;
        }
        if self.shared.register_queued.swap(true, Ordering::SeqCst) {
            warn!("connect() called twice for session {}; ignoring", self.shared.code);
            return;
        }
        self.shared
            .queue(Outbound::Send(DeviceMessage::register(self.shared.code.clone())));
    }

    /// The code this session registers.
    pub fn code(&self) -> &SessionCode {
        &self.shared.code
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Offers a frame to the uplink.  See [`SessionHandle::send_frame`].
    pub fn send_frame(&self, frame: Frame) {
        self.shared.offer_frame(frame);
    }

    /// Announces where the HTTP stream can be pulled.  An empty `url` tells
    /// the viewer to rely on relayed frames only.
    ///
    /// The announcement never reaches the viewer before the pairing grace
    /// period has passed: before pairing it is held until `paired` arrives,
    /// within the grace period until the period ends.
    pub fn notify_stream_ready(&self, url: impl Into<String>) {
        self.shared.notify_stream_ready(url.into());
    }

    /// A cheap, cloneable handle for frame producers and announcers.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Closes the session.  Emits `Disconnected(Local)` unless the session had
    /// already ended.  Safe to call more than once.
    pub fn disconnect(&self) {
        self.shared.terminate(DisconnectReason::Local);
        self.reader.abort();
    }
}

impl Drop for SignalingSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Cloneable access to a live session for frame producers.
///
/// A handle does not keep the session open: once the owner drops or
/// disconnects the [`SignalingSession`], every handle becomes a no-op.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Offers a frame for sending.
    ///
    /// Silently does nothing unless the session is registered or paired.  If
    /// the writer has not sent the previous frame yet, this one replaces it.
    pub fn send_frame(&self, frame: Frame) {
        self.shared.offer_frame(frame);
    }

    pub fn notify_stream_ready(&self, url: impl Into<String>) {
        self.shared.notify_stream_ready(url.into());
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn code(&self) -> &SessionCode {
        &self.shared.code
    }
}

impl FrameUplink for SessionHandle {
    fn is_paired(&self) -> bool {
        self.shared.state() == SessionState::Paired
    }

    fn send_frame(&self, frame: Frame) {
        self.shared.offer_frame(frame);
    }
}

// ── Reader task ───────────────────────────────────────────────────────────────

async fn run_reader(shared: Arc<Shared>, mut source: WsSource) {
    let reason = loop {
        match source.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                if let Some(reason) = handle_text(&shared, &text) {
                    break reason;
                }
            }
            Some(Ok(WsMessage::Close(frame))) => {
                debug!("server closed the signaling channel: {frame:?}");
                break DisconnectReason::ChannelClosed;
            }
            Some(Ok(_)) => {
                // Ping, pong, and binary frames carry nothing for us.
            }
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                break DisconnectReason::ChannelClosed;
            }
            Some(Err(e)) => {
                warn!("signaling channel error: {e}");
                break DisconnectReason::ChannelFailed(e.to_string());
            }
        }
    };
    shared.terminate(reason);
}

/// Handles one inbound text frame.  Returns a reason when the message ends
/// the session.
fn handle_text(shared: &Shared, text: &str) -> Option<DisconnectReason> {
    let msg: ServerMessage = match decode_text(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("dropping inbound message: {e}");
            return None;
        }
    };
    debug!("received {}", msg.kind());

    match msg {
        ServerMessage::Registered { .. } => {
            if shared.transition(SessionState::after_registered) {
                info!("registered with code {}", shared.code);
                shared.emit(SessionEvent::Registered);
            } else {
                debug!("ignoring registered in state {}", shared.state());
            }
        }
        ServerMessage::Paired { .. } => {
            if shared.transition(SessionState::after_paired) {
                shared.mark_paired();
                info!("paired with a viewer on code {}", shared.code);
                shared.emit(SessionEvent::Paired);
            } else {
                warn!("ignoring duplicate paired in state {}", shared.state());
            }
        }
        msg @ ServerMessage::Command { .. } => {
            if let Some(command) = msg.into_command() {
                shared.emit(SessionEvent::Command(command));
            }
        }
        ServerMessage::PeerDisconnected { role } => {
            info!("peer disconnected (role {role:?})");
            return Some(DisconnectReason::PeerLeft);
        }
        ServerMessage::Error { message } => {
            warn!("rendezvous server error: {message}");
        }
        ServerMessage::Joined { .. }
        | ServerMessage::Waiting { .. }
        | ServerMessage::StreamInfo { .. }
        | ServerMessage::Frame { .. }
        | ServerMessage::Heartbeat
        | ServerMessage::Unknown => {}
    }
    None
}

// ── Writer task ───────────────────────────────────────────────────────────────

async fn run_writer(
    shared: Arc<Shared>,
    mut sink: WsSink,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut frames: FrameWatcher,
    ping_interval: Duration,
) {
    let mut held: VecDeque<(Instant, DeviceMessage)> = VecDeque::new();
    let mut ping = time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut frames_sent: u64 = 0;

    let result: Result<(), WsError> = loop {
        let next_due = held.front().map(|(at, _)| *at);

        tokio::select! {
            biased;

            item = outbound.recv() => match item {
                Some(Outbound::Send(msg)) => {
                    // Keep order behind anything still held back.
                    if let Some(&(at, _)) = held.back() {
                        held.push_back((at, msg));
                    } else if let Err(e) = send_message(&mut sink, &msg).await {
                        break Err(e);
                    }
                }
                Some(Outbound::SendAfter(at, msg)) => {
                    let at = held.back().map_or(at, |&(last, _)| at.max(last));
                    held.push_back((at, msg));
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    let _ = sink.close().await;
                    debug!("signaling writer for {} stopped", shared.code);
                    return;
                }
            },

            _ = time::sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                let now = Instant::now();
                let mut failed = None;
                while held.front().is_some_and(|(at, _)| *at <= now) {
                    if let Some((_, msg)) = held.pop_front() {
                        if let Err(e) = send_message(&mut sink, &msg).await {
                            failed = Some(e);
                            break;
                        }
                    }
                }
                if let Some(e) = failed {
                    break Err(e);
                }
            }

            frame = frames.next_frame() => {
                let Some(frame) = frame else {
                    return;
                };
                if shared.state().accepts_frames() {
                    let msg = DeviceMessage::Frame { data: encode_frame_payload(&frame) };
                    if let Err(e) = send_message(&mut sink, &msg).await {
                        break Err(e);
                    }
                    frames_sent += 1;
                    if frames_sent % FRAME_LOG_EVERY == 0 {
                        debug!("sent {frames_sent} frames ({} bytes last)", frame.len());
                    }
                }
            }

            _ = ping.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new())).await {
                    break Err(e);
                }
            }
        }
    };

    if let Err(e) = result {
        warn!("signaling write failed: {e}");
        shared.terminate(DisconnectReason::ChannelFailed(e.to_string()));
    }
}

async fn send_message(sink: &mut WsSink, msg: &DeviceMessage) -> Result<(), WsError> {
    match encode_text(msg) {
        Ok(text) => sink.send(WsMessage::Text(text)).await,
        Err(e) => {
            error!("failed to encode outbound message: {e}");
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
