//! WebSocket server: accept loop, pairing, and relay.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener and accepting connections from devices and
//!    viewers.
//! 2. Upgrading each connection to a WebSocket session in its own task.
//! 3. Handling `register` (device) and `join` (viewer): filling the session
//!    slot, acknowledging, and telling both sides once they are paired.
//! 4. Forwarding relay traffic (`command`, `stream_info`, `heartbeat`,
//!    `relay`, `frame`) verbatim to the other role.
//! 5. Cleaning up on close and telling the remaining peer
//!    `peer_disconnected`.
//!
//! # Per-connection tasks
//!
//! Each connection has a reader (this task) and a writer task that drains its
//! `Outbox`.  The registry stores outbox senders, so any connection can
//! queue a message for any other without touching its socket.
//!
//! Control traffic is queued in order.  `frame` messages go into a single
//! latest-wins slot instead: a peer that reads slower than the other side
//! sends only ever holds one pending frame, older ones are dropped.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use mirror_core::{encode_text, Role, ServerMessage};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Attached, Binding, SessionRegistry};

/// Message types forwarded verbatim to the other role.
pub const RELAY_TYPES: [&str; 5] = ["command", "stream_info", "heartbeat", "relay", "frame"];

/// Text sent to a viewer that joined before the device.
const WAITING_MESSAGE: &str = "waiting for the device to connect";

// ── Outbox ────────────────────────────────────────────────────────────────────

/// Sending half of one connection's outbound traffic.
#[derive(Clone)]
struct Outbox {
    control: mpsc::UnboundedSender<String>,
    frame: Arc<watch::Sender<Option<String>>>,
}

/// Receiving half, owned by the connection's writer task.
struct OutboxReceiver {
    control: mpsc::UnboundedReceiver<String>,
    frame: watch::Receiver<Option<String>>,
}

impl Outbox {
    fn new() -> (Self, OutboxReceiver) {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (frame, frame_rx) = watch::channel(None);
        (
            Self {
                control,
                frame: Arc::new(frame),
            },
            OutboxReceiver {
                control: control_rx,
                frame: frame_rx,
            },
        )
    }

    /// Queues a control message.  Returns `false` if the writer is gone.
    fn send(&self, text: String) -> bool {
        self.control.send(text).is_ok()
    }

    /// Replaces the pending frame.  Returns `false` if the writer is gone.
    fn send_frame(&self, text: String) -> bool {
        self.frame.send(Some(text)).is_ok()
    }
}

impl OutboxReceiver {
    /// Next message to write: queued control messages first, then the
    /// latest frame.  `None` once every sender is dropped and the control
    /// queue is drained.
    async fn recv(&mut self) -> Option<String> {
        loop {
            tokio::select! {
                biased;

                text = self.control.recv() => return text,

                changed = self.frame.changed() => {
                    if changed.is_err() {
                        return self.control.recv().await;
                    }
                    if let Some(text) = self.frame.borrow_and_update().clone() {
                        return Some(text);
                    }
                }
            }
        }
    }
}

type SharedRegistry = Arc<Mutex<SessionRegistry<Outbox>>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, SessionRegistry<Outbox>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound rendezvous server.
pub struct RendezvousServer {
    listener: TcpListener,
    registry: SharedRegistry,
}

impl RendezvousServer {
    /// Binds the listener.  Port `0` picks a free port.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind rendezvous listener on {addr}"))?;
        Ok(Self {
            listener,
            registry: Arc::new(Mutex::new(SessionRegistry::new())),
        })
    }

    /// The address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS cannot report the local address.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("failed to read rendezvous listener address")
    }

    /// Accepts connections until `shutdown` becomes `true` or its sender is
    /// dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("rendezvous server listening on ws://{addr}");
        }

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("shutdown requested; stopping accept loop");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("new connection from {peer_addr}");
                        tokio::spawn(handle_connection(
                            stream,
                            peer_addr,
                            Arc::clone(&self.registry),
                        ));
                    }
                    Err(e) => error!("accept error: {e}"),
                },
            }
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Wraps [`run_connection`] and logs the outcome.
async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, registry: SharedRegistry) {
    match run_connection(stream, peer_addr, registry).await {
        Ok(()) => debug!("connection {peer_addr} closed"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one connection from handshake to cleanup.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails.  Read errors after the
/// handshake end the connection normally.
async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: SharedRegistry,
) -> anyhow::Result<()> {
    let ws = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut sink, mut source) = ws.split();

    let (outbox, mut outbox_rx) = Outbox::new();
    let writer = tokio::spawn(async move {
        while let Some(text) = outbox_rx.recv().await {
            if let Err(e) = sink.send(WsMessage::Text(text)).await {
                debug!("write to {peer_addr} failed: {e}");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut conn = Connection {
        id: Uuid::new_v4(),
        outbox,
        binding: None,
        registry,
    };

    while let Some(frame) = source.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => conn.handle_text(&text),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
            Err(e) => {
                debug!("read from {peer_addr} failed: {e}");
                break;
            }
        }
    }

    if let Some(binding) = conn.binding.take() {
        conn.leave(&binding);
        info!("closed: code={}, role={}", binding.code, binding.role);
    }
    // Dropping the last outbox sender lets the writer finish.
    drop(conn);
    let _ = writer.await;
    Ok(())
}

/// State of one live connection.
struct Connection {
    id: Uuid,
    outbox: Outbox,
    binding: Option<Binding>,
    registry: SharedRegistry,
}

impl Connection {
    fn reply(&self, msg: &ServerMessage) {
        send(&self.outbox, msg);
    }

    fn reply_error(&self, message: impl Into<String>) {
        self.reply(&ServerMessage::error(message));
    }

    fn handle_text(&mut self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => {
                self.reply_error("invalid JSON");
                return;
            }
        };
        let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
        debug!(
            "[{kind}] code={:?} role={:?}",
            value.get("code"),
            value.get("role")
        );

        match kind {
            "register" => self.handle_attach(&value, Role::Device),
            "join" => self.handle_attach(&value, Role::Viewer),
            kind if RELAY_TYPES.contains(&kind) => self.handle_relay(kind, text),
            other => self.reply_error(format!("unknown: {other}")),
        }
    }

    /// Handles `register` and `join`.  `default_role` applies when the
    /// message carries no `role`.
    fn handle_attach(&mut self, value: &Value, default_role: Role) {
        let role = match value.get("role") {
            None | Some(Value::Null) => default_role,
            Some(raw) => match serde_json::from_value::<Role>(raw.clone()) {
                Ok(role) => role,
                Err(_) => {
                    self.reply_error(format!("invalid role: {raw}"));
                    return;
                }
            },
        };
        let code = value.get("code").and_then(Value::as_str).unwrap_or("");

        // A connection holds one slot at a time.
        if let Some(previous) = self.binding.take() {
            self.leave(&previous);
        }

        let attached = lock(&self.registry).attach(code, role, self.id, self.outbox.clone());
        let attached = match attached {
            Ok(attached) => attached,
            Err(e) => {
                self.reply_error(e.to_string());
                return;
            }
        };

        let binding = attached.binding().clone();
        let ack = match default_role {
            Role::Device => ServerMessage::Registered {
                code: Some(binding.code.clone()),
                role: Some(binding.role),
            },
            Role::Viewer => ServerMessage::Joined {
                code: Some(binding.code.clone()),
                role: Some(binding.role),
            },
        };
        self.reply(&ack);
        info!("{}: code={}, role={}", ack.kind(), binding.code, binding.role);

        match attached {
            Attached::Paired { device, viewer, .. } => {
                info!("paired: code={}", binding.code);
                for (role, outbox) in [(Role::Device, device), (Role::Viewer, viewer)] {
                    send(
                        &outbox,
                        &ServerMessage::Paired {
                            code: Some(binding.code.clone()),
                            your_role: Some(role),
                        },
                    );
                }
            }
            Attached::Alone(_) if default_role == Role::Viewer => {
                self.reply(&ServerMessage::Waiting {
                    message: WAITING_MESSAGE.to_string(),
                });
            }
            Attached::Alone(_) => {}
        }

        self.binding = Some(binding);
    }

    /// Forwards `text` unchanged to the other role.
    fn handle_relay(&self, kind: &str, text: &str) {
        let peer = lock(&self.registry).peer_of(self.binding.as_ref());
        match peer {
            Ok(outbox) => {
                let delivered = if kind == "frame" {
                    outbox.send_frame(text.to_string())
                } else {
                    outbox.send(text.to_string())
                };
                if !delivered {
                    self.reply_error("peer connection lost");
                }
            }
            Err(e) => self.reply_error(e.to_string()),
        }
    }

    /// Frees this connection's slot and tells the other role it left.
    fn leave(&self, binding: &Binding) {
        let peer = lock(&self.registry).detach(binding, self.id);
        if let Some(outbox) = peer {
            send(
                &outbox,
                &ServerMessage::PeerDisconnected {
                    role: Some(binding.role),
                },
            );
        }
    }
}

fn send(outbox: &Outbox, msg: &ServerMessage) {
    match encode_text(msg) {
        // A closed outbox means that connection is already going away.
        Ok(text) => {
            outbox.send(text);
        }
        Err(e) => error!("failed to encode {}: {e}", msg.kind()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Connection, OutboxReceiver, SharedRegistry) {
        let registry: SharedRegistry = Arc::new(Mutex::new(SessionRegistry::new()));
        let (outbox, rx) = Outbox::new();
        let conn = Connection {
            id: Uuid::new_v4(),
            outbox,
            binding: None,
            registry: Arc::clone(&registry),
        };
        (conn, rx, registry)
    }

    fn next_json(rx: &mut OutboxReceiver) -> Value {
        serde_json::from_str(&rx.control.try_recv().expect("expected a message")).unwrap()
    }

    #[test]
    fn test_invalid_json_gets_error() {
        let (mut conn, mut rx, _) = connection();

        conn.handle_text("{nope");

        let reply = next_json(&mut rx);
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["message"], "invalid JSON");
    }

    #[test]
    fn test_unknown_type_gets_error() {
        let (mut conn, mut rx, _) = connection();

        conn.handle_text(r#"{"type":"dance"}"#);

        assert_eq!(next_json(&mut rx)["message"], "unknown: dance");
    }

    #[test]
    fn test_register_without_code_gets_error() {
        let (mut conn, mut rx, registry) = connection();

        conn.handle_text(r#"{"type":"register","role":"device"}"#);

        assert_eq!(next_json(&mut rx)["message"], "code missing");
        assert_eq!(lock(&registry).session_count(), 0);
    }

    #[test]
    fn test_register_accepts_legacy_role_name() {
        // Arrange
        let (mut conn, mut rx, _) = connection();

        // Act
        conn.handle_text(r#"{"type":"register","code":"123456","role":"phone"}"#);

        // Assert
        let ack = next_json(&mut rx);
        assert_eq!(ack["type"], "registered");
        assert_eq!(ack["code"], "123456");
        assert_eq!(ack["role"], "device");
        assert!(rx.control.try_recv().is_err(), "device alone gets no waiting");
    }

    #[test]
    fn test_join_alone_gets_joined_then_waiting() {
        let (mut conn, mut rx, _) = connection();

        conn.handle_text(r#"{"type":"join","code":"123456"}"#);

        assert_eq!(next_json(&mut rx)["type"], "joined");
        assert_eq!(next_json(&mut rx)["type"], "waiting");
    }

    #[test]
    fn test_relay_before_register_gets_error() {
        let (mut conn, mut rx, _) = connection();

        conn.handle_text(r#"{"type":"command","action":"touch","x":0.5,"y":0.5}"#);

        assert_eq!(next_json(&mut rx)["message"], "not registered");
    }

    #[test]
    fn test_relay_without_peer_names_missing_role() {
        let (mut conn, mut rx, _) = connection();
        conn.handle_text(r#"{"type":"join","code":"123456","role":"viewer"}"#);
        let _ = next_json(&mut rx);
        let _ = next_json(&mut rx);

        conn.handle_text(r#"{"type":"command","action":"camera_on"}"#);

        assert_eq!(next_json(&mut rx)["message"], "device not connected");
    }

    #[tokio::test]
    async fn test_frames_for_a_slow_reader_keep_only_the_latest() {
        // Arrange: nobody drains the receiver while frames pile up.
        let (outbox, mut rx) = Outbox::new();

        // Act
        for n in 0..1000 {
            assert!(outbox.send_frame(format!(r#"{{"type":"frame","data":"{n}"}}"#)));
        }
        outbox.send(r#"{"type":"heartbeat"}"#.to_string());

        // Assert: the control message comes first, then one frame, the newest.
        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"heartbeat"}"#);
        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"frame","data":"999"}"#);
        assert!(rx.control.try_recv().is_err());
        assert!(!rx.frame.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_control_messages_keep_their_order() {
        let (outbox, mut rx) = Outbox::new();

        for n in 0..5 {
            outbox.send(format!("m{n}"));
        }

        for n in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), format!("m{n}"));
        }
    }

    #[tokio::test]
    async fn test_outbox_receiver_ends_when_senders_drop() {
        let (outbox, mut rx) = Outbox::new();
        outbox.send("last".to_string());

        drop(outbox);

        assert_eq!(rx.recv().await.as_deref(), Some("last"));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_relayed_frame_replaces_pending_frame_for_peer() {
        // Arrange: pair a device and a viewer; the viewer never reads.
        let (mut device, mut device_rx, registry) = connection();
        let (viewer_outbox, mut viewer_rx) = Outbox::new();
        let mut viewer = Connection {
            id: Uuid::new_v4(),
            outbox: viewer_outbox,
            binding: None,
            registry: Arc::clone(&registry),
        };
        device.handle_text(r#"{"type":"register","code":"123456","role":"device"}"#);
        viewer.handle_text(r#"{"type":"join","code":"123456","role":"viewer"}"#);
        while device_rx.control.try_recv().is_ok() {}
        while viewer_rx.control.try_recv().is_ok() {}

        // Act
        device.handle_text(r#"{"type":"frame","data":"AAAA"}"#);
        device.handle_text(r#"{"type":"frame","data":"BBBB"}"#);

        // Assert
        assert!(viewer_rx.control.try_recv().is_err(), "frames bypass the control queue");
        assert_eq!(
            viewer_rx.frame.borrow_and_update().as_deref(),
            Some(r#"{"type":"frame","data":"BBBB"}"#)
        );
        assert!(device_rx.control.try_recv().is_err());
    }

    #[test]
    fn test_relay_types_cover_peer_traffic() {
        for kind in ["command", "stream_info", "heartbeat", "relay", "frame"] {
            assert!(RELAY_TYPES.contains(&kind));
        }
        assert!(!RELAY_TYPES.contains(&"register"));
    }
}
