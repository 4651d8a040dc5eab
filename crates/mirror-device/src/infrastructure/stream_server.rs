//! Minimal multipart HTTP server for local-network viewers.
//!
//! # What is a multipart image stream? (for beginners)
//!
//! Browsers and most video tools understand a response with content type
//! `multipart/x-mixed-replace`.  The server never finishes the response;
//! instead it keeps writing *parts*, each one a complete JPEG preceded by a
//! boundary line and a few headers.  Every new part replaces the previous
//! image on screen, so an endless stream of JPEGs plays as video:
//!
//! ```text
//! HTTP/1.1 200 OK
//! Content-Type: multipart/x-mixed-replace; boundary=mjpegframe
//!
//! --mjpegframe
//! Content-Type: image/jpeg
//! Content-Length: 48213
//!
//! <48213 bytes of JPEG>
//! --mjpegframe
//! ...
//! ```
//!
//! # Connection model
//!
//! Each accepted TCP connection runs in its own Tokio task and reads the
//! shared [`FrameBuffer`] on a fixed tick.  A slow viewer only slows its own
//! task: it sees fewer frames, it never delays the producer or other viewers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mirror_core::FrameBuffer;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Largest request head (request line plus headers) a viewer may send.
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Exact response for any path that is not the stream route.
const OK_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK";

/// Pause after a failed accept so a persistent error cannot spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors returned to the owner of a stream server.
#[derive(Debug, Error)]
pub enum StreamServerError {
    #[error("failed to bind stream server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Per-server streaming settings.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Pause between two parts on one connection.
    pub frame_interval: Duration,
    /// Multipart boundary token.
    pub boundary: String,
    /// Request paths containing this string get the stream.
    pub route: String,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(50),
            boundary: "mjpegframe".to_string(),
            route: "/stream".to_string(),
        }
    }
}

type ConnectionSet = Arc<Mutex<HashMap<u64, SocketAddr>>>;

fn lock(set: &ConnectionSet) -> MutexGuard<'_, HashMap<u64, SocketAddr>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running stream server.
///
/// Dropping the server stops it.
pub struct StreamServer {
    name: &'static str,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    connections: ConnectionSet,
    accept_task: JoinHandle<()>,
}

impl StreamServer {
    /// Binds `bind_addr` and starts serving frames from `buffer`.
    ///
    /// `name` labels log lines (e.g. `"screen"`).  Port `0` picks a free port;
    /// see [`StreamServer::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamServerError::Bind`] if the listener cannot be bound.
    pub async fn start(
        name: &'static str,
        bind_addr: SocketAddr,
        buffer: FrameBuffer,
        options: StreamOptions,
    ) -> Result<Self, StreamServerError> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| StreamServerError::Bind {
                addr: bind_addr,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StreamServerError::Bind {
                addr: bind_addr,
                source,
            })?;

        info!("{name} stream server listening on {local_addr}");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let connections: ConnectionSet = Arc::new(Mutex::new(HashMap::new()));
        let accept_task = tokio::spawn(accept_loop(
            name,
            listener,
            buffer,
            Arc::new(options),
            shutdown_rx,
            Arc::clone(&connections),
        ));

        Ok(Self {
            name,
            local_addr,
            shutdown,
            connections,
            accept_task,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of viewer connections currently being served.
    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    /// Closes the listener and stops every connection loop.  Idempotent.
    pub fn stop(&self) {
        let already_stopped = self.shutdown.send_replace(true);
        if !already_stopped {
            info!("{} stream server on {} stopping", self.name, self.local_addr);
        }
        self.accept_task.abort();
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    name: &'static str,
    listener: TcpListener,
    buffer: FrameBuffer,
    options: Arc<StreamOptions>,
    mut shutdown: watch::Receiver<bool>,
    connections: ConnectionSet,
) {
    let next_id = AtomicU64::new(0);

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stopped| *stopped).await; } => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let id = next_id.fetch_add(1, Ordering::Relaxed);
                    lock(&connections).insert(id, peer);
                    debug!("{name} stream: viewer {peer} connected");

                    tokio::spawn(handle_viewer(
                        name,
                        stream,
                        peer,
                        id,
                        buffer.clone(),
                        Arc::clone(&options),
                        shutdown.clone(),
                        Arc::clone(&connections),
                    ));
                }
                Err(e) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    warn!("{name} stream: accept error: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    debug!("{name} stream: accept loop finished");
}

// ── Per-viewer handler ────────────────────────────────────────────────────────

/// Serves one viewer and removes it from the connection set afterwards.
#[allow(clippy::too_many_arguments)]
async fn handle_viewer(
    name: &'static str,
    stream: TcpStream,
    peer: SocketAddr,
    id: u64,
    buffer: FrameBuffer,
    options: Arc<StreamOptions>,
    shutdown: watch::Receiver<bool>,
    connections: ConnectionSet,
) {
    match serve_viewer(stream, &buffer, &options, shutdown).await {
        Ok(parts) => debug!("{name} stream: viewer {peer} done after {parts} parts"),
        Err(e) => debug!("{name} stream: viewer {peer} ended: {e}"),
    }
    lock(&connections).remove(&id);
}

/// Reads the request and writes either the plain `OK` reply or the endless
/// multipart stream.  Returns the number of parts written.
async fn serve_viewer(
    mut stream: TcpStream,
    buffer: &FrameBuffer,
    options: &StreamOptions,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<u64> {
    // A viewer that connects and never sends a request must not outlive stop().
    let head = tokio::select! {
        head = read_request_head(&mut stream) => head?,
        _ = shutdown.changed() => return Ok(0),
    };
    let Some(request_line) = head.lines().next().filter(|line| !line.is_empty()) else {
        return Ok(0);
    };

    if !request_line.contains(options.route.as_str()) {
        stream.write_all(OK_RESPONSE).await?;
        stream.shutdown().await?;
        return Ok(0);
    }

    stream
        .write_all(multipart_header(&options.boundary).as_bytes())
        .await?;
    stream.flush().await?;

    let mut parts = 0u64;
    loop {
        if *shutdown.borrow() {
            break;
        }

        if let Some(frame) = buffer.get() {
            stream
                .write_all(part_header(&options.boundary, frame.len()).as_bytes())
                .await?;
            stream.write_all(frame.as_bytes()).await?;
            stream.write_all(b"\r\n").await?;
            stream.flush().await?;
            parts += 1;
        }

        tokio::select! {
            _ = tokio::time::sleep(options.frame_interval) => {}
            // Fires on stop() and when the server is dropped.
            _ = shutdown.changed() => break,
        }
    }

    Ok(parts)
}

/// Reads bytes up to and including the blank line that ends the request head.
///
/// A client that closes early yields whatever was read.  A head larger than
/// [`MAX_REQUEST_HEAD`] is an error.
async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(512);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") || head.windows(2).any(|w| w == b"\n\n") {
            break;
        }
        if head.len() > MAX_REQUEST_HEAD {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
    }

    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn multipart_header(boundary: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: multipart/x-mixed-replace; boundary={boundary}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: keep-alive\r\n\r\n"
    )
}

fn part_header(boundary: &str, len: usize) -> String {
    format!("--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
