//! Integration tests for `StreamServer` using raw TCP clients.

use std::net::SocketAddr;
use std::time::Duration;

use mirror_core::{Frame, FrameBuffer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use mirror_device::infrastructure::stream_server::{StreamOptions, StreamServer};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];

async fn start(buffer: FrameBuffer) -> StreamServer {
    let options = StreamOptions {
        frame_interval: Duration::from_millis(20),
        ..StreamOptions::default()
    };
    StreamServer::start("screen", "127.0.0.1:0".parse().unwrap(), buffer, options)
        .await
        .unwrap()
}

async fn request(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: test\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    stream
}

/// Reads until `needle` has been seen `count` times or the deadline passes.
async fn read_until_count(stream: &mut TcpStream, needle: &[u8], count: usize) -> Vec<u8> {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while occurrences(&data, needle) < count {
        let read = tokio::time::timeout_at(deadline, stream.read(&mut chunk))
            .await
            .expect("timed out reading the stream")
            .unwrap();
        if read == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..read]);
    }
    data
}

/// Polls `connection_count()` until it equals `expected` or 2 s pass.
async fn wait_for_connections(server: &StreamServer, expected: usize) -> usize {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while server.connection_count() != expected && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    server.connection_count()
}

fn occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_root_path_returns_exact_ok() {
    // Arrange
    let server = start(FrameBuffer::new()).await;
    let mut client = request(server.local_addr(), "/").await;

    // Act
    let mut body = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut body))
        .await
        .unwrap()
        .unwrap();

    // Assert
    assert_eq!(
        body,
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK"
    );
}

#[tokio::test]
async fn test_stream_parts_carry_jpeg() {
    // Arrange
    let buffer = FrameBuffer::new();
    buffer.set(Frame::new(JPEG.to_vec()));
    let server = start(buffer).await;
    let mut client = request(server.local_addr(), "/stream").await;

    // Act
    let data = read_until_count(&mut client, b"--mjpegframe\r\n", 2).await;

    // Assert: response header.
    let head_end = find(&data, b"\r\n\r\n").unwrap();
    let head = String::from_utf8_lossy(&data[..head_end]);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Type: multipart/x-mixed-replace; boundary=mjpegframe"));
    assert!(head.contains("Cache-Control: no-cache"));

    // Assert: first part header and payload.
    let part = &data[head_end + 4..];
    let expected = format!(
        "--mjpegframe\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        JPEG.len()
    );
    assert!(part.starts_with(expected.as_bytes()));
    let payload = &part[expected.len()..expected.len() + JPEG.len()];
    assert_eq!(&payload[..2], &[0xFF, 0xD8], "JPEG SOI marker");
    assert_eq!(payload, JPEG);
}

#[tokio::test]
async fn test_empty_buffer_yields_no_parts() {
    let server = start(FrameBuffer::new()).await;
    let mut client = request(server.local_addr(), "/stream").await;

    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    let _ = tokio::time::timeout(Duration::from_millis(200), async {
        loop {
            match client.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => data.extend_from_slice(&chunk[..n]),
            }
        }
    })
    .await;

    assert!(find(&data, b"multipart/x-mixed-replace").is_some());
    assert_eq!(occurrences(&data, b"--mjpegframe"), 0);
}

#[tokio::test]
async fn test_two_clients_are_served_independently() {
    // Arrange
    let buffer = FrameBuffer::new();
    buffer.set(Frame::new(JPEG.to_vec()));
    let server = start(buffer).await;
    let mut a = request(server.local_addr(), "/stream").await;
    let mut b = request(server.local_addr(), "/stream").await;

    // Act: only `a` is read; `b` is left idle.
    let data = read_until_count(&mut a, b"--mjpegframe\r\n", 3).await;

    // Assert
    assert!(occurrences(&data, b"--mjpegframe\r\n") >= 3);
    assert_eq!(server.connection_count(), 2);
    let data_b = read_until_count(&mut b, b"--mjpegframe\r\n", 1).await;
    assert!(occurrences(&data_b, b"--mjpegframe\r\n") >= 1);
}

#[tokio::test]
async fn test_newer_frame_replaces_older() {
    let buffer = FrameBuffer::new();
    buffer.set(Frame::new(vec![0xFF, 0xD8, 0x01]));
    let server = start(buffer.clone()).await;
    let mut client = request(server.local_addr(), "/stream").await;
    let _ = read_until_count(&mut client, b"--mjpegframe\r\n", 1).await;

    buffer.set(Frame::new(vec![0xFF, 0xD8, 0x02, 0x02]));
    let data = read_until_count(&mut client, b"Content-Length: 4\r\n", 2).await;

    assert!(find(&data, &[0xFF, 0xD8, 0x02, 0x02]).is_some());
}

#[tokio::test]
async fn test_stop_ends_connection_loops() {
    // Arrange
    let buffer = FrameBuffer::new();
    buffer.set(Frame::new(JPEG.to_vec()));
    let server = start(buffer).await;
    let addr = server.local_addr();
    let mut client = request(addr, "/stream").await;
    let _ = read_until_count(&mut client, b"--mjpegframe\r\n", 1).await;

    // Act
    server.stop();

    // Assert: the stream ends (EOF or reset) shortly after.
    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        let mut chunk = [0u8; 4096];
        loop {
            match client.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "connection loop kept running after stop()");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.connection_count(), 0);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_closing_one_client_leaves_the_other_streaming() {
    // Arrange
    let buffer = FrameBuffer::new();
    buffer.set(Frame::new(JPEG.to_vec()));
    let server = start(buffer).await;
    let mut a = request(server.local_addr(), "/stream").await;
    let mut b = request(server.local_addr(), "/stream").await;
    let _ = read_until_count(&mut a, b"--mjpegframe\r\n", 1).await;
    let _ = read_until_count(&mut b, b"--mjpegframe\r\n", 1).await;

    // Act
    drop(a);

    // Assert: the server notices the closed socket and keeps feeding `b`.
    assert_eq!(wait_for_connections(&server, 1).await, 1);
    let data = read_until_count(&mut b, b"--mjpegframe\r\n", 3).await;
    assert!(occurrences(&data, b"--mjpegframe\r\n") >= 3);
}

#[tokio::test]
async fn test_stop_closes_client_that_never_sent_a_request() {
    // Arrange: connect but write nothing.
    let server = start(FrameBuffer::new()).await;
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    assert_eq!(wait_for_connections(&server, 1).await, 1);

    // Act
    server.stop();

    // Assert: the socket is closed without a response.
    let mut chunk = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut chunk))
        .await
        .expect("idle connection kept open after stop()");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert_eq!(wait_for_connections(&server, 0).await, 0);
}
