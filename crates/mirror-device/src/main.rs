//! Remote Mirror device agent entry point.
//!
//! Wires together the stream servers, capture sources, input injection, and
//! the session supervisor, then runs until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config() + CLI overrides
//!  └─ StreamServer (screen, :8080) ◀── FrameBuffer ◀── FrameRelay ◀── screen capture
//!  └─ StreamServer (camera, :8081) ◀── FrameBuffer ◀── FrameRelay ◀── camera capture
//!  └─ DeviceSupervisor::run()
//!       └─ SignalingSession (one at a time)
//!            ├─ Paired   → start screen capture, announce stream URL
//!            └─ Command  → CommandDispatcher → LoggingInjector / CaptureSwitch
//! ```
//!
//! # Usage
//!
//! ```text
//! mirror-device [OPTIONS]
//!
//! Options:
//!   --config <PATH>            TOML config file [default: mirror-device.toml]
//!   --rendezvous-url <URL>     ws:// or wss:// rendezvous server
//!   --screen-port <PORT>       Screen stream port
//!   --camera-port <PORT>       Camera stream port
//!   --screen-dir <DIR>         JPEG frames replayed as the screen
//!   --camera-dir <DIR>         JPEG frames replayed as the camera
//!   --advertise-host <IP>      Address put into announced stream URLs
//!   --preserve-code            Re-register the same code after a disconnect
//! ```
//!
//! Flags override the config file; anything not given keeps the file's value
//! (or its default).

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mirror_core::{CodePolicy, FrameBuffer};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirror_device::application::frame_relay::FrameRelay;
use mirror_device::infrastructure::capture::CaptureSwitch;
use mirror_device::infrastructure::input_injection::logging::LoggingInjector;
use mirror_device::infrastructure::storage::config::{load_config, DeviceConfig};
use mirror_device::infrastructure::stream_server::StreamServer;
use mirror_device::infrastructure::supervisor::{DeviceSupervisor, SupervisorConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote Mirror device agent.
#[derive(Debug, Parser)]
#[command(
    name = "mirror-device",
    about = "Streams this device's screen to a paired viewer and executes its commands",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.  A missing file means defaults.
    #[arg(long, default_value = "mirror-device.toml", env = "MIRROR_CONFIG")]
    config: PathBuf,

    /// Rendezvous server URL (`ws://` or `wss://`).
    #[arg(long, env = "MIRROR_RENDEZVOUS_URL")]
    rendezvous_url: Option<String>,

    /// TCP port of the screen stream server.
    #[arg(long, env = "MIRROR_SCREEN_PORT")]
    screen_port: Option<u16>,

    /// TCP port of the camera stream server.
    #[arg(long, env = "MIRROR_CAMERA_PORT")]
    camera_port: Option<u16>,

    /// Directory of JPEG files replayed as the screen source.
    #[arg(long, env = "MIRROR_SCREEN_DIR")]
    screen_dir: Option<PathBuf>,

    /// Directory of JPEG files replayed as the camera source.
    #[arg(long, env = "MIRROR_CAMERA_DIR")]
    camera_dir: Option<PathBuf>,

    /// IP address announced in stream URLs instead of the detected one.
    #[arg(long, env = "MIRROR_ADVERTISE_HOST")]
    advertise_host: Option<IpAddr>,

    /// Keep the same session code across reconnects.
    #[arg(long, env = "MIRROR_PRESERVE_CODE")]
    preserve_code: bool,
}

impl Cli {
    /// Loads the config file and applies every flag that was given.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    fn into_device_config(self) -> anyhow::Result<DeviceConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("loading config from {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(self, config: &mut DeviceConfig) {
        if let Some(url) = self.rendezvous_url {
            config.signaling.rendezvous_url = url;
        }
        if let Some(port) = self.screen_port {
            config.stream.screen_port = port;
        }
        if let Some(port) = self.camera_port {
            config.stream.camera_port = port;
        }
        if let Some(dir) = self.screen_dir {
            config.capture.screen_dir = Some(dir);
        }
        if let Some(dir) = self.camera_dir {
            config.capture.camera_dir = Some(dir);
        }
        if let Some(host) = self.advertise_host {
            config.stream.advertise_host = Some(host);
        }
        if self.preserve_code {
            config.signaling.code_policy = CodePolicy::Preserve;
        }
    }
}

fn supervisor_config(config: &DeviceConfig) -> SupervisorConfig {
    SupervisorConfig {
        signaling: config.signaling.to_signaling_config(),
        code_policy: config.signaling.code_policy,
        reconnect_delay: config.signaling.reconnect_delay(),
        screen_port: config.stream.screen_port,
        camera_port: config.stream.camera_port,
        advertise_host: config.stream.advertise_host,
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_device_config()?;

    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Remote Mirror device starting, rendezvous={}",
        config.signaling.rendezvous_url
    );

    // ── Frame pipeline ────────────────────────────────────────────────────────
    let screen_relay = Arc::new(FrameRelay::new("screen", FrameBuffer::new()));
    let camera_relay = Arc::new(FrameRelay::new("camera", FrameBuffer::new()));

    let options = config.stream.to_stream_options();
    let screen_addr = config.stream.screen_addr()?;
    let camera_addr = config.stream.camera_addr()?;

    let screen_server = StreamServer::start(
        "screen",
        screen_addr,
        screen_relay.buffer().clone(),
        options.clone(),
    )
    .await
    .context("starting screen stream server")?;
    let camera_server = StreamServer::start(
        "camera",
        camera_addr,
        camera_relay.buffer().clone(),
        options,
    )
    .await
    .context("starting camera stream server")?;

    // ── Capabilities ──────────────────────────────────────────────────────────
    let capture = Arc::new(CaptureSwitch::new(
        config.capture.screen_dir.clone(),
        config.capture.camera_dir.clone(),
        config.capture.fps,
        Arc::clone(&screen_relay),
        Arc::clone(&camera_relay),
    ));
    let supervisor = DeviceSupervisor::new(
        supervisor_config(&config),
        screen_relay,
        camera_relay,
        capture,
        Arc::new(LoggingInjector::new()),
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("failed to listen for Ctrl-C: {e}");
                // Keep the sender alive so the supervisor is not stopped.
                std::future::pending::<()>().await;
            }
        }
    });

    info!("Remote Mirror device ready.  Press Ctrl-C to exit.");
    supervisor.run(shutdown_rx).await;

    screen_server.stop();
    camera_server.stop();
    info!("Remote Mirror device stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["mirror-device"]);

        // Assert
        assert_eq!(cli.config, PathBuf::from("mirror-device.toml"));
        assert!(cli.rendezvous_url.is_none());
        assert!(!cli.preserve_code);
    }

    #[test]
    fn test_cli_flags_override_config() {
        // Arrange
        let cli = Cli::parse_from([
            "mirror-device",
            "--rendezvous-url",
            "ws://127.0.0.1:8765",
            "--screen-port",
            "9080",
            "--camera-port",
            "9081",
            "--screen-dir",
            "/frames/screen",
            "--advertise-host",
            "192.168.1.5",
            "--preserve-code",
        ]);
        let mut config = DeviceConfig::default();

        // Act
        cli.apply_overrides(&mut config);

        // Assert
        assert_eq!(config.signaling.rendezvous_url, "ws://127.0.0.1:8765");
        assert_eq!(config.stream.screen_port, 9080);
        assert_eq!(config.stream.camera_port, 9081);
        assert_eq!(config.capture.screen_dir, Some(PathBuf::from("/frames/screen")));
        assert_eq!(config.capture.camera_dir, None);
        assert_eq!(
            config.stream.advertise_host,
            Some("192.168.1.5".parse().unwrap())
        );
        assert_eq!(config.signaling.code_policy, CodePolicy::Preserve);
    }

    #[test]
    fn test_absent_flags_keep_file_values() {
        let cli = Cli::parse_from(["mirror-device"]);
        let mut config = DeviceConfig::default();
        config.stream.screen_port = 7000;

        cli.apply_overrides(&mut config);

        assert_eq!(config.stream.screen_port, 7000);
        assert_eq!(config.signaling.code_policy, CodePolicy::Regenerate);
    }

    #[test]
    fn test_into_device_config_with_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cli = Cli::parse_from(["mirror-device", "--config", path.to_str().unwrap()]);

        let config = cli.into_device_config().unwrap();

        assert_eq!(config.stream.screen_port, 8080);
    }

    #[test]
    fn test_into_device_config_with_bad_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.toml");
        std::fs::write(&path, "[[[ nope").unwrap();
        let cli = Cli::parse_from(["mirror-device", "--config", path.to_str().unwrap()]);

        assert!(cli.into_device_config().is_err());
    }

    #[test]
    fn test_supervisor_config_from_device_config() {
        let mut config = DeviceConfig::default();
        config.signaling.reconnect_delay_secs = 7;

        let sup = supervisor_config(&config);

        assert_eq!(sup.reconnect_delay, Duration::from_secs(7));
        assert_eq!(sup.screen_port, 8080);
        assert_eq!(sup.camera_port, 8081);
    }
}
