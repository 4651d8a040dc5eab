//! TOML configuration for the device process.
//!
//! # File layout (for beginners)
//!
//! ```toml
//! [signaling]
//! rendezvous_url = "wss://connect-your-phone.onrender.com"
//! code_policy = "regenerate"
//!
//! [stream]
//! screen_port = 8080
//! camera_port = 8081
//!
//! [capture]
//! screen_dir = "/var/lib/mirror/screen"
//! fps = 10
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every field has a serde default, so an empty file, a file with only some
//! sections, or no file at all all produce a working configuration.  Command
//! line flags are applied on top of whatever is loaded here.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mirror_core::CodePolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::signaling::{SignalingConfig, DEFAULT_RENDEZVOUS_URL};
use crate::infrastructure::stream_server::StreamOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field holds a value of the right type but an unusable content.
    #[error("invalid value {value:?} for {field}")]
    Invalid { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default)]
    pub signaling: SignalingSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Rendezvous connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalingSection {
    /// `ws://` or `wss://` URL of the rendezvous server.
    #[serde(default = "default_rendezvous_url")]
    pub rendezvous_url: String,
    /// Delay between pairing and the first stream announcement.
    #[serde(default = "default_pairing_grace_ms")]
    pub pairing_grace_ms: u64,
    /// WebSocket keepalive interval.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Pause before building a new session after a disconnect.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Whether a new session reuses the previous code.
    #[serde(default)]
    pub code_policy: CodePolicy,
}

/// HTTP stream server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSection {
    /// Address both stream servers bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_screen_port")]
    pub screen_port: u16,
    #[serde(default = "default_camera_port")]
    pub camera_port: u16,
    /// Pause between multipart parts on one connection.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_boundary")]
    pub boundary: String,
    /// Address announced to viewers.  Detected from the network interfaces
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_host: Option<IpAddr>,
}

/// Frame sources.  A source without a directory is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_dir: Option<PathBuf>,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_rendezvous_url() -> String {
    DEFAULT_RENDEZVOUS_URL.to_string()
}
fn default_pairing_grace_ms() -> u64 {
    500
}
fn default_ping_interval_secs() -> u64 {
    20
}
fn default_reconnect_delay_secs() -> u64 {
    3
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_screen_port() -> u16 {
    8080
}
fn default_camera_port() -> u16 {
    8081
}
fn default_frame_interval_ms() -> u64 {
    50
}
fn default_boundary() -> String {
    "mjpegframe".to_string()
}
fn default_fps() -> u32 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SignalingSection {
    fn default() -> Self {
        Self {
            rendezvous_url: default_rendezvous_url(),
            pairing_grace_ms: default_pairing_grace_ms(),
            ping_interval_secs: default_ping_interval_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            code_policy: CodePolicy::default(),
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            screen_port: default_screen_port(),
            camera_port: default_camera_port(),
            frame_interval_ms: default_frame_interval_ms(),
            boundary: default_boundary(),
            advertise_host: None,
        }
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            screen_dir: None,
            camera_dir: None,
            fps: default_fps(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl SignalingSection {
    /// Settings for one [`SignalingSession`](crate::infrastructure::signaling::SignalingSession).
    pub fn to_signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            rendezvous_url: self.rendezvous_url.clone(),
            pairing_grace: Duration::from_millis(self.pairing_grace_ms),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl StreamSection {
    pub fn to_stream_options(&self) -> StreamOptions {
        StreamOptions {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            boundary: self.boundary.clone(),
            ..StreamOptions::default()
        }
    }

    /// The parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_address` is not an IP address.
    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::Invalid {
                field: "stream.bind_address",
                value: self.bind_address.clone(),
            })
    }

    pub fn screen_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.screen_port))
    }

    pub fn camera_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.camera_port))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads the configuration at `path`, returning defaults if the file does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<DeviceConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeviceConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &DeviceConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
