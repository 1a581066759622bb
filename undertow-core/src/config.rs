//! Centralized configuration for Undertow.
//!
//! All tunable parameters and well-known paths are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Port the streaming server listens on unless overridden.
pub const DEFAULT_SERVER_PORT: u16 = 8020;

/// Content type advertised for every stream, transcoded or not.
pub const STREAM_CONTENT_TYPE: &str = "video/mp4";

/// Central configuration for all Undertow components.
///
/// Groups related settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub server: ServerConfig,
    pub paths: PathConfig,
    pub timing: TimingConfig,
    pub transcoder: TranscoderConfig,
    pub receiver: ReceiverConfig,
}

/// Streaming server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind on the local-facing address (0 picks an ephemeral port)
    pub port: u16,
    /// Content type sent with every response
    pub content_type: &'static str,
    /// Read size for direct file streaming
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            content_type: STREAM_CONTENT_TYPE,
            chunk_size: 64 * 1024, // 64 KiB
        }
    }
}

/// Locations of the file-backed stores.
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// PID file naming the currently streaming instance
    pub pid_file: PathBuf,
    /// Persisted transcode quality settings
    pub quality_file: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        Self {
            pid_file: PathBuf::from("/tmp/undertow.pid"),
            quality_file: home.join(".undertow"),
        }
    }
}

/// Delays used to let receiver-side state settle.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Pause after pause/continue/stop commands
    pub settle_delay: Duration,
    /// Pause after quitting a busy receiver's app before loading new media
    pub quit_grace: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(3),
            quit_grace: Duration::from_secs(5),
        }
    }
}

impl TimingConfig {
    /// Zero delays for deterministic tests.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            quit_grace: Duration::ZERO,
        }
    }
}

/// Transcoder program locations.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    /// Program launched for the ffmpeg backend
    pub ffmpeg_program: PathBuf,
    /// Program launched for the avconv backend
    pub avconv_program: PathBuf,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_program: PathBuf::from("ffmpeg"),
            avconv_program: PathBuf::from("avconv"),
        }
    }
}

/// Cast receiver control settings.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Program used to talk to cast devices
    pub catt_program: PathBuf,
    /// Device name or address; the first discovered device when unset
    pub device: Option<String>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            catt_program: PathBuf::from("catt"),
            device: None,
        }
    }
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("UNDERTOW_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            config.server.port = port;
        }

        if let Some(path) = std::env::var_os("UNDERTOW_PID_FILE") {
            config.paths.pid_file = PathBuf::from(path);
        }

        if let Some(path) = std::env::var_os("UNDERTOW_QUALITY_FILE") {
            config.paths.quality_file = PathBuf::from(path);
        }

        if let Ok(millis) = std::env::var("UNDERTOW_SETTLE_MS")
            && let Ok(millis) = millis.parse::<u64>()
        {
            config.timing.settle_delay = Duration::from_millis(millis);
        }

        if let Ok(millis) = std::env::var("UNDERTOW_QUIT_GRACE_MS")
            && let Ok(millis) = millis.parse::<u64>()
        {
            config.timing.quit_grace = Duration::from_millis(millis);
        }

        if let Some(program) = std::env::var_os("UNDERTOW_FFMPEG") {
            config.transcoder.ffmpeg_program = PathBuf::from(program);
        }

        if let Some(program) = std::env::var_os("UNDERTOW_AVCONV") {
            config.transcoder.avconv_program = PathBuf::from(program);
        }

        if let Ok(device) = std::env::var("UNDERTOW_DEVICE")
            && !device.trim().is_empty()
        {
            config.receiver.device = Some(device);
        }

        config
    }

    /// Creates a configuration rooted in a scratch directory for testing.
    ///
    /// Uses an ephemeral port and zero settle delays so tests neither
    /// collide with a real session nor sleep.
    pub fn for_testing(root: &std::path::Path) -> Self {
        Self {
            server: ServerConfig {
                port: 0,
                ..ServerConfig::default()
            },
            paths: PathConfig {
                pid_file: root.join("undertow.pid"),
                quality_file: root.join("undertow-quality"),
            },
            timing: TimingConfig::immediate(),
            transcoder: TranscoderConfig::default(),
            receiver: ReceiverConfig::default(),
        }
    }
}
