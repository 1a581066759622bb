//! Undertow Core - single-shot media streaming for cast receivers
//!
//! This crate provides the building blocks for handing a local media file to
//! a networked playback receiver: a one-request HTTP streaming server, the
//! realtime transcoder adapter, the PID-file process guard, the persisted
//! transcode quality store and the session orchestration tying them together.

pub mod config;
pub mod process_guard;
pub mod quality;
pub mod receiver;
pub mod session;
pub mod streaming;
pub mod tracing_setup;
pub mod transcoder;

use std::path::PathBuf;

// Re-export main types for convenient access
pub use config::UndertowConfig;
pub use process_guard::ProcessGuard;
pub use quality::{Bitrate, Preset, QualityError, QualityStore, TranscodeQuality};
pub use receiver::{CattReceiver, Receiver, ReceiverError, ReceiverProvider};
pub use session::{PlaybackSession, SessionOrchestrator, SessionState};
pub use streaming::{StreamHandler, StreamingError, StreamingServer};
pub use transcoder::{Backend, TranscodeCommand, TranscoderError};

/// Errors that can bubble up from any Undertow subsystem.
///
/// Validation failures (missing source, bad quality values, no transcoder)
/// are raised before any side effect that would be hard to undo.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Media file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Quality error: {0}")]
    Quality(#[from] QualityError),

    #[error("Unable to find {requested} (or {fallback})")]
    TranscoderUnavailable { requested: Backend, fallback: Backend },

    #[error("Transcoder error: {0}")]
    Transcoder(#[from] TranscoderError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Receiver error: {0}")]
    Receiver(#[from] ReceiverError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UndertowError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            UndertowError::FileNotFound { .. } => "media file not found".to_string(),
            UndertowError::Quality(QualityError::InvalidPreset { .. }) => format!(
                "preset value must be one of: {}",
                Preset::ALL
                    .iter()
                    .map(|preset| preset.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            UndertowError::Quality(QualityError::InvalidBitrate { .. }) => {
                "bitrate must be an integer value optionally ending with k or m. For example: 2000k"
                    .to_string()
            }
            UndertowError::TranscoderUnavailable {
                requested,
                fallback,
            } => format!("unable to find {requested} (or {fallback})"),
            UndertowError::Transcoder(_) => "Transcoder error occurred".to_string(),
            UndertowError::Streaming(_) => "Streaming error occurred".to_string(),
            UndertowError::Receiver(e) => format!("Cast receiver error: {e}"),
            UndertowError::Configuration { reason } => format!("Configuration error: {reason}"),
            UndertowError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            UndertowError::FileNotFound { .. }
                | UndertowError::Quality(_)
                | UndertowError::TranscoderUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_user_errors() {
        let missing = UndertowError::FileNotFound {
            path: PathBuf::from("/nope.mp4"),
        };
        assert!(missing.is_user_error());
        assert_eq!(missing.user_message(), "media file not found");

        let unavailable = UndertowError::TranscoderUnavailable {
            requested: Backend::Avconv,
            fallback: Backend::Ffmpeg,
        };
        assert!(unavailable.is_user_error());
        assert_eq!(unavailable.user_message(), "unable to find avconv (or ffmpeg)");

        let io = UndertowError::Io(std::io::Error::other("disk"));
        assert!(!io.is_user_error());
    }

    #[test]
    fn test_invalid_preset_message_lists_presets() {
        let error = UndertowError::Quality(QualityError::InvalidPreset {
            value: "turbo".to_string(),
        });
        let message = error.user_message();
        assert!(message.starts_with("preset value must be one of: ultrafast, superfast"));
        assert!(message.ends_with("veryslow, placebo"));
    }
}
