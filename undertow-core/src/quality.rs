//! Persisted transcoder quality settings.
//!
//! The backing file holds one `key:value` pair per line. Only the
//! `ffmpeg_preset` and `ffmpeg_bitrate` keys are recognized; anything else is
//! ignored on load and dropped on the next save. Loading never fails, saving
//! validates before touching the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// File key for the encoder speed/quality preset.
pub const PRESET_KEY: &str = "ffmpeg_preset";

/// File key for the target video bitrate.
pub const BITRATE_KEY: &str = "ffmpeg_bitrate";

static BITRATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+[km]?$").unwrap_or_else(|e| unreachable!("bitrate pattern: {e}"))
});

/// Errors raised when persisting quality settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QualityError {
    #[error("unknown preset '{value}'")]
    InvalidPreset { value: String },

    #[error("malformed bitrate '{value}'")]
    InvalidBitrate { value: String },
}

/// Encoder speed/quality trade-off, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Preset {
    #[default]
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
    Placebo,
}

impl Preset {
    /// Every accepted preset in the order encoders document them.
    pub const ALL: [Preset; 10] = [
        Preset::Ultrafast,
        Preset::Superfast,
        Preset::Veryfast,
        Preset::Faster,
        Preset::Fast,
        Preset::Medium,
        Preset::Slow,
        Preset::Slower,
        Preset::Veryslow,
        Preset::Placebo,
    ];

    /// Name passed to the encoder's `-preset` flag.
    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Ultrafast => "ultrafast",
            Preset::Superfast => "superfast",
            Preset::Veryfast => "veryfast",
            Preset::Faster => "faster",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Slower => "slower",
            Preset::Veryslow => "veryslow",
            Preset::Placebo => "placebo",
        }
    }
}

impl FromStr for Preset {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.as_str() == s)
            .ok_or_else(|| QualityError::InvalidPreset {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target video bitrate, digits with an optional `k` or `m` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bitrate(String);

impl Bitrate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Self("2000k".to_string())
    }
}

impl FromStr for Bitrate {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if BITRATE_PATTERN.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(QualityError::InvalidBitrate {
                value: s.to_string(),
            })
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quality settings handed to the transcoder command template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranscodeQuality {
    pub preset: Preset,
    pub bitrate: Bitrate,
}

impl TranscodeQuality {
    /// Validates raw preset and bitrate strings.
    ///
    /// # Errors
    ///
    /// - `QualityError::InvalidPreset` - Preset is not one of `Preset::ALL`
    /// - `QualityError::InvalidBitrate` - Bitrate does not match `[0-9]+[km]?`
    pub fn parse(preset: &str, bitrate: &str) -> Result<Self, QualityError> {
        Ok(Self {
            preset: preset.parse()?,
            bitrate: bitrate.parse()?,
        })
    }

    /// Serializes to the `key:value` file format.
    fn to_file_contents(&self) -> String {
        format!(
            "{PRESET_KEY}:{}\n{BITRATE_KEY}:{}\n",
            self.preset, self.bitrate
        )
    }

    /// Applies every recognized line of `contents` over the defaults.
    fn from_file_contents(contents: &str) -> Self {
        let mut quality = Self::default();

        for line in contents.lines().filter(|line| !line.trim().is_empty()) {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim());

            match name {
                PRESET_KEY => match value.parse() {
                    Ok(preset) => quality.preset = preset,
                    Err(e) => warn!("Ignoring stored {PRESET_KEY}: {e}"),
                },
                BITRATE_KEY => match value.parse() {
                    Ok(bitrate) => quality.bitrate = bitrate,
                    Err(e) => warn!("Ignoring stored {BITRATE_KEY}: {e}"),
                },
                _ => debug!("Ignoring unknown quality key: {name}"),
            }
        }

        quality
    }
}

/// File-backed store for `TranscodeQuality`.
#[derive(Debug, Clone)]
pub struct QualityStore {
    path: PathBuf,
}

impl QualityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored quality, falling back to defaults on any I/O failure.
    pub async fn load(&self) -> TranscodeQuality {
        debug!("Loading transcode quality from {}", self.path.display());

        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => TranscodeQuality::from_file_contents(&contents),
            Err(e) => {
                info!(
                    "Unable to load transcode quality from {} ({e}), using defaults",
                    self.path.display()
                );
                TranscodeQuality::default()
            }
        }
    }

    /// Overwrites the file with `quality`.
    ///
    /// Write failures are logged and otherwise ignored.
    pub async fn save(&self, quality: &TranscodeQuality) {
        match tokio::fs::write(&self.path, quality.to_file_contents()).await {
            Ok(()) => info!(
                "Saved transcode quality {} {} to {}",
                quality.preset,
                quality.bitrate,
                self.path.display()
            ),
            Err(e) => warn!(
                "Unable to save transcode quality to {}: {e}",
                self.path.display()
            ),
        }
    }

    /// Validates raw values and persists them.
    ///
    /// Nothing is written unless both values are valid.
    ///
    /// # Errors
    ///
    /// - `QualityError::InvalidPreset` - Unknown preset name
    /// - `QualityError::InvalidBitrate` - Malformed bitrate
    pub async fn save_raw(
        &self,
        preset: &str,
        bitrate: &str,
    ) -> Result<TranscodeQuality, QualityError> {
        let quality = TranscodeQuality::parse(preset, bitrate)?;
        self.save(&quality).await;
        Ok(quality)
    }

    /// Persists the default quality.
    pub async fn reset(&self) -> TranscodeQuality {
        let quality = TranscodeQuality::default();
        self.save(&quality).await;
        quality
    }
}
