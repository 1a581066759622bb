//! Realtime transcoding through an external encoder process.
//!
//! Two interchangeable backends are supported, ffmpeg and avconv. Each reads
//! the source file itself and writes fragmented MP4 to stdout, which is
//! exposed as a lazy byte stream. Bytes become available as soon as the
//! encoder produces them; nothing waits for the process to finish.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use bytes::Bytes;
use futures::{Stream, stream};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::TranscoderConfig;
use crate::quality::TranscodeQuality;

/// Size of each read from the encoder's stdout.
const READ_BUFFER_SIZE: usize = 8192;

/// Fragment duration passed to the MP4 muxer, in microseconds.
const FRAG_DURATION: &str = "3600";

/// Incremental output of a running encoder.
pub type TranscodeStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Errors from launching an encoder.
#[derive(Debug, Error)]
pub enum TranscoderError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} did not expose a stdout pipe")]
    MissingStdout { program: String },
}

/// External encoder program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Ffmpeg,
    Avconv,
}

impl Backend {
    /// The other backend, tried when this one is not installed.
    pub fn fallback(self) -> Backend {
        match self {
            Backend::Ffmpeg => Backend::Avconv,
            Backend::Avconv => Backend::Ffmpeg,
        }
    }

    /// Program launched for this backend.
    pub fn program(self, config: &TranscoderConfig) -> &Path {
        match self {
            Backend::Ffmpeg => &config.ffmpeg_program,
            Backend::Avconv => &config.avconv_program,
        }
    }

    /// Output flags following `-i <input>`.
    fn output_args(self, quality: &TranscodeQuality) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-preset".into(),
            quality.preset.to_string(),
            "-c:a".into(),
        ];

        match self {
            Backend::Ffmpeg => args.push("libfdk_aac".into()),
            Backend::Avconv => args.push("aac".into()),
        }

        args.extend([
            "-f".into(),
            "mp4".into(),
            "-frag_duration".into(),
            FRAG_DURATION.into(),
            "-b:v".into(),
            quality.bitrate.to_string(),
        ]);

        if self == Backend::Avconv {
            args.extend(["-strict".into(), "experimental".into()]);
        }

        // Write to stdout
        args.push("-".into());
        args
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Ffmpeg => write!(f, "ffmpeg"),
            Backend::Avconv => write!(f, "avconv"),
        }
    }
}

/// A fully formatted encoder invocation.
///
/// Arguments are passed directly to the program without a shell. `Display`
/// renders the equivalent shell command line with the input path quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeCommand {
    program: PathBuf,
    input: PathBuf,
    output_args: Vec<String>,
}

impl TranscodeCommand {
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Full argument vector handed to the program.
    pub fn args(&self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(self.output_args.len() + 2);
        args.push(OsString::from("-i"));
        args.push(self.input.clone().into_os_string());
        args.extend(self.output_args.iter().map(OsString::from));
        args
    }
}

impl fmt::Display for TranscodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -i \"{}\" {}",
            self.program.display(),
            self.input.display(),
            self.output_args.join(" ")
        )
    }
}

/// Formats the backend's command template for `input` at `quality`.
pub fn build_command(
    backend: Backend,
    config: &TranscoderConfig,
    input: &Path,
    quality: &TranscodeQuality,
) -> TranscodeCommand {
    TranscodeCommand {
        program: backend.program(config).to_path_buf(),
        input: input.to_path_buf(),
        output_args: backend.output_args(quality),
    }
}

/// Checks whether `program` can be launched.
///
/// Runs `<program> -version`; only a launch failure counts as unavailable.
pub async fn is_available(program: &Path) -> bool {
    let probe = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match probe {
        Ok(_) => true,
        Err(e) => {
            debug!("{} is not available: {e}", program.display());
            false
        }
    }
}

/// Picks `requested` if installed, otherwise the other backend.
///
/// Returns `None` when neither can be launched.
pub async fn select_backend(requested: Backend, config: &TranscoderConfig) -> Option<Backend> {
    if is_available(requested.program(config)).await {
        return Some(requested);
    }

    let fallback = requested.fallback();
    if is_available(fallback.program(config)).await {
        warn!("Unable to find {requested} - using {fallback}");
        return Some(fallback);
    }

    None
}

/// Launches `command` and streams its stdout.
///
/// The child is killed if the stream is dropped early (client went away).
/// A non-zero exit just ends the stream; it is logged, not surfaced.
///
/// # Errors
///
/// - `TranscoderError::Launch` - Program could not be spawned
/// - `TranscoderError::MissingStdout` - Spawned without a stdout pipe
pub fn stream_output(command: &TranscodeCommand) -> Result<TranscodeStream, TranscoderError> {
    let program = command.program.display().to_string();
    info!("Transcoder command: {command}");

    let mut child = Command::new(&command.program)
        .args(command.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TranscoderError::Launch {
            program: program.clone(),
            source,
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TranscoderError::MissingStdout {
            program: program.clone(),
        })?;

    if let Some(stderr) = child.stderr.take() {
        spawn_stderr_forwarder(program.clone(), stderr);
    }

    let relay = Relay {
        program,
        child,
        stdout,
    };

    Ok(Box::pin(stream::unfold(Some(relay), |relay| async move {
        let mut relay = relay?;
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        match relay.stdout.read(&mut buffer).await {
            Ok(0) => {
                relay.reap().await;
                None
            }
            Ok(n) => {
                buffer.truncate(n);
                Some((Ok(Bytes::from(buffer)), Some(relay)))
            }
            Err(e) => {
                warn!("Reading {} output failed: {e}", relay.program);
                Some((Err(e), None))
            }
        }
    })))
}

/// Running encoder whose stdout is being relayed.
struct Relay {
    program: String,
    child: Child,
    stdout: ChildStdout,
}

impl Relay {
    async fn reap(mut self) {
        match self.child.wait().await {
            Ok(status) if status.success() => info!("{} finished", self.program),
            Ok(status) => warn!("{} exited with {status}", self.program),
            Err(e) => warn!("Failed to wait for {}: {e}", self.program),
        }
    }
}

/// Drains stderr into the log so a chatty encoder never blocks on a full pipe.
fn spawn_stderr_forwarder(program: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                debug!("{program}: {}", line.trim());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, Instant};

    use futures::StreamExt;
    use tempfile::TempDir;

    use super::*;
    use crate::quality::{Bitrate, Preset};

    fn write_stub(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn quality(preset: Preset, bitrate: &str) -> TranscodeQuality {
        TranscodeQuality {
            preset,
            bitrate: bitrate.parse::<Bitrate>().unwrap(),
        }
    }

    #[test]
    fn test_ffmpeg_command_template() {
        let command = build_command(
            Backend::Ffmpeg,
            &TranscoderConfig::default(),
            Path::new("/media/my clip.avi"),
            &quality(Preset::Fast, "3000k"),
        );

        assert_eq!(
            command.to_string(),
            "ffmpeg -i \"/media/my clip.avi\" -preset fast -c:a libfdk_aac -f mp4 \
             -frag_duration 3600 -b:v 3000k -"
        );
        assert_eq!(command.args()[1], OsString::from("/media/my clip.avi"));
    }

    #[test]
    fn test_avconv_command_template() {
        let command = build_command(
            Backend::Avconv,
            &TranscoderConfig::default(),
            Path::new("/media/clip.mpg"),
            &TranscodeQuality::default(),
        );

        assert_eq!(
            command.to_string(),
            "avconv -i \"/media/clip.mpg\" -preset ultrafast -c:a aac -f mp4 \
             -frag_duration 3600 -b:v 2000k -strict experimental -"
        );
    }

    #[test]
    fn test_fallback_is_the_other_backend() {
        assert_eq!(Backend::Ffmpeg.fallback(), Backend::Avconv);
        assert_eq!(Backend::Avconv.fallback(), Backend::Ffmpeg);
    }

    #[tokio::test]
    async fn test_availability_probe() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(&dir, "encoder", "exit 1");

        // Non-zero exit still means installed
        assert!(is_available(&stub).await);
        assert!(!is_available(&dir.path().join("not-installed")).await);
    }

    #[tokio::test]
    async fn test_select_backend_falls_back() {
        let dir = TempDir::new().unwrap();
        let avconv = write_stub(&dir, "avconv", "exit 0");
        let config = TranscoderConfig {
            ffmpeg_program: dir.path().join("missing-ffmpeg"),
            avconv_program: avconv,
        };

        assert_eq!(select_backend(Backend::Ffmpeg, &config).await, Some(Backend::Avconv));
        assert_eq!(select_backend(Backend::Avconv, &config).await, Some(Backend::Avconv));

        let nothing = TranscoderConfig {
            ffmpeg_program: dir.path().join("missing-ffmpeg"),
            avconv_program: dir.path().join("missing-avconv"),
        };
        assert_eq!(select_backend(Backend::Avconv, &nothing).await, None);
    }

    #[tokio::test]
    async fn test_output_streams_before_process_exits() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(&dir, "ffmpeg", "printf first\nsleep 2\nprintf second");
        let config = TranscoderConfig {
            ffmpeg_program: stub,
            ..TranscoderConfig::default()
        };
        let command = build_command(
            Backend::Ffmpeg,
            &config,
            Path::new("/media/clip.mpg"),
            &TranscodeQuality::default(),
        );

        let started = Instant::now();
        let mut output = stream_output(&command).unwrap();

        let first = output.next().await.unwrap().unwrap();
        let first_arrival = started.elapsed();
        assert_eq!(&first[..], b"first");
        assert!(first_arrival < Duration::from_millis(1500));

        let mut rest = Vec::new();
        while let Some(chunk) = output.next().await {
            rest.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(rest, b"second");
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failing_encoder_just_ends_stream() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(&dir, "ffmpeg", "printf partial\nexit 3");
        let config = TranscoderConfig {
            ffmpeg_program: stub,
            ..TranscoderConfig::default()
        };
        let command = build_command(
            Backend::Ffmpeg,
            &config,
            Path::new("/media/clip.mpg"),
            &TranscodeQuality::default(),
        );

        let chunks: Vec<_> = stream_output(&command).unwrap().collect().await;
        let body: Vec<u8> = chunks.into_iter().flat_map(|chunk| chunk.unwrap()).collect();

        assert_eq!(body, b"partial");
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let config = TranscoderConfig {
            ffmpeg_program: PathBuf::from("/nonexistent/ffmpeg"),
            ..TranscoderConfig::default()
        };
        let command = build_command(
            Backend::Ffmpeg,
            &config,
            Path::new("/media/clip.mpg"),
            &TranscodeQuality::default(),
        );

        assert!(matches!(
            stream_output(&command),
            Err(TranscoderError::Launch { .. })
        ));
    }
}
