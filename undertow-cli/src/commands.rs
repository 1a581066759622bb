//! CLI command implementations

use std::path::PathBuf;

use clap::Subcommand;
use undertow_core::receiver::CattProvider;
use undertow_core::{Backend, Result, SessionOrchestrator, UndertowConfig};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Stream a media file to the receiver
    Play {
        /// Transcode with ffmpeg (falls back to avconv)
        #[arg(long, conflicts_with = "avconv")]
        ffmpeg: bool,
        /// Transcode with avconv (falls back to ffmpeg)
        #[arg(long)]
        avconv: bool,
        /// Media file to play
        file: PathBuf,
    },
    /// Pause playback
    Pause,
    /// Continue paused playback
    Continue,
    /// Stop playback and quit the receiver app
    Stop,
    /// Persist the transcoder preset and video bitrate
    #[command(alias = "set_transcode_quality")]
    SetTranscodeQuality {
        /// Encoder preset, e.g. ultrafast or medium
        preset: String,
        /// Video bitrate, e.g. 2000k
        bitrate: String,
    },
    /// Restore the default transcode quality
    #[command(alias = "reset_transcode_quality")]
    ResetTranscodeQuality,
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of whichever command fails
pub async fn handle_command(command: Commands, config: UndertowConfig) -> Result<()> {
    let provider = CattProvider::new(&config.receiver);
    let orchestrator = SessionOrchestrator::new(config, provider);

    match command {
        Commands::Play {
            ffmpeg,
            avconv,
            file,
        } => play(&orchestrator, file, requested_backend(ffmpeg, avconv)).await,
        Commands::Pause => orchestrator.pause().await,
        Commands::Continue => orchestrator.resume().await,
        Commands::Stop => orchestrator.stop().await,
        Commands::SetTranscodeQuality { preset, bitrate } => {
            set_transcode_quality(&orchestrator, &preset, &bitrate).await
        }
        Commands::ResetTranscodeQuality => reset_transcode_quality(&orchestrator).await,
    }
}

fn requested_backend(ffmpeg: bool, avconv: bool) -> Option<Backend> {
    match (ffmpeg, avconv) {
        (true, _) => Some(Backend::Ffmpeg),
        (_, true) => Some(Backend::Avconv),
        _ => None,
    }
}

/// Serve `file` to the receiver and wait until it has been fetched
///
/// # Errors
/// - `UndertowError::FileNotFound` - File missing
/// - `UndertowError::TranscoderUnavailable` - Neither transcoder installed
/// - `UndertowError::Receiver` - No device or device command failed
/// - `UndertowError::Streaming` - Port unavailable or server failure
pub async fn play(
    orchestrator: &SessionOrchestrator<CattProvider>,
    file: PathBuf,
    transcoder: Option<Backend>,
) -> Result<()> {
    let session = orchestrator.play(&file, transcoder).await?;

    println!("Streaming {} ({})", session.file().display(), session.handler());
    println!("  {}", session.url());

    session.finished().await
}

/// Validate and persist a transcode quality
///
/// # Errors
/// - `UndertowError::Quality` - Unknown preset or malformed bitrate
pub async fn set_transcode_quality(
    orchestrator: &SessionOrchestrator<CattProvider>,
    preset: &str,
    bitrate: &str,
) -> Result<()> {
    let quality = orchestrator
        .quality_store()
        .save_raw(&preset.to_lowercase(), &bitrate.to_lowercase())
        .await?;

    println!(
        "Transcode quality: preset {}, bitrate {}",
        quality.preset, quality.bitrate
    );
    Ok(())
}

/// Restore the default transcode quality
///
/// # Errors
/// Never fails; write failures are logged
pub async fn reset_transcode_quality(
    orchestrator: &SessionOrchestrator<CattProvider>,
) -> Result<()> {
    let quality = orchestrator.quality_store().reset().await;

    println!(
        "Transcode quality reset: preset {}, bitrate {}",
        quality.preset, quality.bitrate
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    fn parse(args: &[&str]) -> std::result::Result<Commands, clap::Error> {
        TestCli::try_parse_from(std::iter::once("undertow").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn test_play_flags() {
        let Commands::Play {
            ffmpeg,
            avconv,
            file,
        } = parse(&["play", "--avconv", "a.mkv"]).unwrap()
        else {
            panic!("expected play");
        };
        assert!(!ffmpeg && avconv);
        assert_eq!(file, PathBuf::from("a.mkv"));
        assert_eq!(requested_backend(ffmpeg, avconv), Some(Backend::Avconv));
        assert_eq!(requested_backend(false, false), None);

        assert!(parse(&["play", "--ffmpeg", "--avconv", "a.mkv"]).is_err());
        assert!(parse(&["play"]).is_err());
    }

    #[test]
    fn test_underscore_aliases() {
        assert!(matches!(
            parse(&["set_transcode_quality", "fast", "3000k"]),
            Ok(Commands::SetTranscodeQuality { .. })
        ));
        assert!(matches!(
            parse(&["reset_transcode_quality"]),
            Ok(Commands::ResetTranscodeQuality)
        ));
        assert!(matches!(parse(&["continue"]), Ok(Commands::Continue)));
    }

    #[tokio::test]
    async fn test_quality_arguments_are_lowercased() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = UndertowConfig::for_testing(dir.path());
        let provider = CattProvider::new(&config.receiver);
        let orchestrator = SessionOrchestrator::new(config, provider);

        set_transcode_quality(&orchestrator, "FAST", "3000K")
            .await
            .unwrap();

        let stored = orchestrator.quality_store().load().await;
        assert_eq!(stored.preset.as_str(), "fast");
        assert_eq!(stored.bitrate.as_str(), "3000k");
    }
}
