//! Persisted transcode quality, as the CLI quality commands use it.

use undertow_core::{Preset, QualityError, SessionOrchestrator, UndertowError};

use crate::common::Fixture;

#[tokio::test]
async fn test_set_then_reset_restores_defaults() {
    let fixture = Fixture::new();
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());
    let store = orchestrator.quality_store();

    store.save_raw("fast", "3000k").await.unwrap();
    let stored = store.load().await;
    assert_eq!(stored.preset, Preset::Fast);
    assert_eq!(stored.bitrate.as_str(), "3000k");

    store.reset().await;
    let stored = store.load().await;
    assert_eq!(stored.preset, Preset::Ultrafast);
    assert_eq!(stored.bitrate.as_str(), "2000k");
    assert_eq!(
        std::fs::read_to_string(&fixture.config.paths.quality_file).unwrap(),
        "ffmpeg_preset:ultrafast\nffmpeg_bitrate:2000k\n"
    );
}

#[tokio::test]
async fn test_invalid_values_leave_file_untouched() {
    let fixture = Fixture::new();
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());
    let store = orchestrator.quality_store();
    store.save_raw("slow", "900k").await.unwrap();
    let before = std::fs::read_to_string(&fixture.config.paths.quality_file).unwrap();

    let preset_error = store.save_raw("warp", "900k").await.unwrap_err();
    let bitrate_error = store.save_raw("slow", "9.5m").await.unwrap_err();

    assert!(matches!(preset_error, QualityError::InvalidPreset { .. }));
    assert!(matches!(bitrate_error, QualityError::InvalidBitrate { .. }));
    assert!(UndertowError::from(preset_error).is_user_error());
    assert_eq!(
        std::fs::read_to_string(&fixture.config.paths.quality_file).unwrap(),
        before
    );
}

#[tokio::test]
async fn test_missing_file_yields_defaults() {
    let fixture = Fixture::new();
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());

    let stored = orchestrator.quality_store().load().await;

    assert_eq!(stored, Default::default());
}
