//! Transcoded playback with a scripted encoder.

use std::time::{Duration, Instant};

use undertow_core::{
    Backend, Preset, SessionOrchestrator, StreamHandler, TranscodeQuality, UndertowError,
};

use crate::common::{Fixture, http_client, loaded_url};

/// Encoder stub: answers `-version`, records its arguments, then emits two
/// chunks with a pause in between.
fn slow_encoder(fixture: &Fixture, name: &str) -> std::path::PathBuf {
    let args_log = fixture.path("encoder-args.log");
    fixture.script(
        name,
        &format!(
            "[ \"$1\" = \"-version\" ] && exit 0\n\
             printf '%s|' \"$@\" > '{}'\n\
             printf 'first-chunk'\n\
             sleep 2\n\
             printf 'second-chunk'",
            args_log.display()
        ),
    )
}

#[tokio::test]
async fn test_transcoded_bytes_arrive_before_encoder_exits() {
    let mut fixture = Fixture::new();
    fixture.config.transcoder.ffmpeg_program = slow_encoder(&fixture, "ffmpeg");
    let file = fixture.media_file("clip.avi", 16);
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());

    let session = orchestrator.play(&file, Some(Backend::Ffmpeg)).await.unwrap();
    assert_eq!(session.handler(), StreamHandler::Transcode(Backend::Ffmpeg));

    let started = Instant::now();
    let mut response = http_client()
        .get(loaded_url(&fixture.receiver))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "video/mp4");

    let first = response.chunk().await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert!(b"first-chunk".starts_with(&first));

    let mut body = first.to_vec();
    while let Some(chunk) = response.chunk().await.unwrap() {
        body.extend_from_slice(&chunk);
    }
    assert_eq!(body, b"first-chunksecond-chunk");

    tokio::time::timeout(Duration::from_secs(5), session.finished())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_stored_quality_reaches_encoder() {
    let mut fixture = Fixture::new();
    fixture.config.transcoder.avconv_program = slow_encoder(&fixture, "avconv");
    let file = fixture.media_file("clip.mpg", 16);
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());
    orchestrator
        .quality_store()
        .save(&TranscodeQuality {
            preset: Preset::Veryfast,
            bitrate: "1500k".parse().unwrap(),
        })
        .await;

    let _session = orchestrator.play(&file, Some(Backend::Avconv)).await.unwrap();
    let body = http_client()
        .get(loaded_url(&fixture.receiver))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&body[..], b"first-chunksecond-chunk");

    let args = std::fs::read_to_string(fixture.path("encoder-args.log")).unwrap();
    let canonical = std::fs::canonicalize(&file).unwrap();
    assert_eq!(
        args,
        format!(
            "-i|{}|-preset|veryfast|-c:a|aac|-f|mp4|-frag_duration|3600|-b:v|1500k|-strict|experimental|-|",
            canonical.display()
        )
    );
}

#[tokio::test]
async fn test_requested_transcoder_falls_back() {
    let mut fixture = Fixture::new();
    fixture.config.transcoder.ffmpeg_program = fixture.path("missing-ffmpeg");
    fixture.config.transcoder.avconv_program = slow_encoder(&fixture, "avconv");
    let file = fixture.media_file("clip.mpg", 16);
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());

    let session = orchestrator.play(&file, Some(Backend::Ffmpeg)).await.unwrap();

    assert_eq!(session.handler(), StreamHandler::Transcode(Backend::Avconv));
}

#[tokio::test]
async fn test_no_transcoder_fails_before_receiver_is_used() {
    let mut fixture = Fixture::new();
    fixture.config.transcoder.ffmpeg_program = fixture.path("missing-ffmpeg");
    fixture.config.transcoder.avconv_program = fixture.path("missing-avconv");
    let file = fixture.media_file("clip.mpg", 16);
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());

    let error = orchestrator
        .play(&file, Some(Backend::Avconv))
        .await
        .unwrap_err();

    assert!(matches!(error, UndertowError::TranscoderUnavailable { .. }));
    assert_eq!(error.user_message(), "unable to find avconv (or ffmpeg)");
    assert!(fixture.receiver.commands().is_empty());
}
