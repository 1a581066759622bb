//! Untranscoded playback through the real server.

use std::time::Duration;

use undertow_core::receiver::test_mocks::{MockReceiver, ReceiverCommand};
use undertow_core::{SessionOrchestrator, SessionState, StreamHandler, UndertowError};

use crate::common::{Fixture, http_client, loaded_url};

#[tokio::test]
async fn test_receiver_fetches_identical_bytes() {
    let fixture = Fixture::new();
    let file = fixture.media_file("holiday clip.mp4", 300_001);
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());

    let session = orchestrator.play(&file, None).await.unwrap();
    assert_eq!(session.state(), SessionState::Serving);
    assert_eq!(session.handler(), StreamHandler::Direct);

    let url = loaded_url(&fixture.receiver);
    assert_eq!(url, session.url().as_str());
    assert!(url.starts_with(&format!("http://{}/", session.address())));
    assert!(url.ends_with("/holiday+clip.mp4"));

    let response = http_client().get(&url).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "video/mp4");
    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), 300_001);
    assert_eq!(&body[..], &std::fs::read(&file).unwrap()[..]);

    let address = session.address();
    tokio::time::timeout(Duration::from_secs(5), session.finished())
        .await
        .unwrap()
        .unwrap();
    assert!(tokio::net::TcpStream::connect(address).await.is_err());
}

#[tokio::test]
async fn test_head_check_does_not_consume_the_stream() {
    let fixture = Fixture::new();
    let file = fixture.media_file("clip.mp4", 40_000);
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());
    let session = orchestrator.play(&file, None).await.unwrap();
    let url = loaded_url(&fixture.receiver);
    let client = http_client();

    let head = client.head(&url).send().await.unwrap();
    assert_eq!(head.status(), 200);
    assert_eq!(head.headers()["content-type"], "video/mp4");

    let body = client.get(&url).send().await.unwrap().bytes().await.unwrap();
    assert_eq!(&body[..], &std::fs::read(&file).unwrap()[..]);

    tokio::time::timeout(Duration::from_secs(5), session.finished())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_load_media_advertises_mp4_for_any_source() {
    let fixture = Fixture::new();
    let file = fixture.media_file("episode.mkv", 64);
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());

    let _session = orchestrator.play(&file, None).await.unwrap();

    let commands = fixture.receiver.commands();
    assert!(matches!(
        &commands[..],
        [ReceiverCommand::LoadMedia { mime_type, .. }] if mime_type == "video/mp4"
    ));
}

#[tokio::test]
async fn test_busy_receiver_is_quit_before_loading() {
    let fixture = Fixture::new();
    let file = fixture.media_file("clip.mp4", 64);
    let receiver = MockReceiver::new_busy();
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), receiver.clone());

    let session = orchestrator.play(&file, None).await.unwrap();

    let commands = receiver.commands();
    assert_eq!(commands[0], ReceiverCommand::QuitApp);
    assert_eq!(
        commands[1],
        ReceiverCommand::LoadMedia {
            url: session.url().to_string(),
            mime_type: "video/mp4".to_string(),
        }
    );
}

#[tokio::test]
async fn test_missing_file_is_rejected_without_side_effects() {
    let fixture = Fixture::new();
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());

    let error = orchestrator
        .play(&fixture.path("nope.mp4"), None)
        .await
        .unwrap_err();

    assert!(matches!(error, UndertowError::FileNotFound { .. }));
    assert_eq!(error.user_message(), "media file not found");
    assert!(!fixture.config.paths.pid_file.exists());
    assert!(fixture.receiver.commands().is_empty());
}
