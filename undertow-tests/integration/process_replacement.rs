//! A new play session replaces the one recorded in the PID file.

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Stdio};
use std::time::Duration;

use undertow_core::SessionOrchestrator;

use crate::common::Fixture;

const SIGTERM: i32 = 15;

#[tokio::test]
async fn test_previous_server_is_terminated_and_replaced() {
    let fixture = Fixture::new();
    let file = fixture.media_file("clip.mp4", 64);
    let mut previous = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .spawn()
        .unwrap();
    std::fs::write(&fixture.config.paths.pid_file, previous.id().to_string()).unwrap();
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());

    let _session = orchestrator.play(&file, None).await.unwrap();

    let status = tokio::task::spawn_blocking(move || previous.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.signal(), Some(SIGTERM));
    assert_eq!(
        std::fs::read_to_string(&fixture.config.paths.pid_file).unwrap(),
        std::process::id().to_string()
    );
}

#[tokio::test]
async fn test_stale_record_is_overwritten() {
    let fixture = Fixture::new();
    let file = fixture.media_file("clip.mp4", 64);
    // Far above any default pid_max
    std::fs::write(&fixture.config.paths.pid_file, "999999999").unwrap();
    let orchestrator = SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone());

    let session = tokio::time::timeout(Duration::from_secs(5), orchestrator.play(&file, None))
        .await
        .unwrap();

    assert!(session.is_ok());
    assert_eq!(
        std::fs::read_to_string(&fixture.config.paths.pid_file).unwrap(),
        std::process::id().to_string()
    );
}
