//! Pause, continue and stop against the receiver.

use std::time::{Duration, Instant};

use undertow_core::SessionOrchestrator;
use undertow_core::receiver::test_mocks::{MockReceiver, ReceiverCommand};

use crate::common::Fixture;

const SETTLE: Duration = Duration::from_millis(300);

fn orchestrator(fixture: &mut Fixture) -> SessionOrchestrator<MockReceiver> {
    fixture.config.timing.settle_delay = SETTLE;
    SessionOrchestrator::new(fixture.config.clone(), fixture.receiver.clone())
}

#[tokio::test]
async fn test_pause_and_continue_wait_for_settle() {
    let mut fixture = Fixture::new();
    let orchestrator = orchestrator(&mut fixture);

    let started = Instant::now();
    orchestrator.pause().await.unwrap();
    assert!(started.elapsed() >= SETTLE);

    let started = Instant::now();
    orchestrator.resume().await.unwrap();
    assert!(started.elapsed() >= SETTLE);

    assert_eq!(
        fixture.receiver.commands(),
        vec![ReceiverCommand::Pause, ReceiverCommand::Resume]
    );
    assert_eq!(fixture.receiver.device_requests(), 2);
}

#[tokio::test]
async fn test_stop_quits_app_after_settle() {
    let mut fixture = Fixture::new();
    let orchestrator = orchestrator(&mut fixture);

    orchestrator.stop().await.unwrap();

    let timed = fixture.receiver.timed_commands();
    let commands: Vec<_> = timed.iter().map(|(command, _)| command.clone()).collect();
    assert_eq!(commands, vec![ReceiverCommand::Stop, ReceiverCommand::QuitApp]);
    assert!(timed[1].1.duration_since(timed[0].1) >= SETTLE);
}
