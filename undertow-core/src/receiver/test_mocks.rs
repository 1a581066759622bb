//! Mock receiver for testing sessions without a cast device.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Receiver, ReceiverError, ReceiverProvider};

/// A command the mock receiver was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverCommand {
    QuitApp,
    LoadMedia { url: String, mime_type: String },
    Pause,
    Resume,
    Stop,
}

/// Receiver that records commands instead of talking to a device.
///
/// Clones share the same command log, so a test can keep one handle while
/// the session owns another.
#[derive(Debug, Clone)]
pub struct MockReceiver {
    local: IpAddr,
    idle: bool,
    commands: Arc<Mutex<Vec<(ReceiverCommand, Instant)>>>,
    device_requests: Arc<Mutex<usize>>,
}

impl MockReceiver {
    /// Creates an idle receiver reachable over loopback.
    pub fn new() -> Self {
        Self {
            local: IpAddr::V4(Ipv4Addr::LOCALHOST),
            idle: true,
            commands: Arc::new(Mutex::new(Vec::new())),
            device_requests: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates a receiver that reports an app already running.
    pub fn new_busy() -> Self {
        Self {
            idle: false,
            ..Self::new()
        }
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<ReceiverCommand> {
        self.commands
            .lock()
            .iter()
            .map(|(command, _)| command.clone())
            .collect()
    }

    /// Commands with the instant each one arrived.
    pub fn timed_commands(&self) -> Vec<(ReceiverCommand, Instant)> {
        self.commands.lock().clone()
    }

    /// URLs passed to `load_media`.
    pub fn loaded_urls(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|command| match command {
                ReceiverCommand::LoadMedia { url, .. } => Some(url),
                _ => None,
            })
            .collect()
    }

    /// How many times the provider handed this receiver out.
    pub fn device_requests(&self) -> usize {
        *self.device_requests.lock()
    }

    fn record(&self, command: ReceiverCommand) {
        self.commands.lock().push((command, Instant::now()));
    }
}

impl Default for MockReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Receiver for MockReceiver {
    fn name(&self) -> &str {
        "mock receiver"
    }

    fn local_address(&self) -> IpAddr {
        self.local
    }

    async fn is_idle(&self) -> Result<bool, ReceiverError> {
        Ok(self.idle)
    }

    async fn quit_app(&self) -> Result<(), ReceiverError> {
        self.record(ReceiverCommand::QuitApp);
        Ok(())
    }

    async fn load_media(&self, url: &str, mime_type: &str) -> Result<(), ReceiverError> {
        self.record(ReceiverCommand::LoadMedia {
            url: url.to_string(),
            mime_type: mime_type.to_string(),
        });
        Ok(())
    }

    async fn pause(&self) -> Result<(), ReceiverError> {
        self.record(ReceiverCommand::Pause);
        Ok(())
    }

    async fn resume(&self) -> Result<(), ReceiverError> {
        self.record(ReceiverCommand::Resume);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ReceiverError> {
        self.record(ReceiverCommand::Stop);
        Ok(())
    }
}

#[async_trait]
impl ReceiverProvider for MockReceiver {
    async fn get_device(&self) -> Result<Box<dyn Receiver>, ReceiverError> {
        *self.device_requests.lock() += 1;
        Ok(Box::new(self.clone()))
    }
}
