//! Remote playback receivers.
//!
//! A receiver is the cast device that fetches the playback URL and renders
//! it. Sessions only depend on the `Receiver` and `ReceiverProvider` traits;
//! `CattReceiver` is the production implementation.

pub mod catt;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_mocks;

use std::net::IpAddr;

use async_trait::async_trait;
pub use catt::{CattProvider, CattReceiver};
use thiserror::Error;

/// Errors from talking to a receiver.
#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("no cast device found")]
    NoDevice,

    #[error("cannot determine local address towards {device}: {source}")]
    LocalAddress {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// A cast device that can be told what to play.
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Human readable device name.
    fn name(&self) -> &str;

    /// Local IP address the device can reach this host on.
    fn local_address(&self) -> IpAddr;

    /// Whether the device has no app or media currently active.
    async fn is_idle(&self) -> Result<bool, ReceiverError>;

    /// Terminates the app running on the device.
    async fn quit_app(&self) -> Result<(), ReceiverError>;

    /// Starts playing `url`, advertised as `mime_type`.
    async fn load_media(&self, url: &str, mime_type: &str) -> Result<(), ReceiverError>;

    async fn pause(&self) -> Result<(), ReceiverError>;

    async fn resume(&self) -> Result<(), ReceiverError>;

    /// Stops the current media.
    async fn stop(&self) -> Result<(), ReceiverError>;
}

/// Locates the receiver to talk to.
#[async_trait]
pub trait ReceiverProvider: Send + Sync {
    /// Returns the receiver for this invocation.
    ///
    /// # Errors
    ///
    /// - `ReceiverError::NoDevice` - Nothing found on the network
    /// - `ReceiverError::LocalAddress` - Device found but unreachable
    async fn get_device(&self) -> Result<Box<dyn Receiver>, ReceiverError>;
}
