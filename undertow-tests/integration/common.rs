//! Shared fixtures for the integration tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use undertow_core::UndertowConfig;
use undertow_core::receiver::test_mocks::MockReceiver;

/// Scratch directory plus a config rooted in it.
pub struct Fixture {
    pub dir: TempDir,
    pub config: UndertowConfig,
    pub receiver: MockReceiver,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = UndertowConfig::for_testing(dir.path());
        Self {
            dir,
            config,
            receiver: MockReceiver::new(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes a media file with a recognisable byte pattern.
    pub fn media_file(&self, name: &str, len: usize) -> PathBuf {
        let path = self.path(name);
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    /// Writes an executable `/bin/sh` script.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        write_script(&self.path(name), body)
    }
}

pub fn write_script(path: &Path, body: &str) -> PathBuf {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// HTTP client that never routes loopback requests through a proxy.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// The single URL the receiver was asked to load.
pub fn loaded_url(receiver: &MockReceiver) -> String {
    let urls = receiver.loaded_urls();
    assert_eq!(urls.len(), 1, "load_media must be called exactly once");
    urls.into_iter().next().unwrap()
}
