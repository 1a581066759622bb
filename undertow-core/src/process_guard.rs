//! Single-instance guard backed by a PID file.
//!
//! A new streaming session first signals whatever process the PID file names,
//! then records its own PID. Signal delivery is best effort: the recorded
//! process may already be gone, belong to another user, or the file may hold
//! garbage. None of that is an error for the caller.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Outcome of trying to stop the previously recorded instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGTERM was delivered to the recorded PID.
    Signalled(i32),
    /// Nothing was signalled (no record, bad record, or delivery failed).
    Skipped,
}

/// Tracks the currently streaming instance through a PID file.
#[derive(Debug, Clone)]
pub struct ProcessGuard {
    pid_file: PathBuf,
}

impl ProcessGuard {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
        }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// Sends SIGTERM to the process named by the PID file.
    ///
    /// Never fails; every problem is logged at debug level and reported as
    /// `Termination::Skipped`. Does not wait for the process to exit.
    pub async fn terminate_previous(&self) -> Termination {
        let contents = match tokio::fs::read_to_string(&self.pid_file).await {
            Ok(contents) => contents,
            Err(e) => {
                debug!(
                    "No previous instance recorded in {}: {e}",
                    self.pid_file.display()
                );
                return Termination::Skipped;
            }
        };

        let pid = match contents.trim().parse::<i32>() {
            Ok(pid) => pid,
            Err(e) => {
                debug!("Ignoring unparsable PID file contents {contents:?}: {e}");
                return Termination::Skipped;
            }
        };

        // 0 and negative values address process groups
        if pid <= 0 || pid as u32 == std::process::id() {
            debug!("Refusing to signal recorded PID {pid}");
            return Termination::Skipped;
        }

        match send_sigterm(pid) {
            Ok(()) => {
                info!("Terminated previous instance (PID {pid})");
                Termination::Signalled(pid)
            }
            Err(e) => {
                debug!("Could not signal previous instance (PID {pid}): {e}");
                Termination::Skipped
            }
        }
    }

    /// Records the current process as the active instance.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - PID file could not be written
    pub async fn register_self(&self) -> io::Result<()> {
        let pid = std::process::id();
        tokio::fs::write(&self.pid_file, pid.to_string()).await?;
        debug!("Registered PID {pid} in {}", self.pid_file.display());
        Ok(())
    }

    /// Terminates the previous instance, then registers this one.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - PID file could not be written
    pub async fn replace_previous(&self) -> io::Result<Termination> {
        let termination = self.terminate_previous().await;
        self.register_self().await?;
        Ok(termination)
    }
}

fn send_sigterm(pid: i32) -> io::Result<()> {
    // SAFETY: kill(2) takes plain integers and touches no memory we own.
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
