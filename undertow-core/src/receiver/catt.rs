//! Cast receiver control through the `catt` command-line tool.
//!
//! Every operation is one `catt -d <device-ip> <command>` invocation. The
//! local-facing address is found by pointing a UDP socket at the device's
//! cast port and reading back the address the kernel picked.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Receiver, ReceiverError, ReceiverProvider};
use crate::config::ReceiverConfig;

/// Port cast devices accept control connections on.
const CAST_PORT: u16 = 8009;

/// A device listed by `catt scan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub ip: IpAddr,
    pub name: String,
}

/// Finds a cast device with `catt scan`, or uses the configured one.
#[derive(Debug, Clone)]
pub struct CattProvider {
    program: PathBuf,
    device: Option<String>,
}

impl CattProvider {
    pub fn new(config: &ReceiverConfig) -> Self {
        Self {
            program: config.catt_program.clone(),
            device: config.device.clone(),
        }
    }

    async fn scan(&self) -> Result<Vec<DiscoveredDevice>, ReceiverError> {
        let output = run_catt(&self.program, &["scan"]).await?;
        Ok(parse_scan_output(&output))
    }

    async fn resolve(&self) -> Result<DiscoveredDevice, ReceiverError> {
        if let Some(device) = &self.device
            && let Ok(ip) = device.parse::<IpAddr>()
        {
            return Ok(DiscoveredDevice {
                ip,
                name: device.clone(),
            });
        }

        let devices = self.scan().await?;
        let chosen = match &self.device {
            Some(wanted) => devices
                .into_iter()
                .find(|device| device.name.eq_ignore_ascii_case(wanted)),
            None => devices.into_iter().next(),
        };

        chosen.ok_or(ReceiverError::NoDevice)
    }
}

#[async_trait]
impl ReceiverProvider for CattProvider {
    async fn get_device(&self) -> Result<Box<dyn Receiver>, ReceiverError> {
        let device = self.resolve().await?;
        let local = local_address_towards(device.ip)
            .await
            .map_err(|source| ReceiverError::LocalAddress {
                device: device.ip.to_string(),
                source,
            })?;

        info!(
            "Using cast device {} at {} (local address {local})",
            device.name, device.ip
        );

        let receiver = CattReceiver {
            program: self.program.clone(),
            device,
            local,
        };

        // Informational only; a device that cannot report info is still usable
        match receiver.run(&["info"]).await {
            Ok(details) => debug!("Device info:\n{}", details.trim_end()),
            Err(e) => debug!("Device info unavailable: {e}"),
        }

        Ok(Box::new(receiver))
    }
}

/// A cast device driven by `catt`.
#[derive(Debug, Clone)]
pub struct CattReceiver {
    program: PathBuf,
    device: DiscoveredDevice,
    local: IpAddr,
}

impl CattReceiver {
    async fn run(&self, args: &[&str]) -> Result<String, ReceiverError> {
        let device = self.device.ip.to_string();
        let mut full = vec!["-d", device.as_str()];
        full.extend_from_slice(args);
        run_catt(&self.program, &full).await
    }
}

#[async_trait]
impl Receiver for CattReceiver {
    fn name(&self) -> &str {
        &self.device.name
    }

    fn local_address(&self) -> IpAddr {
        self.local
    }

    async fn is_idle(&self) -> Result<bool, ReceiverError> {
        match self.run(&["status"]).await {
            Ok(status) => Ok(status_is_idle(&status)),
            // catt exits non-zero when nothing is playing
            Err(ReceiverError::CommandFailed { stderr, .. }) => {
                debug!("Treating status failure as idle: {stderr}");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn quit_app(&self) -> Result<(), ReceiverError> {
        info!("Quitting app on {}", self.device.name);
        self.run(&["stop"]).await.map(drop)
    }

    async fn load_media(&self, url: &str, mime_type: &str) -> Result<(), ReceiverError> {
        info!("Casting {url} ({mime_type}) to {}", self.device.name);
        self.run(&["cast", "--force-default", url]).await.map(drop)
    }

    async fn pause(&self) -> Result<(), ReceiverError> {
        self.run(&["pause"]).await.map(drop)
    }

    async fn resume(&self) -> Result<(), ReceiverError> {
        self.run(&["play"]).await.map(drop)
    }

    async fn stop(&self) -> Result<(), ReceiverError> {
        self.run(&["stop"]).await.map(drop)
    }
}

async fn run_catt(program: &Path, args: &[&str]) -> Result<String, ReceiverError> {
    let command = format!("{} {}", program.display(), args.join(" "));
    debug!("Running {command}");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| ReceiverError::Launch {
            program: program.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ReceiverError::CommandFailed {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `catt scan` lines of the form `<ip> - <name> - <model>`.
pub fn parse_scan_output(output: &str) -> Vec<DiscoveredDevice> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(" - ");
            let ip = fields.next()?.trim().parse().ok()?;
            let name = fields.next().map(str::trim).unwrap_or_default().to_string();
            Some(DiscoveredDevice { ip, name })
        })
        .collect()
}

/// Interprets `catt status` output.
///
/// Only an explicit non-idle `State:` line means something is active.
pub fn status_is_idle(status: &str) -> bool {
    status
        .lines()
        .find_map(|line| line.trim().strip_prefix("State:"))
        .map(|state| matches!(state.trim(), "" | "IDLE" | "UNKNOWN"))
        .unwrap_or(true)
}

/// Local address the kernel would use to reach `device`.
async fn local_address_towards(device: IpAddr) -> std::io::Result<IpAddr> {
    let unspecified: IpAddr = match device {
        IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await?;
    // UDP connect only selects a route; nothing is sent
    socket.connect(SocketAddr::new(device, CAST_PORT)).await?;
    Ok(socket.local_addr()?.ip())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;

    /// Stub `catt` that logs its arguments and answers `scan` and `status`.
    fn write_stub(dir: &TempDir, status: &str) -> PathBuf {
        let path = dir.path().join("catt");
        let log = dir.path().join("calls.log");
        let script = format!(
            "#!/bin/sh\n\
             printf '%s\\n' \"$*\" >> '{}'\n\
             case \"$1\" in\n\
               scan) printf 'Scanning Chromecasts...\\n127.0.0.1 - Lounge - Google Inc. Chromecast\\n' ;;\n\
             esac\n\
             case \"$3\" in\n\
               status) {status} ;;\n\
             esac\n",
            log.display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn calls(dir: &TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_parse_scan_output() {
        let output = "Scanning Chromecasts...\n\
                      192.168.1.5 - Living Room - Google Inc. Chromecast\n\
                      192.168.1.9 - Kitchen - Google Inc. Google Nest Mini\n";

        let devices = parse_scan_output(output);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].ip, "192.168.1.5".parse::<IpAddr>().unwrap());
        assert_eq!(devices[0].name, "Living Room");
        assert_eq!(devices[1].name, "Kitchen");
        assert!(parse_scan_output("No devices found").is_empty());
    }

    #[test]
    fn test_status_interpretation() {
        assert!(status_is_idle(""));
        assert!(status_is_idle("Volume: 40\nState: IDLE\n"));
        assert!(!status_is_idle("Title: clip.mp4\nState: PLAYING\n"));
        assert!(!status_is_idle("State: PAUSED"));
        assert!(!status_is_idle("State: BUFFERING"));
    }

    #[tokio::test]
    async fn test_loopback_local_address() {
        let local = local_address_towards("127.0.0.1".parse().unwrap())
            .await
            .unwrap();
        assert!(local.is_loopback());
    }

    #[tokio::test]
    async fn test_first_scanned_device_is_used() {
        let dir = TempDir::new().unwrap();
        let provider = CattProvider::new(&ReceiverConfig {
            catt_program: write_stub(&dir, "exit 0"),
            device: None,
        });

        let receiver = provider.get_device().await.unwrap();

        assert_eq!(receiver.name(), "Lounge");
        assert!(receiver.local_address().is_loopback());
        assert_eq!(calls(&dir), vec!["scan", "-d 127.0.0.1 info"]);
    }

    #[tokio::test]
    async fn test_unknown_device_name_is_reported() {
        let dir = TempDir::new().unwrap();
        let provider = CattProvider::new(&ReceiverConfig {
            catt_program: write_stub(&dir, "exit 0"),
            device: Some("Bedroom".to_string()),
        });

        assert!(matches!(
            provider.get_device().await,
            Err(ReceiverError::NoDevice)
        ));
    }

    #[tokio::test]
    async fn test_commands_map_to_catt_invocations() {
        let dir = TempDir::new().unwrap();
        let provider = CattProvider::new(&ReceiverConfig {
            catt_program: write_stub(&dir, "echo 'State: PLAYING'"),
            device: Some("127.0.0.1".to_string()),
        });
        let receiver = provider.get_device().await.unwrap();

        assert!(!receiver.is_idle().await.unwrap());
        receiver
            .load_media("http://127.0.0.1:8020/media/clip.mp4", "video/mp4")
            .await
            .unwrap();
        receiver.pause().await.unwrap();
        receiver.resume().await.unwrap();
        receiver.stop().await.unwrap();
        receiver.quit_app().await.unwrap();

        assert_eq!(
            calls(&dir),
            vec![
                "-d 127.0.0.1 info",
                "-d 127.0.0.1 status",
                "-d 127.0.0.1 cast --force-default http://127.0.0.1:8020/media/clip.mp4",
                "-d 127.0.0.1 pause",
                "-d 127.0.0.1 play",
                "-d 127.0.0.1 stop",
                "-d 127.0.0.1 stop",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_status_means_idle() {
        let dir = TempDir::new().unwrap();
        let provider = CattProvider::new(&ReceiverConfig {
            catt_program: write_stub(&dir, "echo 'Nothing is currently playing' >&2; exit 1"),
            device: Some("127.0.0.1".to_string()),
        });
        let receiver = provider.get_device().await.unwrap();

        assert!(receiver.is_idle().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_catt_is_a_launch_error() {
        let dir = TempDir::new().unwrap();
        let provider = CattProvider::new(&ReceiverConfig {
            catt_program: dir.path().join("no-catt"),
            device: None,
        });

        assert!(matches!(
            provider.get_device().await,
            Err(ReceiverError::Launch { .. })
        ));
    }
}
