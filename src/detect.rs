//! Platform detection
//!
//! Two-pass autodetection for requests that carry no platform hint: a
//! credential-free SSH banner pass, then an authenticated
//! `show version` fingerprint pass when the banner is inconclusive.
//! Hints bypass this module entirely; they are only normalized through
//! the alias map.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::config::{OnboardingSettings, BANNER_TIMEOUT};
use crate::driver::{DriverTarget, SshClient, SshError};
use crate::error::OnboardingError;

/// Probe surface for platform detection, injectable for tests.
#[async_trait]
pub trait PlatformProber: Send + Sync {
    /// Read the SSH identification line without authenticating.
    /// `Ok(None)` means inconclusive; detection falls through to the
    /// authenticated pass.
    async fn read_banner(
        &self,
        host: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> Result<Option<String>, OnboardingError>;

    /// Open an authenticated session and return `show version` output.
    async fn run_show_version(&self, target: &DriverTarget) -> Result<String, OnboardingError>;
}

/// Detect the canonical platform for `target`.
pub async fn detect_platform(
    prober: &dyn PlatformProber,
    target: &DriverTarget,
    settings: &OnboardingSettings,
) -> Result<String, OnboardingError> {
    if let Some(banner) = prober
        .read_banner(target.host, target.port, target.timeout)
        .await?
    {
        if let Some(platform) = platform_from_banner(&banner) {
            crate::log_debug!(
                "Banner '{}' identified {} as {}",
                banner.trim(),
                target.host,
                platform
            );
            return Ok(settings.canonical_platform(platform));
        }
    }

    let output = prober.run_show_version(target).await?;
    match platform_from_show_version(&output) {
        Some(platform) => Ok(settings.canonical_platform(platform)),
        None => Err(OnboardingError::Detection {
            host: target.host.to_string(),
            detail: "no usable platform identifier in banner or version output".to_string(),
        }),
    }
}

/// Match vendor-specific SSH identification strings. Most stacks ship a
/// stock OpenSSH banner, so a miss here is the common case.
pub fn platform_from_banner(banner: &str) -> Option<&'static str> {
    if banner.contains("Cisco") {
        return Some("cisco_ios");
    }
    if banner.contains("ROSSSH") {
        return Some("mikrotik_routeros");
    }
    None
}

/// Match `show version` output against vendor signatures. Order matters:
/// the NX-OS banner also mentions Cisco.
pub fn platform_from_show_version(output: &str) -> Option<&'static str> {
    if output.contains("Arista") {
        return Some("arista_eos");
    }
    if output.contains("Cisco Nexus Operating System") || output.contains("NX-OS") {
        return Some("cisco_nxos");
    }
    if output.contains("Cisco IOS") || output.contains("Cisco Internetwork Operating System") {
        return Some("cisco_ios");
    }
    if output.contains("JUNOS") || output.contains("Junos") {
        return Some("juniper_junos");
    }
    None
}

/// Real prober used outside of tests.
pub struct SshPlatformProber;

#[async_trait]
impl PlatformProber for SshPlatformProber {
    async fn read_banner(
        &self,
        host: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> Result<Option<String>, OnboardingError> {
        let wait = timeout.min(BANNER_TIMEOUT);
        match read_identification_line(host, port, wait).await {
            Ok(banner) => Ok(banner),
            Err(e) => {
                crate::log_debug!("Banner read from {}:{} failed: {}", host, port, e);
                Ok(None)
            }
        }
    }

    async fn run_show_version(&self, target: &DriverTarget) -> Result<String, OnboardingError> {
        let client = SshClient::new(
            target.host,
            target.port,
            target.credentials.clone(),
            target.timeout,
        );

        let session = client.connect().await.map_err(|e| match e {
            SshError::AuthenticationFailed { username } => OnboardingError::Detection {
                host: target.host.to_string(),
                detail: format!("target rejected credentials for user '{}'", username),
            },
            other => OnboardingError::Detection {
                host: target.host.to_string(),
                detail: other.to_string(),
            },
        })?;

        let result = session.exec("show version").await;
        if let Err(e) = session.disconnect().await {
            crate::log_debug!("Detection session close for {} failed: {}", target.host, e);
        }

        let output = result.map_err(|e| OnboardingError::Detection {
            host: target.host.to_string(),
            detail: e.to_string(),
        })?;

        if output.stdout.is_empty() {
            Ok(output.stderr)
        } else {
            Ok(output.stdout)
        }
    }
}

/// The server speaks first in the SSH protocol; read its one
/// identification line off a raw TCP connection.
async fn read_identification_line(
    host: IpAddr,
    port: u16,
    timeout: Duration,
) -> std::io::Result<Option<String>> {
    let addr = std::net::SocketAddr::new(host, port);
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;

    let mut buf = [0u8; 256];
    let mut collected = Vec::new();

    loop {
        let read = tokio::time::timeout(timeout, stream.read(&mut buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "banner timed out"))??;
        if read == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..read]);
        if collected.contains(&b'\n') || collected.len() >= 255 {
            break;
        }
    }

    let text = String::from_utf8_lossy(&collected);
    let line = text.lines().find(|l| l.starts_with("SSH-"));
    Ok(line.map(|l| l.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings as settings;
    use crate::credentials::Credentials;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedProber {
        banner: Option<String>,
        version_output: String,
        version_called: AtomicBool,
    }

    #[async_trait]
    impl PlatformProber for ScriptedProber {
        async fn read_banner(
            &self,
            _host: IpAddr,
            _port: u16,
            _timeout: Duration,
        ) -> Result<Option<String>, OnboardingError> {
            Ok(self.banner.clone())
        }

        async fn run_show_version(
            &self,
            _target: &DriverTarget,
        ) -> Result<String, OnboardingError> {
            self.version_called.store(true, Ordering::SeqCst);
            Ok(self.version_output.clone())
        }
    }

    fn target() -> DriverTarget {
        DriverTarget {
            host: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)),
            port: 22,
            credentials: Credentials::new("admin", "admin"),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn banner_match_short_circuits_authenticated_pass() {
        let prober = ScriptedProber {
            banner: Some("SSH-2.0-Cisco-1.25".to_string()),
            version_output: String::new(),
            version_called: AtomicBool::new(false),
        };

        let platform = detect_platform(&prober, &target(), &settings())
            .await
            .unwrap();
        assert_eq!(platform, "cisco_ios");
        assert!(!prober.version_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn generic_banner_falls_through_to_version_fingerprint() {
        let prober = ScriptedProber {
            banner: Some("SSH-2.0-OpenSSH_7.8".to_string()),
            version_output: "Arista vEOS\nSoftware image version: 4.15.5M".to_string(),
            version_called: AtomicBool::new(false),
        };

        let platform = detect_platform(&prober, &target(), &settings())
            .await
            .unwrap();
        assert_eq!(platform, "arista_eos");
        assert!(prober.version_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unidentifiable_output_fails_detection() {
        let prober = ScriptedProber {
            banner: None,
            version_output: "login: incorrect".to_string(),
            version_called: AtomicBool::new(false),
        };

        let err = detect_platform(&prober, &target(), &settings())
            .await
            .expect_err("nothing identifiable should fail");
        assert_eq!(err.reason(), "fail-detect");
    }

    #[test]
    fn version_fingerprints_distinguish_cisco_stacks() {
        assert_eq!(
            platform_from_show_version("Cisco Nexus Operating System (NX-OS) Software"),
            Some("cisco_nxos")
        );
        assert_eq!(
            platform_from_show_version("Cisco IOS Software, C2900 Software"),
            Some("cisco_ios")
        );
        assert_eq!(
            platform_from_show_version("Hostname: fw1\nJUNOS Software Release"),
            Some("juniper_junos")
        );
        assert_eq!(platform_from_show_version("unrelated output"), None);
    }

    #[test]
    fn banner_fingerprints() {
        assert_eq!(
            platform_from_banner("SSH-2.0-Cisco-1.25"),
            Some("cisco_ios")
        );
        assert_eq!(
            platform_from_banner("SSH-2.0-ROSSSH"),
            Some("mikrotik_routeros")
        );
        assert_eq!(platform_from_banner("SSH-2.0-OpenSSH_8.9"), None);
    }
}
