//! Error taxonomy for the onboarding workflow
//!
//! Every failure an onboarding attempt can hit maps to one variant here,
//! and every variant maps to a stable machine-readable reason recorded on
//! the task row.

use thiserror::Error;

/// Failures surfaced by an onboarding attempt.
///
/// Variants carry enough target context to log without re-deriving it at
/// the call site. `reason()` gives the stable slug stored in
/// `onboarding_tasks.failed_reason`.
#[derive(Debug, Error)]
pub enum OnboardingError {
    /// Target did not accept a TCP connection within the timeout.
    #[error("device {host}:{port} is unreachable: {detail}")]
    Connectivity {
        host: String,
        port: u16,
        detail: String,
    },

    /// Platform autodetection produced no usable identifier, or the
    /// target rejected the supplied credentials during detection.
    #[error("platform detection failed for {host}: {detail}")]
    Detection { host: String, detail: String },

    /// No driver is registered for the canonical platform name.
    #[error("no driver registered for platform '{platform}'")]
    UnsupportedPlatform { platform: String },

    /// A driver session or command failed after the driver was resolved.
    #[error("driver failure on {host}: {detail}")]
    Driver { host: String, detail: String },

    /// The requested management IP is absent from the device's own
    /// interface/IP data.
    #[error("management IP {ip} not found on any interface of '{hostname}'")]
    ManagementIpNotFound { ip: String, hostname: String },

    /// An explicit platform hint disagrees with what the device reports.
    #[error("platform hint '{hinted}' conflicts with reported vendor '{reported}' for {host}")]
    PlatformMismatch {
        host: String,
        hinted: String,
        reported: String,
    },

    /// The management IP already belongs to a device with a different
    /// hostname.
    #[error("management IP {ip} already belongs to '{existing}' but device reports hostname '{reported}'")]
    DeviceConflict {
        ip: String,
        existing: String,
        reported: String,
    },

    /// The device reported no model and the request gave no device type
    /// override.
    #[error("device '{hostname}' reported no model and no device type override was given")]
    UnknownModel { hostname: String },

    /// The requested location is not present in the inventory. Locations
    /// are seeded explicitly, never auto-created.
    #[error("location '{name}' does not exist in inventory")]
    LocationNotFound { name: String },

    /// Inventory storage failure outside the taxonomy above.
    #[error("inventory storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl OnboardingError {
    /// Stable failure slug recorded in `onboarding_tasks.failed_reason`.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Connectivity { .. } => "fail-connect",
            Self::Detection { .. } => "fail-detect",
            Self::UnsupportedPlatform { .. } => "fail-driver",
            Self::Driver { .. } => "fail-execute",
            Self::ManagementIpNotFound { .. } => "fail-ip",
            Self::PlatformMismatch { .. } => "fail-platform-mismatch",
            Self::DeviceConflict { .. } => "fail-device-conflict",
            Self::UnknownModel { .. } => "fail-model",
            Self::LocationNotFound { .. } => "fail-location",
            Self::Storage(_) => "fail-general",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_slugs_are_stable() {
        let err = OnboardingError::Connectivity {
            host: "10.0.0.1".to_string(),
            port: 22,
            detail: "timed out".to_string(),
        };
        assert_eq!(err.reason(), "fail-connect");

        let err = OnboardingError::DeviceConflict {
            ip: "1.1.1.1".to_string(),
            existing: "edge-1".to_string(),
            reported: "edge-2".to_string(),
        };
        assert_eq!(err.reason(), "fail-device-conflict");

        let err = OnboardingError::UnsupportedPlatform {
            platform: "vyos".to_string(),
        };
        assert_eq!(err.reason(), "fail-driver");
    }

    #[test]
    fn display_includes_target_context() {
        let err = OnboardingError::ManagementIpNotFound {
            ip: "1.1.1.1".to_string(),
            hostname: "arista-device".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("1.1.1.1"));
        assert!(text.contains("arista-device"));
    }
}
