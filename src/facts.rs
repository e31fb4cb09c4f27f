//! Vendor fact normalization
//!
//! Drivers return facts in the NAPALM shape (`RawFacts` plus the nested
//! interface/IP map). `normalize` flattens that into the one record the
//! reconciliation engine consumes, locating the interface that owns the
//! requested management IP along the way.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::config::OnboardingSettings;
use crate::error::OnboardingError;

/// Identifying facts as reported by a device driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFacts {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub fqdn: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interface_list: Vec<String>,
}

/// Attributes attached to one address in the interface/IP map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpAttributes {
    pub prefix_length: u8,
}

/// Interface name -> address family ("ipv4"/"ipv6") -> address -> attributes.
pub type InterfacesIp = HashMap<String, HashMap<String, HashMap<String, IpAttributes>>>;

/// Normalized facts, produced once per attempt and consumed by the
/// reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalFacts {
    pub hostname: String,
    /// Canonical platform name that selected the driver
    pub platform: String,
    pub vendor: String,
    /// Model after device type aliasing; may be empty
    pub model: String,
    pub serial_number: String,
    pub os_version: String,
    /// Interface that owns the management IP
    pub mgmt_interface: String,
    pub mgmt_ip: IpAddr,
    pub prefix_length: u8,
}

impl CanonicalFacts {
    /// CIDR form of the management address.
    pub fn mgmt_cidr(&self) -> String {
        format!("{}/{}", self.mgmt_ip, self.prefix_length)
    }
}

/// Flatten raw driver output into `CanonicalFacts`.
///
/// The management IP must appear somewhere in `interfaces_ip`; comparison
/// is on parsed addresses, not strings. When more than one interface
/// carries the address the lexicographically first name wins so repeat
/// runs stay deterministic.
pub fn normalize(
    raw: &RawFacts,
    interfaces_ip: &InterfacesIp,
    management_ip: IpAddr,
    platform: &str,
    settings: &OnboardingSettings,
) -> Result<CanonicalFacts, OnboardingError> {
    let hostname = resolve_hostname(raw, management_ip);

    let mut matches: Vec<(&str, u8)> = Vec::new();
    for (interface, families) in interfaces_ip {
        for addresses in families.values() {
            for (address, attrs) in addresses {
                if let Ok(parsed) = address.parse::<IpAddr>() {
                    if parsed == management_ip {
                        matches.push((interface.as_str(), attrs.prefix_length));
                    }
                }
            }
        }
    }
    matches.sort_by(|a, b| a.0.cmp(b.0));

    let (mgmt_interface, prefix_length) = match matches.first() {
        Some((interface, prefix)) => (interface.to_string(), *prefix),
        None => {
            return Err(OnboardingError::ManagementIpNotFound {
                ip: management_ip.to_string(),
                hostname,
            })
        }
    };

    Ok(CanonicalFacts {
        hostname,
        platform: platform.to_string(),
        vendor: raw.vendor.trim().to_string(),
        model: settings.canonical_device_type(&raw.model),
        serial_number: raw.serial_number.trim().to_string(),
        os_version: raw.os_version.trim().to_string(),
        mgmt_interface,
        mgmt_ip: management_ip,
        prefix_length,
    })
}

/// Hostname preference order: reported hostname, first FQDN label, then
/// the management IP itself for devices that report neither.
fn resolve_hostname(raw: &RawFacts, management_ip: IpAddr) -> String {
    let hostname = raw.hostname.trim();
    if !hostname.is_empty() {
        return hostname.to_string();
    }

    let label = raw.fqdn.trim().split('.').next().unwrap_or("");
    if !label.is_empty() {
        return label.to_string();
    }

    management_ip.to_string()
}
