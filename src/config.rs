//! Configuration for the onboarding engine
//!
//! Defaults are embedded; everything is overridable through
//! `NETONBOARD_*` environment variables. The alias maps accept JSON
//! objects so deployments can extend them without a rebuild.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::Credentials;

/// Default SSH port for device access
pub const DEFAULT_PORT: u16 = 22;

/// Default per-step network timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Role assigned to onboarded devices when the request carries none
pub const DEFAULT_DEVICE_ROLE: &str = "network";

/// Maximum concurrent onboarding attempts in a batch
pub const DEFAULT_CONCURRENCY: usize = 8;

/// How long to wait for the SSH identification line during detection
pub const BANNER_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime onboarding settings (env-driven).
#[derive(Debug, Clone)]
pub struct OnboardingSettings {
    /// Platform alias -> canonical platform name
    pub platform_map: HashMap<String, String>,
    /// Reported model alias -> canonical device type model
    pub device_type_map: HashMap<String, String>,
    /// Credentials used when a request carries none
    pub default_credentials: Option<Credentials>,
    pub default_port: u16,
    pub default_timeout_secs: u64,
    pub default_role: String,
    /// Inventory database location; None means the platform default path
    pub database_path: Option<PathBuf>,
    pub concurrency: usize,
}

impl Default for OnboardingSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl OnboardingSettings {
    pub fn from_env() -> Self {
        let mut platform_map = base_platform_map();
        platform_map.extend(env_parse_map("NETONBOARD_PLATFORM_MAP"));

        let mut device_type_map = HashMap::new();
        device_type_map.extend(env_parse_map("NETONBOARD_DEVICE_TYPE_MAP"));

        Self {
            platform_map,
            device_type_map,
            default_credentials: Credentials::from_env(),
            default_port: env_parse_u16("NETONBOARD_PORT", DEFAULT_PORT),
            default_timeout_secs: env_parse_u64("NETONBOARD_TIMEOUT", DEFAULT_TIMEOUT_SECS, 1, 600),
            default_role: env_var("NETONBOARD_ROLE")
                .unwrap_or_else(|| DEFAULT_DEVICE_ROLE.to_string()),
            database_path: env_var("NETONBOARD_DB").map(PathBuf::from),
            concurrency: env_parse_u64("NETONBOARD_CONCURRENCY", DEFAULT_CONCURRENCY as u64, 1, 256)
                as usize,
        }
    }

    /// Normalize a platform identifier through the alias map. Unmapped
    /// names pass through unchanged so custom platforms keep working.
    pub fn canonical_platform(&self, raw: &str) -> String {
        let key = raw.trim().to_ascii_lowercase();
        match self.platform_map.get(&key) {
            Some(canonical) => canonical.clone(),
            None => key,
        }
    }

    /// Normalize a reported model through the device type alias map.
    pub fn canonical_device_type(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self.device_type_map.get(&trimmed.to_ascii_lowercase()) {
            Some(canonical) => canonical.clone(),
            None => trimmed.to_string(),
        }
    }
}

/// Built-in aliases covering the common netmiko/NAPALM platform names.
fn base_platform_map() -> HashMap<String, String> {
    let pairs = [
        ("ios", "cisco_ios"),
        ("cisco_xe", "cisco_ios"),
        ("ios-xe", "cisco_ios"),
        ("eos", "arista_eos"),
        ("nxos", "cisco_nxos"),
        ("nxos_ssh", "cisco_nxos"),
        ("junos", "juniper_junos"),
        ("routeros", "mikrotik_routeros"),
    ];
    pairs
        .iter()
        .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
        .collect()
}

/// Manufacturer name for a canonical platform, used when creating device
/// types. Unknown platforms fall back to a capitalized vendor segment.
pub fn manufacturer_for_platform(platform: &str) -> String {
    match platform {
        "arista_eos" => "Arista".to_string(),
        "cisco_ios" | "cisco_nxos" | "cisco_xr" => "Cisco".to_string(),
        "juniper_junos" => "Juniper".to_string(),
        "mikrotik_routeros" => "MikroTik".to_string(),
        other => {
            let segment = other.split('_').next().unwrap_or(other);
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        }
    }
}

/// Short driver name stored on platform records (the NAPALM driver the
/// platform maps to upstream).
pub fn network_driver_for_platform(platform: &str) -> String {
    match platform {
        "arista_eos" => "eos".to_string(),
        "cisco_ios" => "ios".to_string(),
        "cisco_nxos" => "nxos".to_string(),
        "juniper_junos" => "junos".to_string(),
        other => other.to_string(),
    }
}

/// Fixed settings for tests, independent of the environment.
#[cfg(test)]
pub(crate) fn test_settings() -> OnboardingSettings {
    OnboardingSettings {
        platform_map: base_platform_map(),
        device_type_map: HashMap::new(),
        default_credentials: None,
        default_port: DEFAULT_PORT,
        default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        default_role: DEFAULT_DEVICE_ROLE.to_string(),
        database_path: None,
        concurrency: DEFAULT_CONCURRENCY,
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match env_var(name).and_then(|v| v.parse::<u64>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_u16(name: &str, default: u16) -> u16 {
    match env_var(name).and_then(|v| v.parse::<u16>().ok()) {
        Some(v) => v,
        None => default,
    }
}

/// Parse a JSON object of string pairs from an env var. Keys are
/// lowercased so lookups stay case-insensitive.
fn env_parse_map(name: &str) -> HashMap<String, String> {
    let raw = match env_var(name) {
        Some(raw) => raw,
        None => return HashMap::new(),
    };

    match serde_json::from_str::<HashMap<String, String>>(&raw) {
        Ok(map) => map
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect(),
        Err(e) => {
            tracing::warn!("Ignoring malformed {}: {}", name, e);
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_platform_maps_known_aliases() {
        let settings = test_settings();
        assert_eq!(settings.canonical_platform("ios"), "cisco_ios");
        assert_eq!(settings.canonical_platform("EOS"), "arista_eos");
        assert_eq!(settings.canonical_platform("nxos_ssh"), "cisco_nxos");
        assert_eq!(settings.canonical_platform("junos"), "juniper_junos");
    }

    #[test]
    fn canonical_platform_passes_unknown_names_through() {
        let settings = test_settings();
        assert_eq!(settings.canonical_platform("vyos"), "vyos");
        assert_eq!(settings.canonical_platform(" Arista_EOS "), "arista_eos");
    }

    #[test]
    fn device_type_map_aliases_models() {
        let mut settings = test_settings();
        settings
            .device_type_map
            .insert("veos".to_string(), "vEOS-lab".to_string());
        assert_eq!(settings.canonical_device_type("vEOS"), "vEOS-lab");
        assert_eq!(settings.canonical_device_type("CSR1000V"), "CSR1000V");
    }

    #[test]
    fn manufacturer_lookup_covers_builtin_platforms() {
        assert_eq!(manufacturer_for_platform("arista_eos"), "Arista");
        assert_eq!(manufacturer_for_platform("cisco_nxos"), "Cisco");
        assert_eq!(manufacturer_for_platform("juniper_junos"), "Juniper");
        assert_eq!(manufacturer_for_platform("vyos"), "Vyos");
    }

    #[test]
    fn network_driver_names_match_platform() {
        assert_eq!(network_driver_for_platform("arista_eos"), "eos");
        assert_eq!(network_driver_for_platform("cisco_ios"), "ios");
        assert_eq!(network_driver_for_platform("cisco_nxos"), "nxos");
    }
}
