//! Single-attempt onboarding workflow
//!
//! Runs one device through the full pipeline: resolve the target,
//! pre-flight the request against the inventory, probe reachability,
//! settle the platform, pull facts through the driver, normalize, and
//! reconcile. Task persistence and batching live in `job`.

use anyhow::anyhow;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::OnboardingSettings;
use crate::credentials::Credentials;
use crate::detect::{detect_platform, PlatformProber};
use crate::driver::{DriverRegistry, DriverTarget};
use crate::error::OnboardingError;
use crate::facts::normalize;
use crate::inventory::{store, Database};
use crate::probe::probe_reachable;
use crate::reconcile::{reconcile_device, ReconcileOptions};

/// One onboarding request: a target plus optional hints.
#[derive(Debug, Clone)]
pub struct OnboardingRequest {
    /// IP address or resolvable hostname of the target
    pub ip: String,
    /// Location name; must already exist in the inventory
    pub location: String,
    pub credentials: Credentials,
    /// Platform hint; skips autodetection when set
    pub platform: Option<String>,
    /// Device type override for devices that report no usable model
    pub device_type: Option<String>,
    pub role: Option<String>,
    pub port: Option<u16>,
    pub timeout_secs: Option<u64>,
    /// Downgrade hostname conflicts from errors to skips
    pub continue_on_failure: bool,
}

impl OnboardingRequest {
    pub fn new(ip: &str, location: &str, credentials: Credentials) -> Self {
        Self {
            ip: ip.to_string(),
            location: location.to_string(),
            credentials,
            platform: None,
            device_type: None,
            role: None,
            port: None,
            timeout_secs: None,
            continue_on_failure: false,
        }
    }

    pub fn port_or_default(&self, settings: &OnboardingSettings) -> u16 {
        self.port.unwrap_or(settings.default_port)
    }

    pub fn timeout_or_default(&self, settings: &OnboardingSettings) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(settings.default_timeout_secs))
    }
}

/// Result of one onboarding attempt.
#[derive(Debug, Clone)]
pub struct OnboardingOutcome {
    /// `None` when the attempt was skipped
    pub device_id: Option<i64>,
    pub hostname: String,
    /// Canonical platform that served the attempt; empty on a pre-flight
    /// skip where detection never ran
    pub platform: String,
    pub management_ip: String,
    /// CIDR form when known, empty otherwise
    pub management_cidr: String,
    pub created_device: bool,
    pub skipped: Option<String>,
    pub message: String,
}

/// Run one onboarding attempt end to end.
pub async fn run_onboarding(
    db: &Database,
    registry: &DriverRegistry,
    prober: &dyn PlatformProber,
    settings: &OnboardingSettings,
    request: &OnboardingRequest,
) -> Result<OnboardingOutcome, OnboardingError> {
    let port = request.port_or_default(settings);
    let timeout = request.timeout_or_default(settings);
    let ip = resolve_target_ip(&request.ip, port).await?;
    let address = ip.to_string();

    // Pre-flight against the inventory before any network traffic: the
    // location must exist, and operator-disabled devices are skipped
    // without being contacted.
    {
        let conn = db.connection();
        let conn = conn
            .lock()
            .map_err(|_| OnboardingError::Storage(anyhow!("Inventory connection lock poisoned")))?;

        if store::get_location_by_name(&conn, &request.location)?.is_none() {
            return Err(OnboardingError::LocationNotFound {
                name: request.location.clone(),
            });
        }

        if let Some(device) = store::find_device_by_management_ip(&conn, &address)? {
            if let Some(marker) = store::get_onboarding_device(&conn, device.id)? {
                if !marker.enabled {
                    let reason = format!("Onboarding is disabled for {}", device.name);
                    crate::log_warn!("{}", reason);
                    let cidr = store::get_ip_address(&conn, &address)?
                        .map(|row| row.cidr())
                        .unwrap_or_default();
                    return Ok(OnboardingOutcome {
                        device_id: None,
                        hostname: device.name,
                        platform: String::new(),
                        management_ip: address,
                        management_cidr: cidr,
                        created_device: false,
                        skipped: Some(reason.clone()),
                        message: reason,
                    });
                }
            }
        }
    }

    probe_reachable(ip, port, timeout).await?;

    let target = DriverTarget {
        host: ip,
        port,
        credentials: request.credentials.clone(),
        timeout,
    };

    let platform = match &request.platform {
        Some(hint) => settings.canonical_platform(hint),
        None => detect_platform(prober, &target, settings).await?,
    };
    // Only an explicit hint arms the vendor mismatch gate.
    let hinted = request.platform.as_ref().map(|_| platform.clone());
    crate::log_debug!("Onboarding {} as platform {}", address, platform);

    let mut driver = registry.resolve(&platform, &target)?;

    let gathered = match driver.open().await {
        Ok(()) => match driver.get_facts().await {
            Ok(raw) => match driver.get_interfaces_ip().await {
                Ok(interfaces_ip) => Ok((raw, interfaces_ip)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };
    if let Err(e) = driver.close().await {
        crate::log_debug!("Driver close for {} failed: {}", address, e);
    }
    let (mut raw, interfaces_ip) = gathered?;

    if let Some(device_type) = &request.device_type {
        raw.model = device_type.clone();
    }
    let facts = normalize(&raw, &interfaces_ip, ip, &platform, settings)?;

    let outcome = {
        let conn = db.connection();
        let conn = conn
            .lock()
            .map_err(|_| OnboardingError::Storage(anyhow!("Inventory connection lock poisoned")))?;
        reconcile_device(
            &conn,
            &facts,
            &ReconcileOptions {
                location: &request.location,
                role: request.role.as_deref(),
                hinted_platform: hinted.as_deref(),
                continue_on_failure: request.continue_on_failure,
            },
            settings,
        )?
    };

    if let Some(reason) = outcome.skipped {
        crate::log_warn!("{}", reason);
        return Ok(OnboardingOutcome {
            device_id: None,
            hostname: outcome.device_name,
            platform,
            management_ip: address,
            management_cidr: facts.mgmt_cidr(),
            created_device: false,
            skipped: Some(reason.clone()),
            message: reason,
        });
    }

    let message = format!(
        "Successfully onboarded {} with a management IP of {}",
        facts.hostname, ip
    );
    crate::log_stderr!("{}", message);

    Ok(OnboardingOutcome {
        device_id: outcome.device_id,
        hostname: facts.hostname.clone(),
        platform,
        management_ip: address,
        management_cidr: facts.mgmt_cidr(),
        created_device: outcome.created_device,
        skipped: None,
        message,
    })
}

/// Accept literal addresses as-is, otherwise resolve through DNS and take
/// the first answer.
async fn resolve_target_ip(host: &str, port: u16) -> Result<IpAddr, OnboardingError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        OnboardingError::Connectivity {
            host: host.to_string(),
            port,
            detail: format!("DNS lookup failed: {}", e),
        }
    })?;

    addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| OnboardingError::Connectivity {
            host: host.to_string(),
            port,
            detail: "DNS lookup returned no addresses".to_string(),
        })
}
