//! Inventory reconciliation
//!
//! Takes one set of normalized facts and makes the inventory agree with
//! it: location lookup, platform and device type ensure, device upsert,
//! management interface, primary IP, and the onboarding marker. All
//! writes happen inside a single savepoint so a failing step leaves the
//! inventory untouched. Skip outcomes also roll back; a skipped device
//! must not leak partially created platforms or device types.

use rusqlite::Connection;

use anyhow::Context;

use crate::config::{manufacturer_for_platform, network_driver_for_platform, OnboardingSettings};
use crate::error::OnboardingError;
use crate::facts::CanonicalFacts;
use crate::inventory::{store, DeviceRecord};

/// Per-request knobs that shape reconciliation.
pub struct ReconcileOptions<'a> {
    /// Location name; must already exist
    pub location: &'a str,
    /// Explicit role for the device; `None` keeps the stored role on
    /// update and applies the configured default on create
    pub role: Option<&'a str>,
    /// Canonical platform hint from the request, when one was given.
    /// Drives the vendor mismatch gate.
    pub hinted_platform: Option<&'a str>,
    /// Downgrade hostname conflicts from errors to skips
    pub continue_on_failure: bool,
}

/// What reconciliation did, entity by entity.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// `None` when the attempt was skipped and nothing was written
    pub device_id: Option<i64>,
    pub device_name: String,
    pub created_device: bool,
    pub created_platform: bool,
    pub created_device_type: bool,
    pub created_interface: bool,
    pub created_ip: bool,
    /// Human-readable reason when the attempt was skipped
    pub skipped: Option<String>,
}

impl ReconcileOutcome {
    fn skipped(device_name: &str, reason: String) -> Self {
        Self {
            device_id: None,
            device_name: device_name.to_string(),
            created_device: false,
            created_platform: false,
            created_device_type: false,
            created_interface: false,
            created_ip: false,
            skipped: Some(reason),
        }
    }
}

/// Reconcile one device into the inventory atomically.
pub fn reconcile_device(
    conn: &Connection,
    facts: &CanonicalFacts,
    opts: &ReconcileOptions,
    settings: &OnboardingSettings,
) -> Result<ReconcileOutcome, OnboardingError> {
    conn.execute_batch("SAVEPOINT onboard")
        .context("Failed to start onboarding transaction")?;

    match reconcile_steps(conn, facts, opts, settings) {
        Ok(outcome) => {
            if outcome.skipped.is_some() {
                let _ = conn
                    .execute_batch("ROLLBACK TO SAVEPOINT onboard; RELEASE SAVEPOINT onboard");
            } else {
                conn.execute_batch("RELEASE SAVEPOINT onboard")
                    .context("Failed to commit onboarding transaction")?;
            }
            Ok(outcome)
        }
        Err(e) => {
            let _ =
                conn.execute_batch("ROLLBACK TO SAVEPOINT onboard; RELEASE SAVEPOINT onboard");
            Err(e)
        }
    }
}

fn reconcile_steps(
    conn: &Connection,
    facts: &CanonicalFacts,
    opts: &ReconcileOptions,
    settings: &OnboardingSettings,
) -> Result<ReconcileOutcome, OnboardingError> {
    let address = facts.mgmt_ip.to_string();

    // Locations are provisioned out of band; onboarding never invents one.
    let location = store::get_location_by_name(conn, opts.location)?.ok_or_else(|| {
        OnboardingError::LocationNotFound {
            name: opts.location.to_string(),
        }
    })?;

    if let Some(hinted) = opts.hinted_platform {
        if !facts.vendor.is_empty() {
            let expected = manufacturer_for_platform(hinted);
            if !expected.eq_ignore_ascii_case(&facts.vendor) {
                return Err(OnboardingError::PlatformMismatch {
                    host: address,
                    hinted: hinted.to_string(),
                    reported: facts.vendor.clone(),
                });
            }
        }
    }

    let manufacturer = if facts.vendor.is_empty() {
        manufacturer_for_platform(&facts.platform)
    } else {
        facts.vendor.clone()
    };
    let (platform_id, created_platform) = store::get_or_create_platform(
        conn,
        &facts.platform,
        &manufacturer,
        &network_driver_for_platform(&facts.platform),
    )?;

    if facts.model.trim().is_empty() {
        return Err(OnboardingError::UnknownModel {
            hostname: facts.hostname.clone(),
        });
    }
    let (device_type_id, created_device_type) =
        store::get_or_create_device_type(conn, &facts.model, &manufacturer)?;

    let (device_id, created_device) = match store::find_device_by_management_ip(conn, &address)? {
        Some(device) if device.name == facts.hostname => {
            if let Some(outcome) = disabled_skip(conn, &device)? {
                return Ok(outcome);
            }
            // Facts refresh in place; the device keeps its location even
            // when the request names a different one.
            store::update_device_facts(
                conn,
                device.id,
                Some(platform_id),
                device_type_id,
                &facts.serial_number,
                opts.role,
            )?;
            (device.id, false)
        }
        Some(device) => {
            if opts.continue_on_failure {
                return Ok(ReconcileOutcome::skipped(
                    &facts.hostname,
                    format!(
                        "Skipped {}: management IP {} already belongs to {}",
                        facts.hostname, address, device.name
                    ),
                ));
            }
            return Err(OnboardingError::DeviceConflict {
                ip: address,
                existing: device.name,
                reported: facts.hostname.clone(),
            });
        }
        None => match store::get_device_by_name_and_location(conn, &facts.hostname, location.id)? {
            Some(device) => {
                if let Some(outcome) = disabled_skip(conn, &device)? {
                    return Ok(outcome);
                }
                store::update_device_facts(
                    conn,
                    device.id,
                    Some(platform_id),
                    device_type_id,
                    &facts.serial_number,
                    opts.role,
                )?;
                (device.id, false)
            }
            None => {
                let id = store::insert_device(
                    conn,
                    &store::DeviceInsert {
                        name: &facts.hostname,
                        location_id: location.id,
                        platform_id: Some(platform_id),
                        device_type_id,
                        role: opts.role.unwrap_or(&settings.default_role),
                        serial: &facts.serial_number,
                    },
                )?;
                crate::log_debug!("Created device {} at {}", facts.hostname, opts.location);
                (id, true)
            }
        },
    };

    // The address may still hang off another device's interface without
    // being anyone's primary IP. That is the same conflict.
    if let Some(ip_row) = store::get_ip_address(conn, &address)? {
        if let Some(interface_id) = ip_row.interface_id {
            if let Some(owner) = store::get_interface(conn, interface_id)? {
                if owner.device_id != device_id {
                    let owner_name = store::get_device(conn, owner.device_id)?
                        .map(|d| d.name)
                        .unwrap_or_default();
                    if opts.continue_on_failure {
                        return Ok(ReconcileOutcome::skipped(
                            &facts.hostname,
                            format!(
                                "Skipped {}: management IP {} already belongs to {}",
                                facts.hostname, address, owner_name
                            ),
                        ));
                    }
                    return Err(OnboardingError::DeviceConflict {
                        ip: address,
                        existing: owner_name,
                        reported: facts.hostname.clone(),
                    });
                }
            }
        }
    }

    let (interface_id, created_interface) =
        store::get_or_create_interface(conn, device_id, &facts.mgmt_interface, true)?;
    let (ip_id, created_ip) =
        store::get_or_create_ip_address(conn, &address, facts.prefix_length, interface_id)?;
    store::set_device_primary_ip(conn, device_id, ip_id)?;
    store::ensure_onboarding_device(conn, device_id)?;

    Ok(ReconcileOutcome {
        device_id: Some(device_id),
        device_name: facts.hostname.clone(),
        created_device,
        created_platform,
        created_device_type,
        created_interface,
        created_ip,
        skipped: None,
    })
}

fn disabled_skip(
    conn: &Connection,
    device: &DeviceRecord,
) -> Result<Option<ReconcileOutcome>, OnboardingError> {
    if let Some(marker) = store::get_onboarding_device(conn, device.id)? {
        if !marker.enabled {
            crate::log_debug!("Onboarding is disabled for {}", device.name);
            return Ok(Some(ReconcileOutcome::skipped(
                &device.name,
                format!("Onboarding is disabled for {}", device.name),
            )));
        }
    }
    Ok(None)
}
