//! Inventory query functions
//!
//! CRUD operations for locations, platforms, devices, and onboarding tasks

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::records::*;

/// Width caps for the failure columns on onboarding tasks.
pub const FAILED_REASON_MAX: usize = 255;
pub const MESSAGE_MAX: usize = 511;

/// Parameters used to insert a device record.
pub struct DeviceInsert<'a> {
    pub name: &'a str,
    pub location_id: i64,
    pub platform_id: Option<i64>,
    pub device_type_id: i64,
    pub role: &'a str,
    pub serial: &'a str,
}

/// Parameters used to insert an onboarding task record.
pub struct TaskInsert<'a> {
    pub id: &'a str,
    pub ip_address: &'a str,
    pub location: Option<&'a str>,
    pub platform: Option<&'a str>,
    pub device_type: Option<&'a str>,
    pub role: Option<&'a str>,
    pub port: u16,
    pub timeout: u64,
}

/// Insert a location
pub fn insert_location(conn: &Connection, name: &str, description: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO locations (name, description) VALUES (?1, ?2)",
        params![name, description],
    )
    .context("Failed to insert location")?;
    Ok(conn.last_insert_rowid())
}

/// Get a location by name
pub fn get_location_by_name(conn: &Connection, name: &str) -> Result<Option<LocationRecord>> {
    conn.query_row(
        "SELECT id, name, description, created_at FROM locations WHERE name = ?1",
        params![name],
        |row| {
            Ok(LocationRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                created_at: parse_datetime_column(row.get::<_, String>(3)?, 3)?,
            })
        },
    )
    .optional()
    .context("Failed to query location by name")
}

/// Get all locations
pub fn list_locations(conn: &Connection) -> Result<Vec<LocationRecord>> {
    let mut stmt = conn
        .prepare("SELECT id, name, description, created_at FROM locations ORDER BY name")?;

    let locations = stmt
        .query_map([], |row| {
            Ok(LocationRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                created_at: parse_datetime_column(row.get::<_, String>(3)?, 3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(locations)
}

/// Get a platform by canonical name
pub fn get_platform_by_name(conn: &Connection, name: &str) -> Result<Option<PlatformRecord>> {
    conn.query_row(
        "SELECT id, name, manufacturer, network_driver, created_at FROM platforms WHERE name = ?1",
        params![name],
        |row| {
            Ok(PlatformRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                manufacturer: row.get(2)?,
                network_driver: row.get(3)?,
                created_at: parse_datetime_column(row.get::<_, String>(4)?, 4)?,
            })
        },
    )
    .optional()
    .context("Failed to query platform by name")
}

/// Get or create a platform. Returns (id, created).
pub fn get_or_create_platform(
    conn: &Connection,
    name: &str,
    manufacturer: &str,
    network_driver: &str,
) -> Result<(i64, bool)> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM platforms WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query platform")?;

    if let Some(id) = existing {
        return Ok((id, false));
    }

    conn.execute(
        "INSERT INTO platforms (name, manufacturer, network_driver) VALUES (?1, ?2, ?3)",
        params![name, manufacturer, network_driver],
    )
    .context("Failed to insert platform")?;

    Ok((conn.last_insert_rowid(), true))
}

/// Get or create a device type. Returns (id, created).
pub fn get_or_create_device_type(
    conn: &Connection,
    model: &str,
    manufacturer: &str,
) -> Result<(i64, bool)> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM device_types WHERE model = ?1 AND manufacturer = ?2",
            params![model, manufacturer],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query device type")?;

    if let Some(id) = existing {
        return Ok((id, false));
    }

    conn.execute(
        "INSERT INTO device_types (model, manufacturer) VALUES (?1, ?2)",
        params![model, manufacturer],
    )
    .context("Failed to insert device type")?;

    Ok((conn.last_insert_rowid(), true))
}

/// Find the device whose primary IP matches the given host address
pub fn find_device_by_management_ip(
    conn: &Connection,
    address: &str,
) -> Result<Option<DeviceRecord>> {
    conn.query_row(
        r#"
        SELECT d.id, d.name, d.location_id, d.platform_id, d.device_type_id,
               d.role, d.serial, d.primary_ip_id, d.created_at, d.last_updated
        FROM devices d
        JOIN ip_addresses ip ON d.primary_ip_id = ip.id
        WHERE ip.address = ?1
        "#,
        params![address],
        |row| {
            Ok(DeviceRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                location_id: row.get(2)?,
                platform_id: row.get(3)?,
                device_type_id: row.get(4)?,
                role: row.get(5)?,
                serial: row.get(6)?,
                primary_ip_id: row.get(7)?,
                created_at: parse_datetime_column(row.get::<_, String>(8)?, 8)?,
                last_updated: parse_datetime_column(row.get::<_, String>(9)?, 9)?,
            })
        },
    )
    .optional()
    .context("Failed to query device by management IP")
}

/// Get a device by id
pub fn get_device(conn: &Connection, id: i64) -> Result<Option<DeviceRecord>> {
    conn.query_row(
        r#"
        SELECT d.id, d.name, d.location_id, d.platform_id, d.device_type_id,
               d.role, d.serial, d.primary_ip_id, d.created_at, d.last_updated
        FROM devices d
        WHERE d.id = ?1
        "#,
        params![id],
        |row| {
            Ok(DeviceRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                location_id: row.get(2)?,
                platform_id: row.get(3)?,
                device_type_id: row.get(4)?,
                role: row.get(5)?,
                serial: row.get(6)?,
                primary_ip_id: row.get(7)?,
                created_at: parse_datetime_column(row.get::<_, String>(8)?, 8)?,
                last_updated: parse_datetime_column(row.get::<_, String>(9)?, 9)?,
            })
        },
    )
    .optional()
    .context("Failed to query device by id")
}

/// Get a device by name within a location
pub fn get_device_by_name_and_location(
    conn: &Connection,
    name: &str,
    location_id: i64,
) -> Result<Option<DeviceRecord>> {
    conn.query_row(
        r#"
        SELECT d.id, d.name, d.location_id, d.platform_id, d.device_type_id,
               d.role, d.serial, d.primary_ip_id, d.created_at, d.last_updated
        FROM devices d
        WHERE d.name = ?1 AND d.location_id = ?2
        "#,
        params![name, location_id],
        |row| {
            Ok(DeviceRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                location_id: row.get(2)?,
                platform_id: row.get(3)?,
                device_type_id: row.get(4)?,
                role: row.get(5)?,
                serial: row.get(6)?,
                primary_ip_id: row.get(7)?,
                created_at: parse_datetime_column(row.get::<_, String>(8)?, 8)?,
                last_updated: parse_datetime_column(row.get::<_, String>(9)?, 9)?,
            })
        },
    )
    .optional()
    .context("Failed to query device by name and location")
}

/// Insert a new device
pub fn insert_device(conn: &Connection, device: &DeviceInsert) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO devices (name, location_id, platform_id, device_type_id, role, serial)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            device.name,
            device.location_id,
            device.platform_id,
            device.device_type_id,
            device.role,
            device.serial,
        ],
    )
    .context("Failed to insert device")?;

    Ok(conn.last_insert_rowid())
}

/// Refresh the mutable fields of an existing device. The location never
/// changes here; a `None` role leaves the stored role alone.
pub fn update_device_facts(
    conn: &Connection,
    device_id: i64,
    platform_id: Option<i64>,
    device_type_id: i64,
    serial: &str,
    role: Option<&str>,
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE devices SET
            platform_id = ?2,
            device_type_id = ?3,
            serial = ?4,
            role = COALESCE(?5, role),
            last_updated = datetime('now')
        WHERE id = ?1
        "#,
        params![device_id, platform_id, device_type_id, serial, role],
    )
    .context("Failed to update device")?;

    Ok(())
}

/// Point a device at its primary IP address
pub fn set_device_primary_ip(conn: &Connection, device_id: i64, ip_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE devices SET primary_ip_id = ?2, last_updated = datetime('now') WHERE id = ?1",
        params![device_id, ip_id],
    )
    .context("Failed to set device primary IP")?;

    Ok(())
}

/// Get or create an interface on a device. Returns (id, created).
pub fn get_or_create_interface(
    conn: &Connection,
    device_id: i64,
    name: &str,
    mgmt_only: bool,
) -> Result<(i64, bool)> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM interfaces WHERE device_id = ?1 AND name = ?2",
            params![device_id, name],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query interface")?;

    if let Some(id) = existing {
        return Ok((id, false));
    }

    conn.execute(
        "INSERT INTO interfaces (device_id, name, mgmt_only) VALUES (?1, ?2, ?3)",
        params![device_id, name, if mgmt_only { 1 } else { 0 }],
    )
    .context("Failed to insert interface")?;

    Ok((conn.last_insert_rowid(), true))
}

/// Get an interface by id
pub fn get_interface(conn: &Connection, id: i64) -> Result<Option<InterfaceRecord>> {
    conn.query_row(
        "SELECT id, device_id, name, mgmt_only, created_at FROM interfaces WHERE id = ?1",
        params![id],
        |row| {
            Ok(InterfaceRecord {
                id: row.get(0)?,
                device_id: row.get(1)?,
                name: row.get(2)?,
                mgmt_only: row.get::<_, i64>(3)? != 0,
                created_at: parse_datetime_column(row.get::<_, String>(4)?, 4)?,
            })
        },
    )
    .optional()
    .context("Failed to query interface by id")
}

/// Get an IP address row by host address
pub fn get_ip_address(conn: &Connection, address: &str) -> Result<Option<IpAddressRecord>> {
    conn.query_row(
        "SELECT id, address, prefix_length, interface_id, created_at FROM ip_addresses WHERE address = ?1",
        params![address],
        |row| {
            Ok(IpAddressRecord {
                id: row.get(0)?,
                address: row.get(1)?,
                prefix_length: row.get(2)?,
                interface_id: row.get(3)?,
                created_at: parse_datetime_column(row.get::<_, String>(4)?, 4)?,
            })
        },
    )
    .optional()
    .context("Failed to query IP address")
}

/// Get or create an IP address row, reattaching it to the given interface
/// and refreshing the prefix when it already exists. Returns (id, created).
pub fn get_or_create_ip_address(
    conn: &Connection,
    address: &str,
    prefix_length: u8,
    interface_id: i64,
) -> Result<(i64, bool)> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM ip_addresses WHERE address = ?1",
            params![address],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query IP address")?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE ip_addresses SET prefix_length = ?2, interface_id = ?3 WHERE id = ?1",
            params![id, prefix_length, interface_id],
        )
        .context("Failed to update IP address")?;
        return Ok((id, false));
    }

    conn.execute(
        "INSERT INTO ip_addresses (address, prefix_length, interface_id) VALUES (?1, ?2, ?3)",
        params![address, prefix_length, interface_id],
    )
    .context("Failed to insert IP address")?;

    Ok((conn.last_insert_rowid(), true))
}

/// Get the onboarding marker for a device
pub fn get_onboarding_device(
    conn: &Connection,
    device_id: i64,
) -> Result<Option<OnboardingDeviceRecord>> {
    conn.query_row(
        "SELECT id, device_id, enabled, created_at FROM onboarding_devices WHERE device_id = ?1",
        params![device_id],
        |row| {
            Ok(OnboardingDeviceRecord {
                id: row.get(0)?,
                device_id: row.get(1)?,
                enabled: row.get::<_, i64>(2)? != 0,
                created_at: parse_datetime_column(row.get::<_, String>(3)?, 3)?,
            })
        },
    )
    .optional()
    .context("Failed to query onboarding marker")
}

/// Get or create the onboarding marker for a device. Returns (id, created).
pub fn ensure_onboarding_device(conn: &Connection, device_id: i64) -> Result<(i64, bool)> {
    if let Some(record) = get_onboarding_device(conn, device_id)? {
        return Ok((record.id, false));
    }

    conn.execute(
        "INSERT INTO onboarding_devices (device_id, enabled) VALUES (?1, 1)",
        params![device_id],
    )
    .context("Failed to insert onboarding marker")?;

    Ok((conn.last_insert_rowid(), true))
}

/// Enable or disable re-onboarding for a device. Returns false when the
/// device has no marker yet.
pub fn set_onboarding_enabled(conn: &Connection, device_id: i64, enabled: bool) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE onboarding_devices SET enabled = ?2 WHERE device_id = ?1",
            params![device_id, if enabled { 1 } else { 0 }],
        )
        .context("Failed to update onboarding marker")?;

    Ok(changed > 0)
}

/// Insert a new onboarding task in pending state
pub fn insert_task(conn: &Connection, task: &TaskInsert) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO onboarding_tasks (
            id, ip_address, location, platform, device_type, role, port, timeout, status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending')
        "#,
        params![
            task.id,
            task.ip_address,
            task.location,
            task.platform,
            task.device_type,
            task.role,
            task.port,
            task.timeout as i64,
        ],
    )
    .context("Failed to insert onboarding task")?;

    Ok(())
}

/// Move a task to a new status. Returns false when the transition would
/// move the status backwards; terminal rows are never rewritten.
pub fn update_task_status(conn: &Connection, id: &str, status: TaskStatus) -> Result<bool> {
    let current = match get_task_status(conn, id)? {
        Some(status) => status,
        None => return Ok(false),
    };

    if !current.can_transition_to(status) {
        tracing::warn!(
            "Refusing task {} status change {} -> {}",
            id,
            current,
            status
        );
        return Ok(false);
    }

    conn.execute(
        "UPDATE onboarding_tasks SET status = ?2, last_updated = datetime('now') WHERE id = ?1",
        params![id, status.as_str()],
    )
    .context("Failed to update task status")?;

    Ok(true)
}

/// Mark a task succeeded, recording the outcome message and the device it
/// created or refreshed.
pub fn complete_task(
    conn: &Connection,
    id: &str,
    message: &str,
    created_device: Option<i64>,
) -> Result<bool> {
    if !update_task_status(conn, id, TaskStatus::Succeeded)? {
        return Ok(false);
    }

    conn.execute(
        r#"
        UPDATE onboarding_tasks SET
            message = ?2,
            created_device = ?3,
            last_updated = datetime('now')
        WHERE id = ?1
        "#,
        params![id, truncate_chars(message, MESSAGE_MAX), created_device],
    )
    .context("Failed to record task outcome")?;

    Ok(true)
}

/// Mark a task failed with a reason slug and detail message
pub fn fail_task(conn: &Connection, id: &str, failed_reason: &str, message: &str) -> Result<bool> {
    if !update_task_status(conn, id, TaskStatus::Failed)? {
        return Ok(false);
    }

    conn.execute(
        r#"
        UPDATE onboarding_tasks SET
            failed_reason = ?2,
            message = ?3,
            last_updated = datetime('now')
        WHERE id = ?1
        "#,
        params![
            id,
            truncate_chars(failed_reason, FAILED_REASON_MAX),
            truncate_chars(message, MESSAGE_MAX),
        ],
    )
    .context("Failed to record task failure")?;

    Ok(true)
}

/// Get a task by id
pub fn get_task(conn: &Connection, id: &str) -> Result<Option<TaskRecord>> {
    conn.query_row(
        r#"
        SELECT id, created_at, last_updated, ip_address, location, platform,
               device_type, role, port, timeout, status, failed_reason, message,
               created_device
        FROM onboarding_tasks WHERE id = ?1
        "#,
        params![id],
        |row| {
            Ok(TaskRecord {
                id: row.get(0)?,
                created_at: parse_datetime_column(row.get::<_, String>(1)?, 1)?,
                last_updated: parse_datetime_column(row.get::<_, String>(2)?, 2)?,
                ip_address: row.get(3)?,
                location: row.get(4)?,
                platform: row.get(5)?,
                device_type: row.get(6)?,
                role: row.get(7)?,
                port: row.get(8)?,
                timeout: row.get::<_, i64>(9)? as u64,
                status: parse_task_status_or_default(&row.get::<_, String>(10)?),
                failed_reason: row.get(11)?,
                message: row.get(12)?,
                created_device: row.get(13)?,
            })
        },
    )
    .optional()
    .context("Failed to query task")
}

/// Get recent tasks, newest first
pub fn get_recent_tasks(conn: &Connection, limit: i64) -> Result<Vec<TaskRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, created_at, last_updated, ip_address, location, platform,
               device_type, role, port, timeout, status, failed_reason, message,
               created_device
        FROM onboarding_tasks
        ORDER BY created_at DESC, id
        LIMIT ?1
        "#,
    )?;

    let tasks = stmt
        .query_map(params![limit], |row| {
            Ok(TaskRecord {
                id: row.get(0)?,
                created_at: parse_datetime_column(row.get::<_, String>(1)?, 1)?,
                last_updated: parse_datetime_column(row.get::<_, String>(2)?, 2)?,
                ip_address: row.get(3)?,
                location: row.get(4)?,
                platform: row.get(5)?,
                device_type: row.get(6)?,
                role: row.get(7)?,
                port: row.get(8)?,
                timeout: row.get::<_, i64>(9)? as u64,
                status: parse_task_status_or_default(&row.get::<_, String>(10)?),
                failed_reason: row.get(11)?,
                message: row.get(12)?,
                created_device: row.get(13)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(tasks)
}

/// List all devices with their joined location, platform, and primary IP
pub fn list_devices(conn: &Connection) -> Result<Vec<DeviceSummary>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT d.id, d.name, l.name, p.name, dt.model, d.serial, d.role,
               ip.address || '/' || ip.prefix_length
        FROM devices d
        JOIN locations l ON d.location_id = l.id
        LEFT JOIN platforms p ON d.platform_id = p.id
        JOIN device_types dt ON d.device_type_id = dt.id
        LEFT JOIN ip_addresses ip ON d.primary_ip_id = ip.id
        ORDER BY l.name, d.name
        "#,
    )?;

    let devices = stmt
        .query_map([], |row| {
            Ok(DeviceSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                location: row.get(2)?,
                platform: row.get(3)?,
                model: row.get(4)?,
                serial: row.get(5)?,
                role: row.get(6)?,
                primary_ip: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(devices)
}

fn get_task_status(conn: &Connection, id: &str) -> Result<Option<TaskStatus>> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM onboarding_tasks WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query task status")?;

    Ok(status.map(|s| parse_task_status_or_default(&s)))
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn parse_datetime_column(s: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_str(&format!("{} +0000", s), "%Y-%m-%d %H:%M:%S %z")
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_task_status_or_default(s: &str) -> TaskStatus {
    match s.parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("Unknown task status in database: {}", s);
            TaskStatus::Pending
        }
    }
}
