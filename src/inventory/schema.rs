//! Inventory schema definitions
//!
//! Creates and manages the SQLite tables

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all inventory tables
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Locations: deployment sites, created out of band
        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Platforms: network operating systems, keyed by canonical slug
        CREATE TABLE IF NOT EXISTS platforms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            manufacturer TEXT NOT NULL DEFAULT '',
            network_driver TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Device types: hardware models per manufacturer
        CREATE TABLE IF NOT EXISTS device_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            model TEXT NOT NULL,
            manufacturer TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(model, manufacturer)
        );

        -- Devices: unique by (name, location)
        CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            location_id INTEGER NOT NULL,
            platform_id INTEGER,
            device_type_id INTEGER NOT NULL,
            role TEXT NOT NULL DEFAULT '',
            serial TEXT NOT NULL DEFAULT '',
            primary_ip_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            last_updated TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(name, location_id),
            FOREIGN KEY (location_id) REFERENCES locations(id),
            FOREIGN KEY (platform_id) REFERENCES platforms(id) ON DELETE SET NULL,
            FOREIGN KEY (device_type_id) REFERENCES device_types(id),
            FOREIGN KEY (primary_ip_id) REFERENCES ip_addresses(id) ON DELETE SET NULL
        );

        -- Interfaces: unique per device by name
        CREATE TABLE IF NOT EXISTS interfaces (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            mgmt_only INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(device_id, name),
            FOREIGN KEY (device_id) REFERENCES devices(id) ON DELETE CASCADE
        );

        -- IP addresses: host part is globally unique, which turns two
        -- onboardings of the same target into a deterministic conflict
        CREATE TABLE IF NOT EXISTS ip_addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address TEXT UNIQUE NOT NULL,
            prefix_length INTEGER NOT NULL,
            interface_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (interface_id) REFERENCES interfaces(id) ON DELETE SET NULL
        );

        -- Onboarding markers: one per device, enabled unless operator-disabled
        CREATE TABLE IF NOT EXISTS onboarding_devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id INTEGER UNIQUE NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (device_id) REFERENCES devices(id) ON DELETE CASCADE
        );

        -- Onboarding tasks: one row per run, kept as history
        CREATE TABLE IF NOT EXISTS onboarding_tasks (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            last_updated TEXT NOT NULL DEFAULT (datetime('now')),
            ip_address TEXT NOT NULL,
            location TEXT,
            platform TEXT,
            device_type TEXT,
            role TEXT,
            port INTEGER NOT NULL DEFAULT 22,
            timeout INTEGER NOT NULL DEFAULT 30,
            status TEXT NOT NULL DEFAULT 'pending',
            failed_reason TEXT,
            message TEXT,
            created_device INTEGER,
            FOREIGN KEY (created_device) REFERENCES devices(id) ON DELETE SET NULL
        );

        -- Indexes for performance
        CREATE INDEX IF NOT EXISTS idx_devices_location ON devices(location_id);
        CREATE INDEX IF NOT EXISTS idx_interfaces_device ON interfaces(device_id);
        CREATE INDEX IF NOT EXISTS idx_ip_addresses_interface ON ip_addresses(interface_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_created ON onboarding_tasks(created_at);
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON onboarding_tasks(status);
        "#,
    )
    .context("Failed to create inventory tables")?;

    // Backward-compatible migration for databases created before tasks carried a role.
    let has_task_role: bool = conn
        .prepare("PRAGMA table_info(onboarding_tasks)")
        .and_then(|mut stmt| {
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let col_name: String = row.get(1)?;
                if col_name == "role" {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .context("Failed to inspect onboarding_tasks table schema")?;

    if !has_task_role {
        conn.execute("ALTER TABLE onboarding_tasks ADD COLUMN role TEXT", [])
            .context("Failed to migrate onboarding_tasks table with role column")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).expect("Failed to create tables");

        // Verify tables exist
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"locations".to_string()));
        assert!(tables.contains(&"platforms".to_string()));
        assert!(tables.contains(&"device_types".to_string()));
        assert!(tables.contains(&"devices".to_string()));
        assert!(tables.contains(&"interfaces".to_string()));
        assert!(tables.contains(&"ip_addresses".to_string()));
        assert!(tables.contains(&"onboarding_devices".to_string()));
        assert!(tables.contains(&"onboarding_tasks".to_string()));
    }

    #[test]
    fn test_ip_address_uniqueness_is_global() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        conn.execute(
            "INSERT INTO ip_addresses (address, prefix_length) VALUES ('1.1.1.1', 32)",
            [],
        )
        .unwrap();

        let duplicate = conn.execute(
            "INSERT INTO ip_addresses (address, prefix_length) VALUES ('1.1.1.1', 24)",
            [],
        );
        assert!(duplicate.is_err(), "same host address must be rejected");
    }

    #[test]
    fn test_legacy_tasks_schema_migrates_role_column() {
        let conn = Connection::open_in_memory().unwrap();

        // Simulate an older tasks schema without role.
        conn.execute_batch(
            r#"
            CREATE TABLE onboarding_tasks (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                last_updated TEXT NOT NULL DEFAULT (datetime('now')),
                ip_address TEXT NOT NULL,
                location TEXT,
                platform TEXT,
                device_type TEXT,
                port INTEGER NOT NULL DEFAULT 22,
                timeout INTEGER NOT NULL DEFAULT 30,
                status TEXT NOT NULL DEFAULT 'pending',
                failed_reason TEXT,
                message TEXT,
                created_device INTEGER
            );
            "#,
        )
        .unwrap();

        create_tables(&conn).expect("Legacy schema migration should succeed");

        let has_role: bool = conn
            .prepare("PRAGMA table_info(onboarding_tasks)")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .filter_map(|r| r.ok())
            .any(|name| name == "role");

        assert!(has_role, "onboarding_tasks.role should be added for legacy DBs");
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let orphan = conn.execute(
            "INSERT INTO devices (name, location_id, device_type_id) VALUES ('sw1', 999, 999)",
            [],
        );
        assert!(orphan.is_err(), "dangling foreign keys must be rejected");
    }
}
