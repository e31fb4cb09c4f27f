use std::collections::HashMap;

use netonboard::config::OnboardingSettings;
use netonboard::facts::CanonicalFacts;
use netonboard::inventory::{self, Database, TaskStatus};
use netonboard::reconcile::{reconcile_device, ReconcileOptions};

fn test_settings() -> OnboardingSettings {
    OnboardingSettings {
        platform_map: HashMap::new(),
        device_type_map: HashMap::new(),
        default_credentials: None,
        default_port: 22,
        default_timeout_secs: 5,
        default_role: "network".to_string(),
        database_path: None,
        concurrency: 4,
    }
}

fn eos_canonical_facts() -> CanonicalFacts {
    CanonicalFacts {
        hostname: "arista-device".to_string(),
        platform: "arista_eos".to_string(),
        vendor: "Arista".to_string(),
        model: "vEOS".to_string(),
        serial_number: String::new(),
        os_version: "4.15.5M-3054042.4155M".to_string(),
        mgmt_interface: "Vlan100".to_string(),
        mgmt_ip: "1.1.1.1".parse().expect("literal address should parse"),
        prefix_length: 32,
    }
}

fn options(location: &str) -> ReconcileOptions<'_> {
    ReconcileOptions {
        location,
        role: None,
        hinted_platform: None,
        continue_on_failure: false,
    }
}

fn count(conn: &rusqlite::Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .expect("count query should work")
}

#[test]
fn storage_failure_mid_transaction_leaves_no_partial_rows() {
    let db = Database::in_memory().expect("in-memory inventory should initialize");
    let conn = db.connection();
    let conn = conn.lock().expect("inventory lock should not be poisoned");
    inventory::insert_location(&conn, "lab", None).expect("location should insert");

    // Fail the IP insert, which happens after the platform, device type,
    // device, and interface have all been written inside the savepoint.
    conn.execute_batch(
        "CREATE TRIGGER block_ip_inserts BEFORE INSERT ON ip_addresses
         BEGIN
             SELECT RAISE(FAIL, 'simulated storage failure');
         END;",
    )
    .expect("trigger should install");

    let err = reconcile_device(
        &conn,
        &eos_canonical_facts(),
        &options("lab"),
        &test_settings(),
    )
    .expect_err("reconciliation must fail while the trigger is active");
    assert_eq!(err.reason(), "fail-general");

    for table in [
        "devices",
        "interfaces",
        "ip_addresses",
        "platforms",
        "device_types",
        "onboarding_devices",
    ] {
        assert_eq!(
            count(&conn, table),
            0,
            "{} must be empty after the rollback",
            table
        );
    }

    // With the fault removed the same facts reconcile cleanly, proving
    // the savepoint released without wedging the connection.
    conn.execute_batch("DROP TRIGGER block_ip_inserts;")
        .expect("trigger should drop");

    let outcome = reconcile_device(
        &conn,
        &eos_canonical_facts(),
        &options("lab"),
        &test_settings(),
    )
    .expect("reconciliation should succeed once the fault is gone");
    assert!(outcome.created_device);
    assert!(outcome.skipped.is_none());

    for table in ["devices", "interfaces", "ip_addresses", "platforms"] {
        assert_eq!(count(&conn, table), 1, "{} should have one row", table);
    }
}

#[test]
fn repeated_reconciliation_is_idempotent_row_for_row() {
    let db = Database::in_memory().expect("in-memory inventory should initialize");
    let conn = db.connection();
    let conn = conn.lock().expect("inventory lock should not be poisoned");
    inventory::insert_location(&conn, "lab", None).expect("location should insert");

    let first = reconcile_device(
        &conn,
        &eos_canonical_facts(),
        &options("lab"),
        &test_settings(),
    )
    .expect("first reconciliation should succeed");
    assert!(first.created_device);
    assert!(first.created_platform);
    assert!(first.created_ip);

    let second = reconcile_device(
        &conn,
        &eos_canonical_facts(),
        &options("lab"),
        &test_settings(),
    )
    .expect("second reconciliation should succeed");
    assert!(!second.created_device);
    assert!(!second.created_platform);
    assert!(!second.created_ip);
    assert_eq!(second.device_id, first.device_id);

    for table in [
        "devices",
        "interfaces",
        "ip_addresses",
        "platforms",
        "device_types",
        "onboarding_devices",
    ] {
        assert_eq!(
            count(&conn, table),
            1,
            "{} must not grow on a repeat run",
            table
        );
    }
}

#[test]
fn task_rows_only_move_forward_through_the_lifecycle() {
    let db = Database::in_memory().expect("in-memory inventory should initialize");
    let conn = db.connection();
    let conn = conn.lock().expect("inventory lock should not be poisoned");

    inventory::insert_task(
        &conn,
        &inventory::TaskInsert {
            id: "task-1",
            ip_address: "192.0.2.7",
            location: Some("lab"),
            platform: None,
            device_type: None,
            role: None,
            port: 22,
            timeout: 30,
        },
    )
    .expect("task should insert");

    let task = inventory::get_task(&conn, "task-1")
        .expect("task lookup should work")
        .expect("task row should exist");
    assert_eq!(task.status, TaskStatus::Pending);

    assert!(inventory::update_task_status(&conn, "task-1", TaskStatus::Running)
        .expect("pending -> running should be allowed"));
    assert!(inventory::fail_task(&conn, "task-1", "fail-connect", "device unreachable")
        .expect("running -> failed should be allowed"));

    // Terminal rows are history; nothing may rewrite them.
    assert!(
        !inventory::update_task_status(&conn, "task-1", TaskStatus::Running)
            .expect("refused transition should not error")
    );
    assert!(
        !inventory::complete_task(&conn, "task-1", "late success", None)
            .expect("refused completion should not error")
    );

    let task = inventory::get_task(&conn, "task-1")
        .expect("task lookup should work")
        .expect("task row should exist");
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.failed_reason.as_deref(), Some("fail-connect"));
    assert_eq!(task.message.as_deref(), Some("device unreachable"));
}
