use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;

use netonboard::config::OnboardingSettings;
use netonboard::detect::PlatformProber;
use netonboard::driver::{DriverRegistry, DriverTarget, NetworkDriver};
use netonboard::error::OnboardingError;
use netonboard::facts::{InterfacesIp, IpAttributes, RawFacts};
use netonboard::inventory::{self, Database, TaskStatus};
use netonboard::job::{JobEvent, LogSink, OnboardingRunner};
use netonboard::onboard::OnboardingRequest;
use netonboard::Credentials;

const ARISTA_SHOW_VERSION: &str = "Arista vEOS\n\
Hardware version:    \n\
Software image version: 4.15.5M\n\
Architecture:           i386\n";

fn test_settings() -> OnboardingSettings {
    let mut platform_map = HashMap::new();
    for (alias, canonical) in [
        ("ios", "cisco_ios"),
        ("eos", "arista_eos"),
        ("nxos", "cisco_nxos"),
        ("junos", "juniper_junos"),
    ] {
        platform_map.insert(alias.to_string(), canonical.to_string());
    }
    OnboardingSettings {
        platform_map,
        device_type_map: HashMap::new(),
        default_credentials: None,
        default_port: 22,
        default_timeout_secs: 5,
        default_role: "network".to_string(),
        database_path: None,
        concurrency: 4,
    }
}

/// Counts driver session activity across every driver a registry builds.
#[derive(Clone, Default)]
struct DriverLedger {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

struct ScriptedDriver {
    facts: RawFacts,
    interfaces_ip: InterfacesIp,
    fail_facts: bool,
    ledger: DriverLedger,
}

#[async_trait]
impl NetworkDriver for ScriptedDriver {
    async fn open(&mut self) -> Result<(), OnboardingError> {
        self.ledger.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), OnboardingError> {
        self.ledger.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_facts(&mut self) -> Result<RawFacts, OnboardingError> {
        if self.fail_facts {
            return Err(OnboardingError::Driver {
                host: "127.0.0.1".to_string(),
                detail: "show version returned an error".to_string(),
            });
        }
        Ok(self.facts.clone())
    }

    async fn get_interfaces_ip(&mut self) -> Result<InterfacesIp, OnboardingError> {
        Ok(self.interfaces_ip.clone())
    }
}

fn eos_facts(hostname: &str, serial: &str) -> RawFacts {
    RawFacts {
        hostname: hostname.to_string(),
        fqdn: format!("{}.domain.net", hostname),
        vendor: "Arista".to_string(),
        model: "vEOS".to_string(),
        serial_number: serial.to_string(),
        os_version: "4.15.5M-3054042.4155M".to_string(),
        uptime_seconds: None,
        interface_list: vec!["Vlan100".to_string()],
    }
}

/// Registry whose single driver reports the target's own address as the
/// management IP on Vlan100, so any listener address flows end to end.
fn scripted_registry(
    platform: &str,
    facts_for: impl Fn(&DriverTarget) -> RawFacts + Send + Sync + 'static,
    ledger: DriverLedger,
    fail_facts: bool,
) -> Arc<DriverRegistry> {
    let facts_for = Arc::new(facts_for);
    let mut registry = DriverRegistry::new();
    registry.register(
        platform,
        Arc::new(move |target| {
            let mut addresses = HashMap::new();
            addresses.insert(
                target.host.to_string(),
                IpAttributes { prefix_length: 32 },
            );
            let mut families = HashMap::new();
            families.insert("ipv4".to_string(), addresses);
            let mut interfaces_ip = HashMap::new();
            interfaces_ip.insert("Vlan100".to_string(), families);

            Box::new(ScriptedDriver {
                facts: facts_for(target),
                interfaces_ip,
                fail_facts,
                ledger: ledger.clone(),
            }) as Box<dyn NetworkDriver>
        }),
    );
    Arc::new(registry)
}

struct ScriptedProber {
    version_output: String,
    version_calls: Arc<AtomicUsize>,
}

impl ScriptedProber {
    fn new(version_output: &str) -> (Self, Arc<AtomicUsize>) {
        let version_calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                version_output: version_output.to_string(),
                version_calls: Arc::clone(&version_calls),
            },
            version_calls,
        )
    }
}

#[async_trait]
impl PlatformProber for ScriptedProber {
    async fn read_banner(
        &self,
        _host: IpAddr,
        _port: u16,
        _timeout: Duration,
    ) -> Result<Option<String>, OnboardingError> {
        Ok(None)
    }

    async fn run_show_version(&self, _target: &DriverTarget) -> Result<String, OnboardingError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.version_output.clone())
    }
}

async fn local_listener(addr: &str) -> (TcpListener, u16) {
    let listener = TcpListener::bind((addr, 0))
        .await
        .expect("test listener should bind");
    let port = listener
        .local_addr()
        .expect("test listener should report its address")
        .port();
    (listener, port)
}

fn seed_location(db: &Database, name: &str) {
    let conn = db.connection();
    let conn = conn.lock().expect("inventory lock should not be poisoned");
    inventory::insert_location(&conn, name, Some("integration test site"))
        .expect("location should insert");
}

fn count(db: &Database, table: &str) -> i64 {
    let conn = db.connection();
    let conn = conn.lock().expect("inventory lock should not be poisoned");
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .expect("count query should work")
}

fn capture_sink() -> (LogSink, Arc<Mutex<Vec<JobEvent>>>) {
    let events: Arc<Mutex<Vec<JobEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&events);
    let sink: LogSink = Arc::new(move |event| {
        captured
            .lock()
            .expect("event lock should not be poisoned")
            .push(event);
    });
    (sink, events)
}

fn request(ip: &str, port: u16) -> OnboardingRequest {
    let mut request = OnboardingRequest::new(ip, "lab", Credentials::new("admin", "admin"));
    request.port = Some(port);
    request
}

#[tokio::test]
async fn onboarding_creates_device_then_second_run_updates_in_place() {
    let db = Database::in_memory().expect("in-memory inventory should initialize");
    seed_location(&db, "lab");
    let (listener, port) = local_listener("127.0.0.1").await;
    let _keep_listening = listener;

    let ledger = DriverLedger::default();
    let (prober, version_calls) = ScriptedProber::new(ARISTA_SHOW_VERSION);
    let (sink, events) = capture_sink();
    let runner = OnboardingRunner::new(db.clone(), test_settings())
        .with_registry(scripted_registry(
            "arista_eos",
            |_| eos_facts("arista-device", ""),
            ledger.clone(),
            false,
        ))
        .with_prober(Arc::new(prober))
        .with_sink(sink);

    // First run: no platform hint, so detection must consult the prober.
    let report = runner
        .run(&request("127.0.0.1", port))
        .await
        .expect("first onboarding run should not error");
    assert_eq!(report.status, TaskStatus::Succeeded);
    assert_eq!(report.hostname.as_deref(), Some("arista-device"));
    assert_eq!(report.platform.as_deref(), Some("arista_eos"));
    assert_eq!(report.management_cidr.as_deref(), Some("127.0.0.1/32"));
    assert!(report.created_device, "first run must create the device");
    assert_eq!(
        report.message,
        "Successfully onboarded arista-device with a management IP of 127.0.0.1"
    );
    assert_eq!(
        version_calls.load(Ordering::SeqCst),
        1,
        "detection should run exactly once"
    );
    assert_eq!(ledger.opened.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.closed.load(Ordering::SeqCst), 1);

    for table in [
        "devices",
        "interfaces",
        "ip_addresses",
        "platforms",
        "device_types",
        "onboarding_devices",
    ] {
        assert_eq!(count(&db, table), 1, "{} should have one row", table);
    }

    {
        let events = events.lock().expect("event lock should not be poisoned");
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], JobEvent::TaskQueued { .. }));
        assert!(matches!(events[1], JobEvent::TaskStarted { .. }));
        assert!(matches!(
            events[2],
            JobEvent::TaskSucceeded { ref hostname, .. }
                if hostname.as_deref() == Some("arista-device")
        ));
    }

    // Second run: platform hint plus a freshly reported serial. The hint
    // is an alias that must normalize, detection must not run again, and
    // the device row must be updated instead of duplicated.
    let ledger_second = DriverLedger::default();
    let (prober_second, version_calls_second) = ScriptedProber::new(ARISTA_SHOW_VERSION);
    let runner_second = OnboardingRunner::new(db.clone(), test_settings())
        .with_registry(scripted_registry(
            "arista_eos",
            |_| eos_facts("arista-device", "ZZ0123456789"),
            ledger_second.clone(),
            false,
        ))
        .with_prober(Arc::new(prober_second));

    let mut second = request("127.0.0.1", port);
    second.platform = Some("eos".to_string());
    let report_second = runner_second
        .run(&second)
        .await
        .expect("second onboarding run should not error");
    assert_eq!(report_second.status, TaskStatus::Succeeded);
    assert!(
        !report_second.created_device,
        "second run must update, not create"
    );
    assert_eq!(report_second.device_id, report.device_id);
    assert_eq!(
        version_calls_second.load(Ordering::SeqCst),
        0,
        "a platform hint must skip detection"
    );

    assert_eq!(count(&db, "devices"), 1);
    assert_eq!(count(&db, "ip_addresses"), 1);
    assert_eq!(count(&db, "onboarding_tasks"), 2);

    let conn = db.connection();
    let conn = conn.lock().expect("inventory lock should not be poisoned");
    let devices = inventory::list_devices(&conn).expect("device listing should work");
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].serial, "ZZ0123456789");
    assert_eq!(devices[0].primary_ip.as_deref(), Some("127.0.0.1/32"));
}

#[tokio::test]
async fn driver_failure_marks_task_failed_and_still_closes_the_session() {
    let db = Database::in_memory().expect("in-memory inventory should initialize");
    seed_location(&db, "lab");
    let (listener, port) = local_listener("127.0.0.1").await;
    let _keep_listening = listener;

    let ledger = DriverLedger::default();
    let (prober, _) = ScriptedProber::new(ARISTA_SHOW_VERSION);
    let runner = OnboardingRunner::new(db.clone(), test_settings())
        .with_registry(scripted_registry(
            "arista_eos",
            |_| eos_facts("arista-device", ""),
            ledger.clone(),
            true,
        ))
        .with_prober(Arc::new(prober));

    let report = runner
        .run(&request("127.0.0.1", port))
        .await
        .expect("runner should report the failure, not error");
    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.failed_reason.as_deref(), Some("fail-execute"));
    assert_eq!(
        ledger.opened.load(Ordering::SeqCst),
        1,
        "session should have been opened"
    );
    assert_eq!(
        ledger.closed.load(Ordering::SeqCst),
        1,
        "session must be closed even when fact collection fails"
    );
    assert_eq!(count(&db, "devices"), 0, "no device may be created");

    let conn = db.connection();
    let conn = conn.lock().expect("inventory lock should not be poisoned");
    let task = inventory::get_task(&conn, &report.task_id)
        .expect("task lookup should work")
        .expect("task row should exist");
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.failed_reason.as_deref(), Some("fail-execute"));
}

#[tokio::test]
async fn conflicting_hostname_fails_then_continue_on_failure_skips() {
    let db = Database::in_memory().expect("in-memory inventory should initialize");
    seed_location(&db, "lab");
    let (listener, port) = local_listener("127.0.0.1").await;
    let _keep_listening = listener;

    let runner = OnboardingRunner::new(db.clone(), test_settings())
        .with_registry(scripted_registry(
            "arista_eos",
            |_| eos_facts("arista-device", ""),
            DriverLedger::default(),
            false,
        ))
        .with_prober(Arc::new(ScriptedProber::new(ARISTA_SHOW_VERSION).0));
    let report = runner
        .run(&request("127.0.0.1", port))
        .await
        .expect("seeding run should not error");
    assert_eq!(report.status, TaskStatus::Succeeded);

    // A different hostname claiming the same management IP is a conflict.
    let conflicting = OnboardingRunner::new(db.clone(), test_settings())
        .with_registry(scripted_registry(
            "arista_eos",
            |_| eos_facts("other-device", ""),
            DriverLedger::default(),
            false,
        ))
        .with_prober(Arc::new(ScriptedProber::new(ARISTA_SHOW_VERSION).0));
    let report = conflicting
        .run(&request("127.0.0.1", port))
        .await
        .expect("conflicting run should report failure, not error");
    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.failed_reason.as_deref(), Some("fail-device-conflict"));
    assert_eq!(count(&db, "devices"), 1, "conflict must not create rows");

    // With continue_on_failure the same conflict becomes a recorded skip.
    let mut tolerant = request("127.0.0.1", port);
    tolerant.continue_on_failure = true;
    let report = conflicting
        .run(&tolerant)
        .await
        .expect("tolerant run should not error");
    assert_eq!(report.status, TaskStatus::Succeeded);
    assert!(!report.created_device);
    assert!(report.device_id.is_none());
    assert!(
        report.message.contains("already belongs to"),
        "skip message should name the conflict: {}",
        report.message
    );
    assert_eq!(count(&db, "devices"), 1);

    let conn = db.connection();
    let conn = conn.lock().expect("inventory lock should not be poisoned");
    let devices = inventory::list_devices(&conn).expect("device listing should work");
    assert_eq!(
        devices[0].name, "arista-device",
        "the original device must keep its name"
    );
}

#[tokio::test]
async fn unreachable_target_fails_before_any_driver_contact() {
    let db = Database::in_memory().expect("in-memory inventory should initialize");
    seed_location(&db, "lab");

    // Bind and immediately drop to get a port that refuses connections.
    let (listener, port) = local_listener("127.0.0.1").await;
    drop(listener);

    let ledger = DriverLedger::default();
    let (prober, version_calls) = ScriptedProber::new(ARISTA_SHOW_VERSION);
    let runner = OnboardingRunner::new(db.clone(), test_settings())
        .with_registry(scripted_registry(
            "arista_eos",
            |_| eos_facts("arista-device", ""),
            ledger.clone(),
            false,
        ))
        .with_prober(Arc::new(prober));

    let report = runner
        .run(&request("127.0.0.1", port))
        .await
        .expect("runner should report the failure, not error");
    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.failed_reason.as_deref(), Some("fail-connect"));
    assert_eq!(
        version_calls.load(Ordering::SeqCst),
        0,
        "detection must not run against an unreachable target"
    );
    assert_eq!(
        ledger.opened.load(Ordering::SeqCst),
        0,
        "no driver session may be opened"
    );
}

#[tokio::test]
async fn unsupported_platform_hint_fails_with_driver_reason() {
    let db = Database::in_memory().expect("in-memory inventory should initialize");
    seed_location(&db, "lab");
    let (listener, port) = local_listener("127.0.0.1").await;
    let _keep_listening = listener;

    let ledger = DriverLedger::default();
    let (prober, _) = ScriptedProber::new(ARISTA_SHOW_VERSION);
    let runner = OnboardingRunner::new(db.clone(), test_settings())
        .with_registry(scripted_registry(
            "arista_eos",
            |_| eos_facts("arista-device", ""),
            ledger.clone(),
            false,
        ))
        .with_prober(Arc::new(prober));

    let mut hinted = request("127.0.0.1", port);
    hinted.platform = Some("mikrotik_routeros".to_string());
    let report = runner
        .run(&hinted)
        .await
        .expect("runner should report the failure, not error");
    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.failed_reason.as_deref(), Some("fail-driver"));
    assert!(report.message.contains("mikrotik_routeros"));
    assert_eq!(
        ledger.opened.load(Ordering::SeqCst),
        0,
        "no session may be opened for an unsupported platform"
    );
}

#[tokio::test]
async fn batch_onboards_multiple_loopback_targets() {
    let db = Database::in_memory().expect("in-memory inventory should initialize");
    seed_location(&db, "lab");
    let (listener_one, port_one) = local_listener("127.0.0.1").await;
    let (listener_two, port_two) = local_listener("127.0.0.2").await;
    let _keep_one = listener_one;
    let _keep_two = listener_two;

    // Hostname derives from the target address so the two devices stay
    // distinct in the inventory.
    let registry = scripted_registry(
        "arista_eos",
        |target| {
            let suffix = target.host.to_string().replace('.', "-");
            eos_facts(&format!("sw-{}", suffix), "")
        },
        DriverLedger::default(),
        false,
    );
    let (prober, _) = ScriptedProber::new(ARISTA_SHOW_VERSION);
    let runner = OnboardingRunner::new(db.clone(), test_settings())
        .with_registry(registry)
        .with_prober(Arc::new(prober));

    let reports = runner
        .run_batch(vec![
            request("127.0.0.1", port_one),
            request("127.0.0.2", port_two),
        ])
        .await
        .expect("batch run should not error");

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].ip, "127.0.0.1");
    assert_eq!(reports[1].ip, "127.0.0.2");
    assert!(reports.iter().all(|r| r.status == TaskStatus::Succeeded));
    assert_eq!(reports[0].hostname.as_deref(), Some("sw-127-0-0-1"));
    assert_eq!(reports[1].hostname.as_deref(), Some("sw-127-0-0-2"));

    assert_eq!(count(&db, "devices"), 2);
    assert_eq!(count(&db, "ip_addresses"), 2);
    assert_eq!(count(&db, "onboarding_tasks"), 2);
}
