//! netonboard — Network Device Onboarding CLI
//!
//! Takes a target address plus credentials and turns it into inventory:
//! - TCP reachability probe
//! - Platform detection (hint normalization or SSH autodetection)
//! - Vendor fact collection over SSH
//! - Idempotent reconciliation into the local SQLite inventory

use anyhow::{Context, Result};
use std::sync::Arc;

use netonboard::config::OnboardingSettings;
use netonboard::credentials::Credentials;
use netonboard::inventory::{self, Database, TaskStatus};
use netonboard::job::{JobEvent, LogSink, OnboardingRunner};
use netonboard::onboard::OnboardingRequest;

mod cli;

use cli::{parse_cli_args, usage_text, version_text, CliCommand};

/// Logs a message to stderr
macro_rules! log_stderr {
    ($($arg:tt)*) => {
        netonboard::log_stderr!($($arg)*);
    };
}

/// Logs an error message to stderr
macro_rules! log_error {
    ($($arg:tt)*) => {
        netonboard::log_error!($($arg)*);
    };
}

#[tokio::main]
async fn main() {
    if let Err(e) = netonboard::logging::init_logging() {
        eprintln!("[WARN] Failed to initialize structured logging: {}", e);
    }

    match run(std::env::args()).await {
        Ok(()) => {}
        Err(e) => {
            log_error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn open_database(settings: &OnboardingSettings) -> Result<Database> {
    let path = match &settings.database_path {
        Some(path) => path.clone(),
        None => Database::default_path(),
    };
    Database::new(path)
}

/// Progress sink that mirrors task events onto stderr while the JSON
/// report stays on stdout.
fn stderr_sink() -> LogSink {
    Arc::new(|event: JobEvent| match event {
        JobEvent::TaskQueued { task_id, ip } => {
            netonboard::log_stderr!("Task {} queued for {}", task_id, ip);
        }
        JobEvent::TaskStarted { task_id, ip } => {
            netonboard::log_stderr!("Task {} connecting to {}", task_id, ip);
        }
        JobEvent::TaskSucceeded { message, .. } => {
            netonboard::log_stderr!("{}", message);
        }
        JobEvent::TaskFailed {
            task_id,
            reason,
            message,
        } => {
            netonboard::log_error!("Task {} failed ({}): {}", task_id, reason, message);
        }
    })
}

fn resolve_credentials(
    settings: &OnboardingSettings,
    username: Option<String>,
    password: Option<String>,
    secret: Option<String>,
) -> Result<Credentials> {
    let mut credentials = match (username, password) {
        (Some(user), Some(pass)) => Credentials::new(user, pass),
        (None, None) => settings.default_credentials.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "No credentials provided. Pass --username/--password or set \
                 NETONBOARD_USERNAME and NETONBOARD_PASSWORD."
            )
        })?,
        _ => {
            return Err(anyhow::anyhow!(
                "--username and --password must be provided together.\n\n{}",
                usage_text()
            ));
        }
    };
    if secret.is_some() {
        credentials.secret = secret;
    }
    Ok(credentials)
}

/// Main entry point
async fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    match parse_cli_args(args)? {
        CliCommand::Help => {
            println!("{}", usage_text());
            Ok(())
        }
        CliCommand::Version => {
            println!("{}", version_text());
            Ok(())
        }
        CliCommand::Locations { add, description } => {
            let settings = OnboardingSettings::from_env();
            let db = open_database(&settings)?;
            let conn_arc = db.connection();
            let conn = conn_arc
                .lock()
                .map_err(|_| anyhow::anyhow!("Inventory connection lock poisoned"))?;

            if let Some(name) = add {
                let id = inventory::insert_location(&conn, &name, description.as_deref())?;
                log_stderr!("Created location {} (id {})", name, id);
            }

            let locations = inventory::list_locations(&conn)?;
            if locations.is_empty() {
                println!("No locations found. Add one with: netonboard locations --add <NAME>");
            } else {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&locations)
                        .context("Failed to serialize locations")?
                );
            }
            Ok(())
        }
        CliCommand::Devices => {
            let settings = OnboardingSettings::from_env();
            let db = open_database(&settings)?;
            let conn_arc = db.connection();
            let conn = conn_arc
                .lock()
                .map_err(|_| anyhow::anyhow!("Inventory connection lock poisoned"))?;

            let devices = inventory::list_devices(&conn)?;
            if devices.is_empty() {
                println!("No devices found.");
            } else {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&devices)
                        .context("Failed to serialize devices")?
                );
            }
            Ok(())
        }
        CliCommand::Tasks { limit } => {
            let settings = OnboardingSettings::from_env();
            let db = open_database(&settings)?;
            let conn_arc = db.connection();
            let conn = conn_arc
                .lock()
                .map_err(|_| anyhow::anyhow!("Inventory connection lock poisoned"))?;

            let tasks = inventory::get_recent_tasks(&conn, limit)?;
            if tasks.is_empty() {
                println!("No onboarding tasks recorded.");
            } else {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&tasks).context("Failed to serialize tasks")?
                );
            }
            Ok(())
        }
        CliCommand::Onboard {
            ips,
            location,
            username,
            password,
            secret,
            platform,
            device_type,
            role,
            port,
            timeout,
            concurrency,
            continue_on_failure,
        } => {
            log_stderr!(
                "netonboard v{} onboarding {} target(s) into location '{}'",
                env!("CARGO_PKG_VERSION"),
                ips.len(),
                location
            );

            let mut settings = OnboardingSettings::from_env();
            if let Some(value) = concurrency {
                settings.concurrency = value;
            }
            let credentials = resolve_credentials(&settings, username, password, secret)?;
            let db = open_database(&settings)?;

            let requests: Vec<OnboardingRequest> = ips
                .iter()
                .map(|ip| {
                    let mut request = OnboardingRequest::new(ip, &location, credentials.clone());
                    request.platform = platform.clone();
                    request.device_type = device_type.clone();
                    request.role = role.clone();
                    request.port = port;
                    request.timeout_secs = timeout;
                    request.continue_on_failure = continue_on_failure;
                    request
                })
                .collect();

            let runner = OnboardingRunner::new(db, settings).with_sink(stderr_sink());
            let reports = if requests.len() == 1 {
                vec![runner.run(&requests[0]).await?]
            } else {
                runner.run_batch(requests).await?
            };

            println!(
                "{}",
                serde_json::to_string_pretty(&reports)
                    .context("Failed to serialize onboarding reports")?
            );

            let failed = reports
                .iter()
                .filter(|r| r.status == TaskStatus::Failed)
                .count();
            if failed > 0 {
                return Err(anyhow::anyhow!(
                    "{} of {} onboarding attempt(s) failed",
                    failed,
                    reports.len()
                ));
            }
            Ok(())
        }
    }
}
