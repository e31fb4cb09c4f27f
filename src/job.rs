//! Task runner
//!
//! Wraps the onboarding workflow with task persistence and progress
//! events. Every attempt gets an `onboarding_tasks` row that moves
//! pending -> running -> succeeded/failed and stays behind as history.
//! Failures of the workflow become failed task rows, not errors; only
//! storage problems bubble out of the runner.

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::OnboardingSettings;
use crate::detect::{PlatformProber, SshPlatformProber};
use crate::driver::DriverRegistry;
use crate::inventory::{store, Database, TaskStatus};
use crate::onboard::{run_onboarding, OnboardingRequest};

/// Progress events emitted while tasks run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JobEvent {
    /// Task row created
    TaskQueued { task_id: String, ip: String },

    /// Attempt started against the target
    TaskStarted { task_id: String, ip: String },

    /// Terminal success, including skipped attempts
    TaskSucceeded {
        task_id: String,
        hostname: Option<String>,
        message: String,
    },

    /// Terminal failure with its taxonomy slug
    TaskFailed {
        task_id: String,
        reason: String,
        message: String,
    },
}

/// Callback receiving progress events
pub type LogSink = Arc<dyn Fn(JobEvent) + Send + Sync>;

/// What one task ended as, shaped for output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub ip: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<i64>,
    pub created_device: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub message: String,
}

/// Runs onboarding requests with task rows and progress events.
#[derive(Clone)]
pub struct OnboardingRunner {
    db: Database,
    registry: Arc<DriverRegistry>,
    prober: Arc<dyn PlatformProber>,
    settings: OnboardingSettings,
    sink: Option<LogSink>,
}

impl OnboardingRunner {
    pub fn new(db: Database, settings: OnboardingSettings) -> Self {
        Self {
            db,
            registry: Arc::new(DriverRegistry::with_builtin_drivers()),
            prober: Arc::new(SshPlatformProber),
            settings,
            sink: None,
        }
    }

    /// Swap the driver registry, for custom platforms or tests.
    pub fn with_registry(mut self, registry: Arc<DriverRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Swap the platform prober, for tests.
    pub fn with_prober(mut self, prober: Arc<dyn PlatformProber>) -> Self {
        self.prober = prober;
        self
    }

    /// Attach a progress event sink.
    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run one request under a fresh task row.
    pub async fn run(&self, request: &OnboardingRequest) -> Result<TaskReport> {
        let task_id = Uuid::new_v4().to_string();

        self.with_conn(|conn| {
            store::insert_task(
                conn,
                &store::TaskInsert {
                    id: &task_id,
                    ip_address: &request.ip,
                    location: Some(&request.location),
                    platform: request.platform.as_deref(),
                    device_type: request.device_type.as_deref(),
                    role: request.role.as_deref(),
                    port: request.port_or_default(&self.settings),
                    timeout: request.timeout_or_default(&self.settings).as_secs(),
                },
            )
        })?;
        self.emit(JobEvent::TaskQueued {
            task_id: task_id.clone(),
            ip: request.ip.clone(),
        });

        self.with_conn(|conn| store::update_task_status(conn, &task_id, TaskStatus::Running))?;
        self.emit(JobEvent::TaskStarted {
            task_id: task_id.clone(),
            ip: request.ip.clone(),
        });

        match run_onboarding(
            &self.db,
            &self.registry,
            self.prober.as_ref(),
            &self.settings,
            request,
        )
        .await
        {
            Ok(outcome) => {
                // The inventory is already committed; a bookkeeping
                // failure here must not turn the attempt into an error.
                if let Err(e) = self.with_conn(|conn| {
                    store::complete_task(conn, &task_id, &outcome.message, outcome.device_id)
                }) {
                    crate::log_error!("Failed to record outcome of task {}: {:#}", task_id, e);
                }

                self.emit(JobEvent::TaskSucceeded {
                    task_id: task_id.clone(),
                    hostname: Some(outcome.hostname.clone()),
                    message: outcome.message.clone(),
                });

                Ok(TaskReport {
                    task_id,
                    ip: request.ip.clone(),
                    status: TaskStatus::Succeeded,
                    hostname: Some(outcome.hostname),
                    platform: if outcome.platform.is_empty() {
                        None
                    } else {
                        Some(outcome.platform)
                    },
                    management_cidr: if outcome.management_cidr.is_empty() {
                        None
                    } else {
                        Some(outcome.management_cidr)
                    },
                    device_id: outcome.device_id,
                    created_device: outcome.created_device,
                    failed_reason: None,
                    message: outcome.message,
                })
            }
            Err(e) => {
                let reason = e.reason();
                let message = e.to_string();
                crate::log_warn!("Onboarding {} failed: {}", request.ip, message);

                if let Err(store_err) =
                    self.with_conn(|conn| store::fail_task(conn, &task_id, reason, &message))
                {
                    crate::log_error!("Failed to record failure of task {}: {:#}", task_id, store_err);
                }

                self.emit(JobEvent::TaskFailed {
                    task_id: task_id.clone(),
                    reason: reason.to_string(),
                    message: message.clone(),
                });

                Ok(TaskReport {
                    task_id,
                    ip: request.ip.clone(),
                    status: TaskStatus::Failed,
                    hostname: None,
                    platform: None,
                    management_cidr: None,
                    device_id: None,
                    created_device: false,
                    failed_reason: Some(reason.to_string()),
                    message,
                })
            }
        }
    }

    /// Run a batch of requests with bounded concurrency. Reports come
    /// back in request order.
    pub async fn run_batch(&self, requests: Vec<OnboardingRequest>) -> Result<Vec<TaskReport>> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut handles = Vec::new();

        for request in requests {
            let runner = self.clone();
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return Err(anyhow!("Onboarding semaphore closed: {}", e)),
                };
                runner.run(&request).await
            }));
        }

        let mut reports = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(anyhow!("Onboarding worker panicked: {}", e)),
            }
        }

        Ok(reports)
    }

    fn emit(&self, event: JobEvent) {
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|_| anyhow!("Inventory connection lock poisoned"))?;
        f(&conn)
    }
}
