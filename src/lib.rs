//! netonboard — Network Device Onboarding Engine
//!
//! This crate turns a reachable network device into inventory records:
//! - TCP reachability probing
//! - Platform detection (alias normalization or SSH fingerprinting)
//! - Vendor fact collection through per-platform drivers
//! - Fact normalization into one canonical shape
//! - Idempotent reconciliation into a SQLite inventory
//! - Task tracking with progress events

pub mod config;
pub mod credentials;
pub mod detect;
pub mod driver;
pub mod error;
pub mod facts;
pub mod inventory;
pub mod job;
pub mod logging;
pub mod onboard;
pub mod probe;
pub mod reconcile;

pub use config::*;
pub use credentials::Credentials;
pub use detect::{detect_platform, PlatformProber, SshPlatformProber};
pub use driver::{DriverFactory, DriverRegistry, DriverTarget, NetworkDriver};
pub use error::OnboardingError;
pub use facts::{normalize, CanonicalFacts, InterfacesIp, IpAttributes, RawFacts};
pub use inventory::{Database, DeviceSummary, TaskRecord, TaskStatus};
pub use job::{JobEvent, LogSink, OnboardingRunner, TaskReport};
pub use onboard::{run_onboarding, OnboardingOutcome, OnboardingRequest};
pub use probe::probe_reachable;
pub use reconcile::{reconcile_device, ReconcileOptions, ReconcileOutcome};

// Re-export logging macros for use across crate
pub use crate::logging::macros;
