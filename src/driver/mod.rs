//! Vendor driver layer
//!
//! `NetworkDriver` is the four-operation capability surface the workflow
//! consumes; `DriverRegistry` maps a canonical platform name to a driver
//! factory. The shipped drivers speak CLI over SSH and parse their own
//! vendor output.

pub mod eos;
pub mod ios;
pub mod junos;
pub mod nxos;
pub mod ssh;

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::Credentials;
use crate::error::OnboardingError;
use crate::facts::{InterfacesIp, RawFacts};

pub use eos::EosDriver;
pub use ios::IosDriver;
pub use junos::JunosDriver;
pub use nxos::NxosDriver;
pub use ssh::{CommandOutput, SshClient, SshError, SshSession};

/// Connection coordinates for one onboarding attempt.
#[derive(Debug, Clone)]
pub struct DriverTarget {
    pub host: IpAddr,
    pub port: u16,
    pub credentials: Credentials,
    pub timeout: Duration,
}

/// Vendor capability surface: exactly one session per attempt, opened
/// before the fact calls and closed on every exit path.
#[async_trait]
pub trait NetworkDriver: Send + Sync {
    async fn open(&mut self) -> Result<(), OnboardingError>;
    async fn close(&mut self) -> Result<(), OnboardingError>;
    async fn get_facts(&mut self) -> Result<RawFacts, OnboardingError>;
    async fn get_interfaces_ip(&mut self) -> Result<InterfacesIp, OnboardingError>;
}

/// Builds a driver for a target; registered per canonical platform name.
pub type DriverFactory = Arc<dyn Fn(&DriverTarget) -> Box<dyn NetworkDriver> + Send + Sync>;

/// Platform name -> driver factory.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Empty registry, for callers that wire their own drivers.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the shipped CLI-over-SSH drivers.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(
            "arista_eos",
            Arc::new(|target| Box::new(EosDriver::new(target.clone()))),
        );
        registry.register(
            "cisco_ios",
            Arc::new(|target| Box::new(IosDriver::new(target.clone()))),
        );
        registry.register(
            "cisco_nxos",
            Arc::new(|target| Box::new(NxosDriver::new(target.clone()))),
        );
        registry.register(
            "juniper_junos",
            Arc::new(|target| Box::new(JunosDriver::new(target.clone()))),
        );
        registry
    }

    /// Register or replace the factory for a platform.
    pub fn register(&mut self, platform: &str, factory: DriverFactory) {
        self.factories.insert(platform.to_string(), factory);
    }

    pub fn supports(&self, platform: &str) -> bool {
        self.factories.contains_key(platform)
    }

    /// Sorted list of registered platform names.
    pub fn platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a driver for `platform`, or fail with the unsupported
    /// platform error.
    pub fn resolve(
        &self,
        platform: &str,
        target: &DriverTarget,
    ) -> Result<Box<dyn NetworkDriver>, OnboardingError> {
        match self.factories.get(platform) {
            Some(factory) => Ok(factory(target)),
            None => Err(OnboardingError::UnsupportedPlatform {
                platform: platform.to_string(),
            }),
        }
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin_drivers()
    }
}

/// Map a transport failure into the driver error for `host`.
pub(crate) fn driver_error(host: IpAddr, e: SshError) -> OnboardingError {
    OnboardingError::Driver {
        host: host.to_string(),
        detail: e.to_string(),
    }
}
