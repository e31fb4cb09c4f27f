//! Inventory record types
//!
//! Structs for inventory rows with serialization support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Location record from the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Platform record from the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformRecord {
    pub id: i64,
    pub name: String,
    pub manufacturer: String,
    pub network_driver: String,
    pub created_at: DateTime<Utc>,
}

/// Device type record from the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTypeRecord {
    pub id: i64,
    pub model: String,
    pub manufacturer: String,
    pub created_at: DateTime<Utc>,
}

/// Device record from the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: i64,
    pub name: String,
    pub location_id: i64,
    pub platform_id: Option<i64>,
    pub device_type_id: i64,
    pub role: String,
    pub serial: String,
    pub primary_ip_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Interface record from the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub id: i64,
    pub device_id: i64,
    pub name: String,
    pub mgmt_only: bool,
    pub created_at: DateTime<Utc>,
}

/// IP address record from the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAddressRecord {
    pub id: i64,
    pub address: String,
    pub prefix_length: u8,
    pub interface_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl IpAddressRecord {
    /// Address in CIDR notation, e.g. `1.1.1.1/32`.
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_length)
    }
}

/// Onboarding marker attached to a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingDeviceRecord {
    pub id: i64,
    pub device_id: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Onboarding task record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub ip_address: String,
    pub location: Option<String>,
    pub platform: Option<String>,
    pub device_type: Option<String>,
    pub role: Option<String>,
    pub port: u16,
    pub timeout: u64,
    pub status: TaskStatus,
    pub failed_reason: Option<String>,
    pub message: Option<String>,
    pub created_device: Option<i64>,
}

/// Joined view of a device for listing output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub platform: Option<String>,
    pub model: String,
    pub serial: String,
    pub role: String,
    pub primary_ip: Option<String>,
}

/// Onboarding task lifecycle states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Status only moves forward: pending -> running -> terminal.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => matches!(
                next,
                TaskStatus::Running | TaskStatus::Succeeded | TaskStatus::Failed
            ),
            TaskStatus::Running => next.is_terminal(),
            TaskStatus::Succeeded | TaskStatus::Failed => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}
