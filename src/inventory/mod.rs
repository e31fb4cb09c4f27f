//! Inventory module for onboarded devices and task history
//!
//! Provides SQLite storage for:
//! - Locations, platforms, and device types
//! - Devices with their management interface and IP
//! - Onboarding task history

pub mod connection;
pub mod records;
pub mod schema;
pub mod store;

pub use connection::Database;
pub use records::*;
pub use store::*;
