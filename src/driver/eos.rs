//! Arista EOS driver
//!
//! CLI-over-SSH driver. Facts come from `show hostname` and
//! `show version`; addressing from `show ip interface brief`.

use async_trait::async_trait;
use std::collections::HashMap;

use super::ssh::CliTransport;
use super::{driver_error, DriverTarget, NetworkDriver};
use crate::error::OnboardingError;
use crate::facts::{InterfacesIp, IpAttributes, RawFacts};

pub struct EosDriver {
    target: DriverTarget,
    transport: CliTransport,
}

impl EosDriver {
    pub fn new(target: DriverTarget) -> Self {
        let transport = CliTransport::new(
            target.host,
            target.port,
            target.credentials.clone(),
            target.timeout,
        );
        Self { target, transport }
    }
}

#[async_trait]
impl NetworkDriver for EosDriver {
    async fn open(&mut self) -> Result<(), OnboardingError> {
        self.transport
            .open()
            .await
            .map_err(|e| driver_error(self.target.host, e))
    }

    async fn close(&mut self) -> Result<(), OnboardingError> {
        self.transport
            .close()
            .await
            .map_err(|e| driver_error(self.target.host, e))
    }

    async fn get_facts(&mut self) -> Result<RawFacts, OnboardingError> {
        let hostname_out = self
            .transport
            .run("show hostname")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;
        let version_out = self
            .transport
            .run("show version")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;
        let brief_out = self
            .transport
            .run("show ip interface brief")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;

        let (hostname, fqdn) = parse_show_hostname(&hostname_out);
        let (model, serial_number, os_version) = parse_show_version(&version_out);
        let (interface_list, _) = parse_ip_interface_brief(&brief_out);

        Ok(RawFacts {
            hostname,
            fqdn,
            vendor: "Arista".to_string(),
            model,
            serial_number,
            os_version,
            uptime_seconds: None,
            interface_list,
        })
    }

    async fn get_interfaces_ip(&mut self) -> Result<InterfacesIp, OnboardingError> {
        let brief_out = self
            .transport
            .run("show ip interface brief")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;
        let (_, interfaces_ip) = parse_ip_interface_brief(&brief_out);
        Ok(interfaces_ip)
    }
}

fn parse_show_hostname(output: &str) -> (String, String) {
    let mut hostname = String::new();
    let mut fqdn = String::new();
    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Hostname:") {
            hostname = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("FQDN:") {
            fqdn = value.trim().to_string();
        }
    }
    (hostname, fqdn)
}

/// Returns (model, serial_number, os_version).
fn parse_show_version(output: &str) -> (String, String, String) {
    let mut model = String::new();
    let mut serial_number = String::new();
    let mut os_version = String::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if model.is_empty() {
            if let Some(rest) = trimmed.strip_prefix("Arista ") {
                model = rest.trim().to_string();
                continue;
            }
        }
        if let Some(value) = trimmed.strip_prefix("Serial number:") {
            serial_number = value.trim().to_string();
        } else if let Some(value) = trimmed.strip_prefix("Internal build version:") {
            os_version = value.trim().to_string();
        } else if os_version.is_empty() {
            if let Some(value) = trimmed.strip_prefix("Software image version:") {
                os_version = value.trim().to_string();
            }
        }
    }

    (model, serial_number, os_version)
}

/// Returns (interface names, interface/IP map). Unassigned interfaces
/// appear in the name list only.
fn parse_ip_interface_brief(output: &str) -> (Vec<String>, InterfacesIp) {
    let mut names = Vec::new();
    let mut interfaces_ip: InterfacesIp = HashMap::new();

    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        let (interface, address) = match (tokens.next(), tokens.next()) {
            (Some(interface), Some(address)) => (interface, address),
            _ => continue,
        };
        if interface == "Interface" {
            continue;
        }

        names.push(interface.to_string());

        if let Some((addr, prefix)) = address.split_once('/') {
            if let Ok(prefix_length) = prefix.parse::<u8>() {
                if addr.parse::<std::net::IpAddr>().is_ok() {
                    interfaces_ip
                        .entry(interface.to_string())
                        .or_default()
                        .entry("ipv4".to_string())
                        .or_default()
                        .insert(addr.to_string(), IpAttributes { prefix_length });
                }
            }
        }
    }

    (names, interfaces_ip)
}
