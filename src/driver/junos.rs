//! Juniper JunOS driver
//!
//! Facts come from `show version` and `show chassis hardware`;
//! addressing from `show interfaces terse`.

use async_trait::async_trait;
use std::collections::HashMap;

use super::ssh::CliTransport;
use super::{driver_error, DriverTarget, NetworkDriver};
use crate::error::OnboardingError;
use crate::facts::{InterfacesIp, IpAttributes, RawFacts};

pub struct JunosDriver {
    target: DriverTarget,
    transport: CliTransport,
}

impl JunosDriver {
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
impl NetworkDriver for JunosDriver {
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
        let version_out = self
            .transport
            .run("show version")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;
        let chassis_out = self
            .transport
            .run("show chassis hardware")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;
        let terse_out = self
            .transport
            .run("show interfaces terse")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;

        let mut facts = parse_show_version(&version_out);
        facts.serial_number = parse_chassis_serial(&chassis_out);
        let (interface_list, _) = parse_interfaces_terse(&terse_out);
        facts.interface_list = interface_list;
        Ok(facts)
    }

    async fn get_interfaces_ip(&mut self) -> Result<InterfacesIp, OnboardingError> {
        let terse_out = self
            .transport
            .run("show interfaces terse")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;
        let (_, interfaces_ip) = parse_interfaces_terse(&terse_out);
        Ok(interfaces_ip)
    }
}

fn parse_show_version(output: &str) -> RawFacts {
    let mut facts = RawFacts {
        vendor: "Juniper".to_string(),
        ..RawFacts::default()
    };

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(value) = trimmed.strip_prefix("Hostname:") {
            facts.hostname = value.trim().to_string();
        } else if let Some(value) = trimmed.strip_prefix("Model:") {
            facts.model = value.trim().to_string();
        } else if let Some(value) = trimmed.strip_prefix("Junos:") {
            facts.os_version = value.trim().to_string();
        }
    }

    facts
}

fn parse_chassis_serial(output: &str) -> String {
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Chassis") {
            if let Some(serial) = rest.split_whitespace().next() {
                return serial.to_string();
            }
        }
    }
    String::new()
}

/// Parses the terse table: rows with a protocol of inet/inet6 carry a
/// local address in CIDR form.
fn parse_interfaces_terse(output: &str) -> (Vec<String>, InterfacesIp) {
    let mut names = Vec::new();
    let mut interfaces_ip: InterfacesIp = HashMap::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 || tokens[0] == "Interface" {
            continue;
        }

        let interface = tokens[0];
        names.push(interface.to_string());

        if tokens.len() < 5 {
            continue;
        }
        let family = match tokens[3] {
            "inet" => "ipv4",
            "inet6" => "ipv6",
            _ => continue,
        };

        if let Some((addr, prefix)) = tokens[4].split_once('/') {
            if let Ok(prefix_length) = prefix.parse::<u8>() {
                if addr.parse::<std::net::IpAddr>().is_ok() {
                    interfaces_ip
                        .entry(interface.to_string())
                        .or_default()
                        .entry(family.to_string())
                        .or_default()
                        .insert(addr.to_string(), IpAttributes { prefix_length });
                }
            }
        }
    }

    (names, interfaces_ip)
}
