//! Cisco IOS / IOS-XE driver
//!
//! Facts come from `show version`; addressing from the long
//! `show ip interface` form, which carries prefix lengths.

use async_trait::async_trait;
use std::collections::HashMap;

use super::ssh::CliTransport;
use super::{driver_error, DriverTarget, NetworkDriver};
use crate::error::OnboardingError;
use crate::facts::{InterfacesIp, IpAttributes, RawFacts};

pub struct IosDriver {
    target: DriverTarget,
    transport: CliTransport,
}

impl IosDriver {
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
impl NetworkDriver for IosDriver {
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
        let interfaces_out = self
            .transport
            .run("show ip interface")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;

        let mut facts = parse_show_version(&version_out);
        let (interface_list, _) = parse_show_ip_interface(&interfaces_out);
        facts.interface_list = interface_list;
        Ok(facts)
    }

    async fn get_interfaces_ip(&mut self) -> Result<InterfacesIp, OnboardingError> {
        let interfaces_out = self
            .transport
            .run("show ip interface")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;
        let (_, interfaces_ip) = parse_show_ip_interface(&interfaces_out);
        Ok(interfaces_ip)
    }
}

fn parse_show_version(output: &str) -> RawFacts {
    let mut facts = RawFacts {
        vendor: "Cisco".to_string(),
        ..RawFacts::default()
    };

    for line in output.lines() {
        let trimmed = line.trim();

        if facts.os_version.is_empty() && trimmed.starts_with("Cisco IOS") {
            if let Some(after) = trimmed.split("Version ").nth(1) {
                let version = after
                    .split(|c: char| c == ',' || c == ' ')
                    .next()
                    .unwrap_or("");
                facts.os_version = version.to_string();
            }
        } else if let Some(idx) = trimmed.find(" uptime is ") {
            facts.hostname = trimmed[..idx].trim().to_string();
        } else if let Some(serial) = trimmed.strip_prefix("Processor board ID ") {
            facts.serial_number = serial.trim().to_string();
        } else if facts.model.is_empty()
            && trimmed.to_ascii_lowercase().starts_with("cisco ")
            && (trimmed.contains("(revision") || trimmed.contains("bytes of memory"))
        {
            if let Some(model) = trimmed.split_whitespace().nth(1) {
                facts.model = model.to_string();
            }
        }
    }

    facts
}

/// Walks interface blocks: an unindented line names the interface, an
/// indented "Internet address is a.b.c.d/len" line carries the address.
fn parse_show_ip_interface(output: &str) -> (Vec<String>, InterfacesIp) {
    let mut names = Vec::new();
    let mut interfaces_ip: InterfacesIp = HashMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        if !line.starts_with(' ') && !line.starts_with('\t') {
            if let Some(name) = line.split_whitespace().next() {
                if line.contains(" is ") {
                    names.push(name.to_string());
                    current = Some(name.to_string());
                }
            }
            continue;
        }

        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Internet address is ") {
            if let Some(interface) = &current {
                if let Some((addr, prefix)) = rest.split_once('/') {
                    if let Ok(prefix_length) = prefix.trim().parse::<u8>() {
                        if addr.parse::<std::net::IpAddr>().is_ok() {
                            interfaces_ip
                                .entry(interface.clone())
                                .or_default()
                                .entry("ipv4".to_string())
                                .or_default()
                                .insert(addr.to_string(), IpAttributes { prefix_length });
                        }
                    }
                }
            }
        }
    }

    (names, interfaces_ip)
}
