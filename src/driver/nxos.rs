//! Cisco NX-OS driver
//!
//! Facts come from `show version`; addressing from
//! `show ip interface vrf all` so management-VRF interfaces are seen.

use async_trait::async_trait;
use std::collections::HashMap;

use super::ssh::CliTransport;
use super::{driver_error, DriverTarget, NetworkDriver};
use crate::error::OnboardingError;
use crate::facts::{InterfacesIp, IpAttributes, RawFacts};

pub struct NxosDriver {
    target: DriverTarget,
    transport: CliTransport,
}

impl NxosDriver {
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
impl NetworkDriver for NxosDriver {
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
            .run("show ip interface vrf all")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;

        let mut facts = parse_show_version(&version_out);
        let (interface_list, _) = parse_ip_interface_vrf_all(&interfaces_out);
        facts.interface_list = interface_list;
        Ok(facts)
    }

    async fn get_interfaces_ip(&mut self) -> Result<InterfacesIp, OnboardingError> {
        let interfaces_out = self
            .transport
            .run("show ip interface vrf all")
            .await
            .map_err(|e| driver_error(self.target.host, e))?;
        let (_, interfaces_ip) = parse_ip_interface_vrf_all(&interfaces_out);
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

        if facts.os_version.is_empty() {
            if let Some(version) = trimmed.strip_prefix("NXOS: version ") {
                facts.os_version = version.trim().to_string();
            } else if let Some(version) = trimmed.strip_prefix("system:    version ") {
                facts.os_version = version.trim().to_string();
            }
        }
        if facts.model.is_empty() && trimmed.starts_with("cisco ") {
            let after = &trimmed["cisco ".len()..];
            let model = after.split(" (").next().unwrap_or(after);
            facts.model = model.trim().to_string();
        }
        if let Some(serial) = trimmed.strip_prefix("Processor Board ID ") {
            facts.serial_number = serial.trim().to_string();
        }
        if let Some(name) = trimmed.strip_prefix("Device name: ") {
            facts.hostname = name.trim().to_string();
        }
        if let Some(rest) = trimmed.strip_prefix("Kernel uptime is ") {
            facts.uptime_seconds = parse_kernel_uptime(rest);
        }
    }

    facts
}

/// "47 day(s), 1 hour(s), 35 minute(s), 56 second(s)" -> seconds.
fn parse_kernel_uptime(text: &str) -> Option<u64> {
    let mut total: u64 = 0;
    let mut matched = false;

    for part in text.split(',') {
        let mut tokens = part.split_whitespace();
        let value: u64 = match tokens.next().and_then(|v| v.parse().ok()) {
            Some(v) => v,
            None => continue,
        };
        let unit = match tokens.next() {
            Some(u) => u,
            None => continue,
        };
        let factor = if unit.starts_with("day") {
            86_400
        } else if unit.starts_with("hour") {
            3_600
        } else if unit.starts_with("minute") {
            60
        } else if unit.starts_with("second") {
            1
        } else {
            continue;
        };
        total += value * factor;
        matched = true;
    }

    if matched {
        Some(total)
    } else {
        None
    }
}

/// Walks VRF blocks: "<name>, Interface status: ..." opens an interface,
/// "IP address: x, IP subnet: a/b" lines attach addresses to it.
fn parse_ip_interface_vrf_all(output: &str) -> (Vec<String>, InterfacesIp) {
    let mut names = Vec::new();
    let mut interfaces_ip: InterfacesIp = HashMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim();

        if trimmed.contains(", Interface status:") {
            if let Some(name) = trimmed.split(',').next() {
                let name = name.trim().to_string();
                names.push(name.clone());
                current = Some(name);
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("IP address: ") {
            if let Some(interface) = &current {
                let mut fields = rest.split(',');
                let addr = fields.next().unwrap_or("").trim();
                let prefix_length = fields
                    .next()
                    .and_then(|f| f.trim().strip_prefix("IP subnet: "))
                    .and_then(|subnet| subnet.split_whitespace().next())
                    .and_then(|cidr| cidr.split_once('/'))
                    .and_then(|(_, prefix)| prefix.parse::<u8>().ok());

                if let (Ok(_), Some(prefix_length)) =
                    (addr.parse::<std::net::IpAddr>(), prefix_length)
                {
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

    (names, interfaces_ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_VERSION: &str = "\
Cisco Nexus Operating System (NX-OS) Software
TAC support: http://www.cisco.com/tac

Software
  loader:    version N/A
  kickstart: version 7.3(1)D1(1) [build 7.3(1)D1(0.10)]
  NXOS: version 7.3(1)D1(1) [build 7.3(1)D1(0.10)]

Hardware
  cisco NX-OSv Chassis (\"NX-OSv Supervisor Module\")
  QEMU Virtual CPU version 2.5 with 4002196 kB of memory.
  Processor Board ID TM6017D760B

  Device name: nxos-spine1
  bootflash:    3509454 kB

Kernel uptime is 47 day(s), 1 hour(s), 35 minute(s), 56 second(s)
";

    const SHOW_IP_INT_VRF_ALL: &str = "\
IP Interface Status for VRF \"default\"(1)

IP Interface Status for VRF \"management\"(2)
mgmt0, Interface status: protocol-up/link-up/admin-up, iod: 2,
  IP address: 2.2.2.2, IP subnet: 2.2.2.2/32 route-preference: 0, tag: 0
";

    #[test]
    fn parses_version_block() {
        let facts = parse_show_version(SHOW_VERSION);
        assert_eq!(facts.hostname, "nxos-spine1");
        assert_eq!(facts.model, "NX-OSv Chassis");
        assert_eq!(facts.serial_number, "TM6017D760B");
        assert_eq!(facts.os_version, "7.3(1)D1(1) [build 7.3(1)D1(0.10)]");
        assert_eq!(
            facts.uptime_seconds,
            Some(47 * 86_400 + 3_600 + 35 * 60 + 56)
        );
    }

    #[test]
    fn parses_management_vrf_interface() {
        let (names, map) = parse_ip_interface_vrf_all(SHOW_IP_INT_VRF_ALL);
        assert_eq!(names, vec!["mgmt0"]);

        let attrs = &map["mgmt0"]["ipv4"]["2.2.2.2"];
        assert_eq!(attrs.prefix_length, 32);
    }

    #[test]
    fn kernel_uptime_handles_partial_units() {
        assert_eq!(
            parse_kernel_uptime("0 day(s), 0 hour(s), 16 minute(s), 39 second(s)"),
            Some(16 * 60 + 39)
        );
        assert_eq!(parse_kernel_uptime("garbage"), None);
    }
}
