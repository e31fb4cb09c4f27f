//! TCP reachability probe
//!
//! Cheap pre-flight check before any protocol handshake. No credentials
//! are involved; an unreachable target fails the attempt here with zero
//! inventory mutation.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::OnboardingError;

/// Attempts a TCP connection to `host:port` within `timeout`.
pub async fn probe_reachable(
    host: IpAddr,
    port: u16,
    timeout: Duration,
) -> Result<(), OnboardingError> {
    let addr = SocketAddr::new(host, port);

    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(OnboardingError::Connectivity {
            host: host.to_string(),
            port,
            detail: e.to_string(),
        }),
        Err(_) => Err(OnboardingError::Connectivity {
            host: host.to_string(),
            port,
            detail: format!("connect timed out after {}s", timeout.as_secs()),
        }),
    }
}
