//! SSH command transport for CLI drivers
//!
//! Thin wrapper over russh: connect, password auth, exec, collect
//! output, disconnect. Vendor drivers own the commands and parsing;
//! this module owns the session.

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::credentials::Credentials;

/// Transport-level SSH failures, kept separate from the onboarding
/// taxonomy so callers can map auth rejection differently per phase.
#[derive(Debug, Error)]
pub enum SshError {
    #[error("authentication failed for user '{username}'")]
    AuthenticationFailed { username: String },
    #[error("connection to {addr} failed: {detail}")]
    Connect { addr: String, detail: String },
    #[error("ssh protocol error: {0}")]
    Protocol(#[from] russh::Error),
    #[error("no open session")]
    NotConnected,
}

/// Output of one remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // Targets are addressed by IP at onboarding time.
        // TODO: optional known_hosts pinning
        Ok(true)
    }
}

/// SSH client bound to one target.
pub struct SshClient {
    host: IpAddr,
    port: u16,
    credentials: Credentials,
    timeout: Duration,
}

impl SshClient {
    pub fn new(host: IpAddr, port: u16, credentials: Credentials, timeout: Duration) -> Self {
        Self {
            host,
            port,
            credentials,
            timeout,
        }
    }

    /// Connect and authenticate with the configured password.
    pub async fn connect(&self) -> Result<SshSession, SshError> {
        let addr = SocketAddr::new(self.host, self.port);

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.timeout),
            ..Default::default()
        });

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SshError::Connect {
                addr: addr.to_string(),
                detail: format!("connect timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| SshError::Connect {
                addr: addr.to_string(),
                detail: e.to_string(),
            })?;

        let mut session = client::connect_stream(config, stream, ClientHandler).await?;

        let authenticated = session
            .authenticate_password(&self.credentials.username, &self.credentials.password)
            .await?;

        if !authenticated {
            return Err(SshError::AuthenticationFailed {
                username: self.credentials.username.clone(),
            });
        }

        Ok(SshSession { session })
    }
}

/// Active authenticated session.
pub struct SshSession {
    session: client::Handle<ClientHandler>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession").finish_non_exhaustive()
    }
}

impl SshSession {
    /// Run one command and collect its output until the channel closes.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput, SshError> {
        let mut channel = self.session.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        loop {
            match channel.wait().await {
                Some(russh::ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(russh::ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(russh::ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = Some(exit_status);
                }
                Some(russh::ChannelMsg::Eof) => {}
                Some(russh::ChannelMsg::Close) | None => break,
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_code,
        })
    }

    pub fn is_connected(&self) -> bool {
        !self.session.is_closed()
    }

    pub async fn disconnect(self) -> Result<(), SshError> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Session holder shared by the vendor drivers: open once, run commands,
/// close on every path.
pub(crate) struct CliTransport {
    client: SshClient,
    session: Option<SshSession>,
}

impl CliTransport {
    pub(crate) fn new(host: IpAddr, port: u16, credentials: Credentials, timeout: Duration) -> Self {
        Self {
            client: SshClient::new(host, port, credentials, timeout),
            session: None,
        }
    }

    pub(crate) async fn open(&mut self) -> Result<(), SshError> {
        if self.session.is_none() {
            self.session = Some(self.client.connect().await?);
        }
        Ok(())
    }

    pub(crate) async fn run(&mut self, command: &str) -> Result<String, SshError> {
        let session = self.session.as_ref().ok_or(SshError::NotConnected)?;
        let output = session.exec(command).await?;
        if output.stdout.is_empty() && !output.stderr.is_empty() {
            // Some network operating systems write CLI output to stderr.
            return Ok(output.stderr);
        }
        Ok(output.stdout)
    }

    pub(crate) async fn close(&mut self) -> Result<(), SshError> {
        if let Some(session) = self.session.take() {
            session.disconnect().await?;
        }
        Ok(())
    }
}
