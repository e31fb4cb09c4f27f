//! Device access credentials
//!
//! Credentials travel with a request or come from the process-wide
//! defaults. They are never persisted and never serialized.

use std::fmt;

/// Username/password pair for device access, with an optional enable
/// secret for platforms that gate privileged commands behind one.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub secret: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Read credentials from `NETONBOARD_USERNAME` / `NETONBOARD_PASSWORD`
    /// (and optional `NETONBOARD_SECRET`). Returns None unless both the
    /// username and password are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let username = env_var("NETONBOARD_USERNAME")?;
        let password = env_var("NETONBOARD_PASSWORD")?;
        let mut creds = Self::new(username, password);
        if let Some(secret) = env_var("NETONBOARD_SECRET") {
            creds.secret = Some(secret);
        }
        Some(creds)
    }
}

// Debug must not leak the password into logs or panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
