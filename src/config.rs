//! Connection settings for the HTTP transport.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings: where the server lives and how to authenticate.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the server (e.g., "https://my-backend.example.com").
    pub url: String,
    /// API key, sent as the basic-auth user.
    pub key: String,
    /// API secret, sent as the basic-auth password.
    pub secret: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Config {
    /// Create a config with the default timeout.
    pub fn new(url: impl Into<String>, key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            secret: secret.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the config from `TEMPO_URL`, `TEMPO_KEY`, `TEMPO_SECRET` and the
    /// optional `TEMPO_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let config = Self::new(
            required("TEMPO_URL")?,
            required("TEMPO_KEY")?,
            required("TEMPO_SECRET")?,
        );

        match env::var("TEMPO_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| {
                    Error::Config(format!("TEMPO_TIMEOUT_SECS must be an integer: {}", e))
                })?;
                Ok(config.with_timeout(Duration::from_secs(secs)))
            }
            Err(_) => Ok(config),
        }
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(Error::Config(format!("{} is not set", name))),
    }
}
