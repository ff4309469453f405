//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HttpError, Result};

pub const ENV_CONNECT_TIMEOUT: &str = "EASY_HTTP_CONNECT_TIMEOUT_SECS";
pub const ENV_TIMEOUT: &str = "EASY_HTTP_TIMEOUT_SECS";
pub const ENV_USER_AGENT: &str = "EASY_HTTP_USER_AGENT";

/// Settings applied when building the underlying `reqwest` client.
///
/// Every field has a default, so a partial document deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connect_timeout_secs: u64,
    /// Total budget for one exchange, from sending the request to reading
    /// the last body byte.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Headers sent with every request, before per-request headers.
    pub default_headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 20,
            timeout_secs: 30,
            user_agent: concat!("easy-http/", env!("CARGO_PKG_VERSION")).to_string(),
            default_headers: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by the `EASY_HTTP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CONNECT_TIMEOUT) {
            config.connect_timeout_secs = parse_secs(ENV_CONNECT_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            config.timeout_secs = parse_secs(ENV_TIMEOUT, &raw)?;
        }
        if let Some(agent) = lookup(ENV_USER_AGENT) {
            config.user_agent = agent;
        }
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| HttpError::Build(format!("{key} must be a whole number of seconds, got {raw:?}")))
}
