//! Session cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{CacheError, CacheKind};

/// Environment fallback for the redis host.
pub const REDIS_HOST_ENV: &str = "REDIS_HOST";
/// Environment fallback for the redis port.
pub const REDIS_PORT_ENV: &str = "REDIS_PORT";

/// Session cache selection plus backend connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CacheSpec {
    /// Backend name: "disabled", "in-memory" or "redis".
    #[serde(rename = "type", default = "default_cache_type")]
    pub cache_type: String,

    /// Redis host.
    #[serde(default)]
    pub host: Option<String>,

    /// Redis port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Prefix prepended to every username key (empty by default).
    #[serde(default)]
    pub key_prefix: String,

    /// Per-operation timeout for the remote backend, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_cache_type() -> String {
    "disabled".to_string()
}

impl Default for CacheSpec {
    fn default() -> Self {
        Self {
            cache_type: default_cache_type(),
            host: None,
            port: None,
            key_prefix: String::new(),
            timeout_secs: None,
        }
    }
}

impl CacheSpec {
    /// Spec for a given backend with no connection parameters.
    pub fn of_type(cache_type: &str) -> Self {
        Self {
            cache_type: cache_type.to_string(),
            ..Default::default()
        }
    }

    /// Parsed backend kind.
    pub fn kind(&self) -> Result<CacheKind, CacheError> {
        CacheKind::parse(&self.cache_type)
    }

    /// Fill host/port from `REDIS_HOST` / `REDIS_PORT` when not set explicitly.
    pub fn with_env_fallback(mut self) -> Self {
        if self.host.is_none() {
            self.host = std::env::var(REDIS_HOST_ENV).ok().filter(|h| !h.is_empty());
        }
        if self.port.is_none() {
            self.port = std::env::var(REDIS_PORT_ENV)
                .ok()
                .and_then(|p| p.parse().ok());
        }
        self
    }

    /// Connection URL for the remote backend.
    pub fn redis_url(&self) -> Result<String, CacheError> {
        let host = self
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or(CacheError::MissingParameter {
                backend: CacheKind::Remote,
                parameter: "host",
            })?;
        let port = self.port.ok_or(CacheError::MissingParameter {
            backend: CacheKind::Remote,
            parameter: "port",
        })?;
        Ok(format!("redis://{}:{}/", host, port))
    }

    /// Remote operation timeout; zero is treated as unset.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
