//! Configuration for Tollgate.

use crate::error::ConfigError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Engine server address (`host:port`, `tcp://host:port` or `unix:///path`).
pub const ENV_ADDRESS: &str = "TOLLGATE_ENGINE_ADDRESS";

/// Engine auth token.
pub const ENV_AUTH_TOKEN: &str = "TOLLGATE_ENGINE_AUTH_TOKEN";

/// Service name reported to the engine.
pub const ENV_SERVICE_NAME: &str = "TOLLGATE_ENGINE_SERVICE_NAME";

/// Optional per-call deadline in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "TOLLGATE_ENGINE_TIMEOUT_MS";

/// Where the engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEndpoint {
    /// TCP `host:port`
    Tcp(String),
    /// Unix domain socket path
    Unix(PathBuf),
}

impl EngineEndpoint {
    /// Parse an engine address.
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let address = address.trim();

        if let Some(path) = address.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ConfigError::InvalidAddress(address.to_string()));
            }
            return Ok(EngineEndpoint::Unix(PathBuf::from(path)));
        }

        let host_port = address.strip_prefix("tcp://").unwrap_or(address);

        // host:port with a non-empty host and numeric port
        match host_port.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(EngineEndpoint::Tcp(host_port.to_string()))
            }
            _ => Err(ConfigError::InvalidAddress(address.to_string())),
        }
    }
}

impl fmt::Display for EngineEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEndpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            EngineEndpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Tollgate configuration.
#[derive(Clone)]
pub struct ShimConfig {
    /// Engine endpoint
    pub endpoint: EngineEndpoint,

    /// Auth token presented in the session handshake
    pub auth_token: String,

    /// Service identity presented in the session handshake
    pub service_name: String,

    /// Deadline for one engine round trip; `None` waits for the transport
    pub request_timeout: Option<Duration>,
}

impl ShimConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated the same as missing ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let address = get(ENV_ADDRESS).ok_or(ConfigError::MissingAddress)?;
        let auth_token = get(ENV_AUTH_TOKEN).ok_or(ConfigError::MissingAuthToken)?;
        let service_name = get(ENV_SERVICE_NAME).ok_or(ConfigError::MissingServiceName)?;

        let request_timeout = match get(ENV_TIMEOUT_MS) {
            None => None,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
                _ => return Err(ConfigError::InvalidTimeout(raw)),
            },
        };

        Ok(Self {
            endpoint: EngineEndpoint::parse(&address)?,
            auth_token,
            service_name,
            request_timeout,
        })
    }
}

impl fmt::Debug for ShimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShimConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"[REDACTED]")
            .field("service_name", &self.service_name)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
