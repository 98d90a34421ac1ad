//! Engine handle and its lifecycle.
//!
//! The handle is built once at startup. Missing configuration or a refused
//! session leaves it `Disabled` for the life of the process, and every
//! intercepted payload then flows through unmodified.

use crate::audience::OperationType;
use crate::client::EngineClient;
use crate::config::ShimConfig;
use crate::error::ConfigError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use crate::protocol::ExecStatus;

/// One payload submitted to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub component_name: String,
    pub operation_type: OperationType,
    pub operation_name: String,
    pub data: Vec<u8>,
}

/// Engine answer to one processing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResponse {
    pub status: ExecStatus,
    /// Authoritative payload on either success status.
    pub data: Vec<u8>,
    pub status_message: Option<String>,
}

impl ProcessResponse {
    pub fn modified(data: Vec<u8>) -> Self {
        Self {
            status: ExecStatus::Modified,
            data,
            status_message: None,
        }
    }

    pub fn unmodified(data: Vec<u8>) -> Self {
        Self {
            status: ExecStatus::Unmodified,
            data,
            status_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ExecStatus::Error,
            data: Vec::new(),
            status_message: Some(message.into()),
        }
    }

    pub fn status_message(&self) -> &str {
        self.status_message.as_deref().unwrap_or("")
    }
}

/// An external processing engine.
///
/// Implementations never fail the call itself: transport problems are
/// reported as an `ExecStatus::Error` response so the caller's failure
/// policy applies uniformly.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn process(&self, request: ProcessRequest) -> ProcessResponse;
}

/// Process-wide engine handle.
#[derive(Clone)]
pub enum EngineHandle {
    /// Processing is active.
    Active(Arc<dyn Engine>),
    /// Pass-through mode.
    Disabled,
}

impl EngineHandle {
    /// Wrap an already constructed engine.
    pub fn active(engine: Arc<dyn Engine>) -> Self {
        EngineHandle::Active(engine)
    }

    /// Build the handle from process environment variables.
    pub async fn initialize() -> Self {
        Self::initialize_with(|key| std::env::var(key).ok()).await
    }

    /// Build the handle from an arbitrary configuration lookup.
    pub async fn initialize_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_config(ShimConfig::from_lookup(lookup)).await
    }

    /// Build the handle from a configuration load result.
    ///
    /// Never fails: every problem is logged once and yields `Disabled`.
    pub async fn from_config(config: Result<ShimConfig, ConfigError>) -> Self {
        let config = match config {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Engine not configured, running in pass-through mode");
                return EngineHandle::Disabled;
            }
        };

        match EngineClient::connect(config).await {
            Ok(client) => {
                info!(endpoint = %client.endpoint(), "Engine handle initialized");
                EngineHandle::Active(Arc::new(client))
            }
            Err(e) => {
                error!(error = %e, "Unable to create engine client, running in pass-through mode");
                EngineHandle::Disabled
            }
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, EngineHandle::Active(_))
    }

    pub fn engine(&self) -> Option<&Arc<dyn Engine>> {
        match self {
            EngineHandle::Active(engine) => Some(engine),
            EngineHandle::Disabled => None,
        }
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineHandle::Active(_) => f.write_str("EngineHandle::Active"),
            EngineHandle::Disabled => f.write_str("EngineHandle::Disabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_config_disables() {
        let handle = EngineHandle::initialize_with(|_| None).await;
        assert!(!handle.is_active());
        assert!(handle.engine().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_engine_disables() {
        let handle = EngineHandle::initialize_with(|key| match key {
            "TOLLGATE_ENGINE_ADDRESS" => Some("unix:///nonexistent/engine.sock".to_string()),
            "TOLLGATE_ENGINE_AUTH_TOKEN" => Some("token".to_string()),
            "TOLLGATE_ENGINE_SERVICE_NAME" => Some("svc".to_string()),
            _ => None,
        })
        .await;

        assert!(!handle.is_active());
    }

    #[test]
    fn test_error_response_carries_message() {
        let resp = ProcessResponse::error("timeout");
        assert_eq!(resp.status, ExecStatus::Error);
        assert_eq!(resp.status_message(), "timeout");
        assert_eq!(ProcessResponse::modified(vec![1]).status_message(), "");
    }
}
