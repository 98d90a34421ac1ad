//! Interception gate.
//!
//! Runs one payload through the engine and applies the failure policy:
//!
//! | Engine status | strict_errors | Result                              |
//! |---------------|---------------|-------------------------------------|
//! | Modified      | any           | engine payload                      |
//! | Unmodified    | any           | engine payload                      |
//! | Error         | false         | original payload, warning logged    |
//! | Error         | true          | `ShimError::Process`                |

use crate::audience::{self, OperationType, RuntimeConfig};
use crate::engine::{EngineHandle, ExecStatus, ProcessRequest};
use crate::error::{ShimError, ShimResult};
use tracing::{debug, error, warn};

/// Shared entry point for both message paths.
///
/// Cheap to clone; every clone uses the same engine handle.
#[derive(Clone, Debug)]
pub struct Gate {
    handle: EngineHandle,
}

impl Gate {
    pub fn new(handle: EngineHandle) -> Self {
        Self { handle }
    }

    /// A gate that never contacts an engine.
    pub fn disabled() -> Self {
        Self::new(EngineHandle::Disabled)
    }

    /// Initialize the engine handle from the environment and wrap it.
    pub async fn from_env() -> Self {
        Self::new(EngineHandle::initialize().await)
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_active()
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Process one payload.
    ///
    /// Without an active engine this returns `data` untouched.
    pub async fn process(
        &self,
        operation_type: OperationType,
        topic: &str,
        data: Vec<u8>,
        runtime: Option<&RuntimeConfig>,
    ) -> ShimResult<Vec<u8>> {
        let engine = match self.handle.engine() {
            Some(engine) => engine,
            None => return Ok(data),
        };

        let aud = audience::resolve(operation_type, topic, runtime);
        let strict_errors = runtime.is_some_and(|rc| rc.strict_errors);

        debug!(
            component = %aud.component_name,
            operation = %aud.operation_name,
            operation_type = %operation_type,
            payload_len = data.len(),
            "Submitting payload to engine"
        );

        // The original is kept for the fail-open path
        let resp = engine
            .process(ProcessRequest {
                component_name: aud.component_name,
                operation_type,
                operation_name: aud.operation_name,
                data: data.clone(),
            })
            .await;

        match resp.status {
            ExecStatus::Modified | ExecStatus::Unmodified => Ok(resp.data),
            ExecStatus::Error if strict_errors => {
                error!(
                    topic = %topic,
                    operation_type = %operation_type,
                    status_message = %resp.status_message(),
                    "Engine processing error (strict-errors=true)"
                );
                Err(ShimError::Process {
                    operation_type,
                    topic: topic.to_string(),
                    message: resp.status_message().to_string(),
                })
            }
            ExecStatus::Error => {
                warn!(
                    topic = %topic,
                    operation_type = %operation_type,
                    status_message = %resp.status_message(),
                    "Engine processing error (strict-errors=false), passing original payload"
                );
                Ok(data)
            }
        }
    }
}
