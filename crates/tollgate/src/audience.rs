//! Audience resolution.
//!
//! An audience names one logical message exchange to the engine:
//! which component, which operation, and which direction. Resolution
//! is pure and never fails; blank inputs fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Component name used when nothing overrides it.
pub const DEFAULT_COMPONENT_NAME: &str = "kafka";

/// Operation name used when there is neither a topic nor an override.
pub const DEFAULT_OPERATION_NAME: &str = "unknown";

/// Direction of the intercepted exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Payload was fetched and is about to reach application code.
    Consumer,
    /// Payload is about to be handed to the transport.
    Producer,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Consumer => "consumer",
            OperationType::Producer => "producer",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved audience passed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Audience {
    pub operation_type: OperationType,
    pub component_name: String,
    pub operation_name: String,
}

/// Partial audience supplied by a caller.
///
/// Blank fields mean "keep whatever would otherwise be resolved".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceOverride {
    #[serde(default)]
    pub component_name: String,
    #[serde(default)]
    pub operation_name: String,
}

impl AudienceOverride {
    pub fn new(component_name: impl Into<String>, operation_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            operation_name: operation_name.into(),
        }
    }

    pub fn component(component_name: impl Into<String>) -> Self {
        Self::new(component_name, "")
    }

    pub fn operation(operation_name: impl Into<String>) -> Self {
        Self::new("", operation_name)
    }
}

/// Per-message runtime override, passed alongside a single send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Fail the call when the engine reports an error instead of
    /// falling back to the original payload.
    #[serde(default)]
    pub strict_errors: bool,

    /// Optional partial audience override.
    #[serde(default)]
    pub audience: Option<AudienceOverride>,
}

impl RuntimeConfig {
    pub fn strict() -> Self {
        Self {
            strict_errors: true,
            audience: None,
        }
    }

    pub fn with_audience(mut self, audience: AudienceOverride) -> Self {
        self.audience = Some(audience);
        self
    }

    pub fn with_strict_errors(mut self, strict_errors: bool) -> Self {
        self.strict_errors = strict_errors;
        self
    }
}

/// Resolve the audience for one exchange.
///
/// Precedence per field: non-blank override, then non-empty topic (operation
/// name only), then the default. Component and operation resolve independently.
pub fn resolve(
    operation_type: OperationType,
    topic: &str,
    runtime: Option<&RuntimeConfig>,
) -> Audience {
    let mut component_name = DEFAULT_COMPONENT_NAME;
    let mut operation_name = DEFAULT_OPERATION_NAME;

    if !topic.is_empty() {
        operation_name = topic;
    }

    if let Some(aud) = runtime.and_then(|rc| rc.audience.as_ref()) {
        if !aud.operation_name.is_empty() {
            operation_name = &aud.operation_name;
        }

        if !aud.component_name.is_empty() {
            component_name = &aud.component_name;
        }
    }

    Audience {
        operation_type,
        component_name: component_name.to_string(),
        operation_name: operation_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn with_audience(component: &str, operation: &str) -> RuntimeConfig {
        RuntimeConfig::default().with_audience(AudienceOverride::new(component, operation))
    }

    #[test]
    fn test_defaults_without_topic_or_override() {
        let aud = resolve(OperationType::Producer, "", None);
        assert_eq!(aud.component_name, DEFAULT_COMPONENT_NAME);
        assert_eq!(aud.operation_name, DEFAULT_OPERATION_NAME);
        assert_eq!(aud.operation_type, OperationType::Producer);
    }

    #[test]
    fn test_topic_becomes_operation_name() {
        let aud = resolve(OperationType::Consumer, "orders", None);
        assert_eq!(aud.component_name, "kafka");
        assert_eq!(aud.operation_name, "orders");
        assert_eq!(aud.operation_type, OperationType::Consumer);
    }

    #[test]
    fn test_runtime_config_without_audience_keeps_topic() {
        let rc = RuntimeConfig::strict();
        let aud = resolve(OperationType::Producer, "orders", Some(&rc));
        assert_eq!(aud.component_name, "kafka");
        assert_eq!(aud.operation_name, "orders");
    }

    #[test]
    fn test_full_override_beats_topic() {
        let rc = with_audience("billing", "charge");
        let aud = resolve(OperationType::Producer, "orders", Some(&rc));
        assert_eq!(aud.component_name, "billing");
        assert_eq!(aud.operation_name, "charge");
    }

    #[test]
    fn test_full_override_without_topic() {
        let rc = with_audience("billing", "charge");
        let aud = resolve(OperationType::Producer, "", Some(&rc));
        assert_eq!(aud.component_name, "billing");
        assert_eq!(aud.operation_name, "charge");
    }

    #[test]
    fn test_component_only_override_keeps_topic() {
        let rc = RuntimeConfig::default().with_audience(AudienceOverride::component("billing"));
        let aud = resolve(OperationType::Producer, "orders", Some(&rc));
        assert_eq!(aud.component_name, "billing");
        assert_eq!(aud.operation_name, "orders");
    }

    #[test]
    fn test_component_only_override_without_topic_uses_default_operation() {
        let rc = RuntimeConfig::default().with_audience(AudienceOverride::component("billing"));
        let aud = resolve(OperationType::Producer, "", Some(&rc));
        assert_eq!(aud.component_name, "billing");
        assert_eq!(aud.operation_name, DEFAULT_OPERATION_NAME);
    }

    #[test]
    fn test_operation_only_override_keeps_default_component() {
        let rc = RuntimeConfig::default().with_audience(AudienceOverride::operation("charge"));
        let aud = resolve(OperationType::Consumer, "orders", Some(&rc));
        assert_eq!(aud.component_name, DEFAULT_COMPONENT_NAME);
        assert_eq!(aud.operation_name, "charge");
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let rc = with_audience("", "");
        assert_eq!(
            resolve(OperationType::Producer, "orders", Some(&rc)),
            resolve(OperationType::Producer, "orders", None)
        );
        assert_eq!(
            resolve(OperationType::Producer, "", Some(&rc)),
            resolve(OperationType::Producer, "", None)
        );
    }

    #[test]
    fn test_runtime_config_deserializes_partial_json() {
        let rc: RuntimeConfig =
            serde_json::from_str(r#"{"audience":{"component_name":"billing"}}"#).unwrap();
        assert!(!rc.strict_errors);
        assert_eq!(rc.audience, Some(AudienceOverride::component("billing")));
    }

    fn op_type() -> impl Strategy<Value = OperationType> {
        prop_oneof![Just(OperationType::Consumer), Just(OperationType::Producer)]
    }

    proptest! {
        #[test]
        fn prop_override_operation_always_wins(
            ot in op_type(),
            topic in ".{0,16}",
            component in ".{0,8}",
            operation in ".{1,16}",
        ) {
            let rc = with_audience(&component, &operation);
            let aud = resolve(ot, &topic, Some(&rc));
            prop_assert_eq!(aud.operation_name, operation);
        }

        #[test]
        fn prop_topic_without_override_is_operation(ot in op_type(), topic in ".{1,32}") {
            let aud = resolve(ot, &topic, None);
            prop_assert_eq!(aud.operation_name, topic);
            prop_assert_eq!(aud.component_name, DEFAULT_COMPONENT_NAME);
        }

        #[test]
        fn prop_resolved_names_never_empty(
            ot in op_type(),
            topic in ".{0,8}",
            component in ".{0,8}",
            operation in ".{0,8}",
        ) {
            let rc = with_audience(&component, &operation);
            let aud = resolve(ot, &topic, Some(&rc));
            prop_assert!(!aud.component_name.is_empty());
            prop_assert!(!aud.operation_name.is_empty());
            prop_assert_eq!(aud.operation_type, ot);
        }
    }
}
