//! Interpreter configuration

use obd_protocol::Unit;
use serde::{Deserialize, Serialize};

/// What the worker does with a reply whose header or PID does not match
/// the request in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Fail that request with `ProtocolViolation` and keep the link up
    #[default]
    FailRequest,
    /// Fail the request, report the violation and shut the worker down
    Abort,
}

/// Interpreter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Maximum queued requests, `None` for unbounded
    pub ledger_capacity: Option<usize>,

    /// Handling of mismatched replies
    pub violation_policy: ViolationPolicy,

    /// Unit used by requests built through the engine helpers
    pub unit: Unit,

    /// Worker thread name
    pub thread_name: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            ledger_capacity: None,
            violation_policy: ViolationPolicy::FailRequest,
            unit: Unit::Metric,
            thread_name: "obd-interpreter".to_string(),
        }
    }
}

impl InterpreterConfig {
    /// Abort on any framing violation and cap the backlog
    pub fn strict() -> Self {
        Self {
            ledger_capacity: Some(64),
            violation_policy: ViolationPolicy::Abort,
            ..Default::default()
        }
    }

    /// Keep the link up through violations, never refuse work
    pub fn lenient() -> Self {
        Self {
            ledger_capacity: None,
            violation_policy: ViolationPolicy::FailRequest,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), crate::InterpreterError> {
        if self.ledger_capacity == Some(0) {
            return Err(crate::InterpreterError::Config(
                "ledger_capacity must be at least 1".to_string(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(crate::InterpreterError::Config(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InterpreterConfig::default();
        assert_eq!(config.ledger_capacity, None);
        assert_eq!(config.violation_policy, ViolationPolicy::FailRequest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(InterpreterConfig::strict().violation_policy, ViolationPolicy::Abort);
        assert_eq!(InterpreterConfig::lenient().ledger_capacity, None);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = InterpreterConfig {
            ledger_capacity: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(crate::InterpreterError::Config(_))
        ));
    }
}
