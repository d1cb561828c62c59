//! Batch processing configuration.

use serde::{Deserialize, Serialize};

/// How a batch reacts when one of its events cannot be audited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the batch on the first failing event and hand the error to the
    /// caller, so the transport redelivers the whole batch.
    #[default]
    FailFast,
    /// Log the failing event, count it and keep going with the rest.
    Isolate,
}

impl FailurePolicy {
    /// Parse a policy name as found in the environment.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Some(Self::FailFast),
            "isolate" => Some(Self::Isolate),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail_fast"),
            Self::Isolate => write!(f, "isolate"),
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Failure policy applied per batch.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}
