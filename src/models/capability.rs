//! Capability call records and outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Terminal outcome of one capability call.
///
/// Operational failures are data, not errors: a timeout, a provider fault,
/// or a rejected call while the circuit is open all produce a completed
/// [`CapabilityCall`] with the matching variant. Only `Success` carries a
/// result payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallOutcome {
    /// The provider answered within the deadline.
    Success {
        /// Provider result payload.
        payload: Value,
    },
    /// The deadline elapsed before the provider answered.
    Timeout,
    /// The provider answered with an error.
    ProviderError {
        /// Provider-reported failure detail.
        detail: String,
    },
    /// The provider's circuit was open; no call was attempted.
    CircuitOpen,
}

impl CallOutcome {
    /// Returns the outcome kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Timeout => "timeout",
            Self::ProviderError { .. } => "provider_error",
            Self::CircuitOpen => "circuit_open",
        }
    }

    /// True when this outcome carries a usable result payload.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// True when this outcome counts as a circuit-breaker failure.
    ///
    /// Rejections while the circuit is already open do not re-count; only
    /// attempted calls that time out or error feed the failure counter.
    #[must_use]
    pub const fn counts_as_failure(&self) -> bool {
        matches!(self, Self::Timeout | Self::ProviderError { .. })
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered capability and the provider that serves it.
///
/// Descriptors are configuration data: they link classifier signal names
/// to a provider so the classifier can recommend the highest-weighted
/// relevant capability for a complex request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Capability name, e.g. `root-cause-analysis`.
    pub capability: String,
    /// Provider that serves the capability.
    pub provider_id: String,
    /// Priority among capabilities relevant to the same request.
    pub weight: f64,
    /// Classifier signal names this capability declares relevance to.
    pub signals: Vec<String>,
}

impl CapabilityDescriptor {
    /// True when this capability declares relevance to any matched signal.
    #[must_use]
    pub fn is_relevant_to(&self, matched_signals: &[String]) -> bool {
        self.signals
            .iter()
            .any(|s| matched_signals.iter().any(|m| m == s))
    }
}

/// One issued capability call, terminal once `outcome` is set.
///
/// Retained only in the audit trail, never in memory layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCall {
    /// The provider the call was routed to.
    pub provider_id: String,
    /// The named capability that was requested.
    pub capability_name: String,
    /// Request payload handed to the provider.
    pub request_payload: Value,
    /// Dispatch timestamp (Unix epoch milliseconds).
    pub started_at: u64,
    /// Completion timestamp (Unix epoch milliseconds).
    pub completed_at: u64,
    /// Terminal outcome.
    #[serde(flatten)]
    pub outcome: CallOutcome,
}

impl CapabilityCall {
    /// Returns the successful result payload, if any.
    #[must_use]
    pub const fn result_payload(&self) -> Option<&Value> {
        match &self.outcome {
            CallOutcome::Success { payload } => Some(payload),
            _ => None,
        }
    }

    /// Wall-clock duration of the call in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.completed_at.saturating_sub(self.started_at)
    }
}
