//! Complexity tiers and per-request assessments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request complexity tiers, ordered from simplest to most demanding.
///
/// Ordering is meaningful: capability engagement is considered only at
/// [`ComplexityTier::Complex`] and above.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    /// Direct factual or single-step requests.
    #[default]
    Simple,
    /// Requests needing some reasoning but no specialist analysis.
    Moderate,
    /// Multi-faceted requests that benefit from specialist analysis.
    Complex,
    /// Requests demanding systematic, multi-stage treatment.
    Systematic,
}

impl ComplexityTier {
    /// Returns all tiers in ascending order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Simple, Self::Moderate, Self::Complex, Self::Systematic]
    }

    /// Returns the tier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::Systematic => "systematic",
        }
    }

    /// Parses a tier from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "complex" => Some(Self::Complex),
            "systematic" => Some(Self::Systematic),
            _ => None,
        }
    }

    /// True when this tier warrants considering a specialist capability.
    #[must_use]
    pub fn warrants_capability(&self) -> bool {
        *self >= Self::Complex
    }
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The classifier's verdict for one request.
///
/// Created fresh per request and immutable once produced; it survives only
/// inside the [`super::AuditRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    /// Assigned complexity tier.
    pub tier: ComplexityTier,
    /// Normalized confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Sorted, deduplicated names of the signals that matched.
    pub matched_signals: Vec<String>,
    /// Capability id to engage, when the tier and registry warrant one.
    pub recommended_capability: Option<String>,
}

impl ComplexityAssessment {
    /// An assessment for requests carrying no classifiable signal at all.
    #[must_use]
    pub fn trivial() -> Self {
        Self {
            tier: ComplexityTier::Simple,
            confidence: 0.0,
            matched_signals: Vec::new(),
            recommended_capability: None,
        }
    }
}
