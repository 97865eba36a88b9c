//! Request complexity classification.
//!
//! Scores a request against weighted lexical signals and maps the raw
//! score to a tier through fixed thresholds. Classification is pure and
//! deterministic for a fixed configuration: identical input always yields
//! an identical assessment.

pub mod signals;

pub use signals::{COMPLEXITY_SIGNALS, ComplexitySignal};

use crate::models::{CapabilityDescriptor, ComplexityAssessment, ComplexityTier};
use crate::{Error, Result};
use signals::{CONTINUITY_PATTERN, CONTINUITY_SIGNAL, CONTINUITY_WEIGHT};

/// Tier threshold configuration.
///
/// Raw scores map to tiers as `< simple_max` → simple,
/// `[simple_max, moderate_max)` → moderate, `[moderate_max, complex_max)`
/// → complex, `≥ complex_max` → systematic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    /// Exclusive upper bound of the simple tier.
    pub simple_max: f64,
    /// Exclusive upper bound of the moderate tier.
    pub moderate_max: f64,
    /// Exclusive upper bound of the complex tier.
    pub complex_max: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            simple_max: 1.0,
            moderate_max: 3.0,
            complex_max: 5.0,
        }
    }
}

impl ClassifierConfig {
    /// Creates the default threshold configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simple tier bound.
    #[must_use]
    pub const fn with_simple_max(mut self, bound: f64) -> Self {
        self.simple_max = bound;
        self
    }

    /// Sets the moderate tier bound.
    #[must_use]
    pub const fn with_moderate_max(mut self, bound: f64) -> Self {
        self.moderate_max = bound;
        self
    }

    /// Sets the complex tier bound.
    #[must_use]
    pub const fn with_complex_max(mut self, bound: f64) -> Self {
        self.complex_max = bound;
        self
    }

    /// Validates that the thresholds are positive and ascending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the bounds are not strictly usable.
    pub fn validate(&self) -> Result<()> {
        if self.simple_max <= 0.0
            || self.moderate_max < self.simple_max
            || self.complex_max < self.moderate_max
        {
            return Err(Error::Config(format!(
                "classifier thresholds must be positive and ascending, got {} / {} / {}",
                self.simple_max, self.moderate_max, self.complex_max
            )));
        }
        Ok(())
    }

    /// Maps a raw score to its tier.
    #[must_use]
    pub fn tier_for(&self, score: f64) -> ComplexityTier {
        if score < self.simple_max {
            ComplexityTier::Simple
        } else if score < self.moderate_max {
            ComplexityTier::Moderate
        } else if score < self.complex_max {
            ComplexityTier::Complex
        } else {
            ComplexityTier::Systematic
        }
    }

    /// Upper threshold used to normalize confidence for a tier.
    ///
    /// The systematic tier has no upper bound, so its entry threshold is
    /// used instead.
    #[must_use]
    pub const fn confidence_bound(&self, tier: ComplexityTier) -> f64 {
        match tier {
            ComplexityTier::Simple => self.simple_max,
            ComplexityTier::Moderate => self.moderate_max,
            ComplexityTier::Complex | ComplexityTier::Systematic => self.complex_max,
        }
    }
}

/// The lexical complexity classifier.
///
/// Holds the threshold configuration and the registered capability
/// descriptors used for recommendations. Construction is the only place
/// configuration enters; `assess` itself has no side effects.
#[derive(Debug, Clone, Default)]
pub struct ComplexityClassifier {
    config: ClassifierConfig,
    capabilities: Vec<CapabilityDescriptor>,
}

impl ComplexityClassifier {
    /// Creates a classifier with the given thresholds and capabilities.
    #[must_use]
    pub fn new(config: ClassifierConfig, capabilities: Vec<CapabilityDescriptor>) -> Self {
        Self {
            config,
            capabilities,
        }
    }

    /// Returns the threshold configuration.
    #[must_use]
    pub const fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Assesses one request.
    ///
    /// Signals are scanned in the request text; the context-dependent
    /// continuity signal additionally requires a non-empty
    /// `session_context`, so a follow-up phrasing only scores when there
    /// is a session to follow up on. Confidence is the matched weight
    /// normalized by the assigned tier's upper threshold, capped at 1.0.
    ///
    /// A capability is recommended only when the tier is complex or above
    /// and a registered capability declares relevance to a matched
    /// signal; the highest weight wins and ties break toward the
    /// lexically smallest capability name.
    #[must_use]
    pub fn assess(&self, request_text: &str, session_context: &str) -> ComplexityAssessment {
        if request_text.trim().is_empty() {
            return ComplexityAssessment::trivial();
        }

        let mut score = 0.0;
        let mut matched_signals: Vec<String> = Vec::new();

        for signal in COMPLEXITY_SIGNALS.iter() {
            if signal.pattern.is_match(request_text) {
                score += signal.weight;
                matched_signals.push(signal.name.to_string());
            }
        }

        if !session_context.trim().is_empty() && CONTINUITY_PATTERN.is_match(request_text) {
            score += CONTINUITY_WEIGHT;
            matched_signals.push(CONTINUITY_SIGNAL.to_string());
        }

        matched_signals.sort_unstable();
        matched_signals.dedup();

        let tier = self.config.tier_for(score);
        let confidence = (score / self.config.confidence_bound(tier)).min(1.0);
        let recommended_capability = if tier.warrants_capability() {
            self.recommend(&matched_signals)
        } else {
            None
        };

        ComplexityAssessment {
            tier,
            confidence,
            matched_signals,
            recommended_capability,
        }
    }

    /// Picks the highest-weighted relevant capability.
    ///
    /// Ties break toward the lexically smallest capability name so the
    /// choice is stable across runs.
    fn recommend(&self, matched_signals: &[String]) -> Option<String> {
        self.capabilities
            .iter()
            .filter(|descriptor| descriptor.is_relevant_to(matched_signals))
            .max_by(|a, b| {
                a.weight
                    .total_cmp(&b.weight)
                    .then_with(|| b.capability.cmp(&a.capability))
            })
            .map(|descriptor| descriptor.capability.clone())
    }
}
