//! Post-hoc pattern attribution.

use crate::models::PatternMatch;

use super::library::PatternLibrary;

/// Detector thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Minimum confidence a match must reach to be reported.
    pub min_confidence: f64,
    /// Maximum matches reported per text, to bound attribution noise.
    pub max_matches: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_matches: 5,
        }
    }
}

impl DetectorConfig {
    /// Creates the default detector configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum reported confidence.
    #[must_use]
    pub const fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Sets the match cap.
    #[must_use]
    pub const fn with_max_matches(mut self, max_matches: usize) -> Self {
        self.max_matches = max_matches;
        self
    }
}

/// Scans text against the pattern library and scores attributions.
#[derive(Debug, Default)]
pub struct PatternDetector {
    library: PatternLibrary,
    config: DetectorConfig,
}

impl PatternDetector {
    /// Creates a detector over a compiled library.
    #[must_use]
    pub const fn new(library: PatternLibrary, config: DetectorConfig) -> Self {
        Self { library, config }
    }

    /// Returns the configured thresholds.
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detects applied methodologies in `text`.
    ///
    /// Each pattern scores the fraction of its trigger terms present
    /// (case-insensitive, word-boundary) times its base weight, capped at
    /// 1.0. Matches below `min_confidence` are dropped, duplicates by
    /// pattern id keep the highest confidence, and the result is capped
    /// at `max_matches`, ordered confidence descending with ties broken
    /// by pattern id ascending. Distinct patterns co-occur freely; there
    /// is no single winner.
    #[must_use]
    pub fn detect(&self, text: &str) -> Vec<PatternMatch> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<PatternMatch> = Vec::new();
        for pattern in self.library.patterns() {
            let matched_terms: Vec<String> = pattern
                .triggers
                .iter()
                .filter(|(_, regex)| regex.is_match(text))
                .map(|(term, _)| term.clone())
                .collect();
            if matched_terms.is_empty() {
                continue;
            }

            #[allow(clippy::cast_precision_loss)]
            let fraction = matched_terms.len() as f64 / pattern.triggers.len() as f64;
            let confidence = (fraction * pattern.weight).min(1.0);
            if confidence < self.config.min_confidence {
                continue;
            }

            // Dedup by id keeping the highest confidence.
            match matches.iter_mut().find(|m| m.pattern_id == pattern.id) {
                Some(existing) if existing.confidence >= confidence => {}
                Some(existing) => {
                    existing.confidence = confidence;
                    existing.matched_terms = matched_terms;
                }
                None => matches.push(PatternMatch {
                    pattern_id: pattern.id.clone(),
                    confidence,
                    matched_terms,
                }),
            }
        }

        matches.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.pattern_id.cmp(&b.pattern_id))
        });
        matches.truncate(self.config.max_matches);

        metrics::histogram!("stratacog_pattern_matches")
            .record(u32::try_from(matches.len()).map_or(f64::MAX, f64::from));
        matches
    }
}
