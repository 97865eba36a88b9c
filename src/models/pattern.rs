//! Pattern attribution matches.

use serde::{Deserialize, Serialize};

/// One methodology attributed to a response.
///
/// A response may yield zero, one, or many matches; the detector
/// deduplicates by `pattern_id`, keeping the highest confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Identifier of the matched methodology.
    pub pattern_id: String,
    /// Attribution confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// The trigger terms that were found in the text.
    pub matched_terms: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_round_trip() {
        let m = PatternMatch {
            pattern_id: "five-whys".to_string(),
            confidence: 0.75,
            matched_terms: vec!["root cause".to_string(), "why".to_string()],
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: PatternMatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
