//! Append-only audit records.

use serde::{Deserialize, Serialize};

use super::{CapabilityCall, ComplexityAssessment, PatternMatch};

/// Maximum characters of request text kept in the audit summary.
pub const REQUEST_SUMMARY_MAX_CHARS: usize = 200;

/// One orchestrated request, recorded after the fact.
///
/// Append-only and never mutated after creation; the record always shows
/// what was attempted and what failed, whatever the final outcome. Ordered
/// monotonically by timestamp within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// The session the request belonged to.
    pub session_id: String,
    /// Truncated request text for identification.
    pub request_summary: String,
    /// The classifier's verdict.
    pub complexity: ComplexityAssessment,
    /// Every capability call issued for this request.
    pub capability_calls: Vec<CapabilityCall>,
    /// Methodologies attributed to the merged response context.
    pub pattern_matches: Vec<PatternMatch>,
    /// Steps that degraded instead of completing, e.g.
    /// `context_unavailable` or `capability_skipped:deep-analysis`.
    pub degraded: Vec<String>,
    /// Record timestamp (Unix epoch milliseconds).
    pub timestamp: u64,
}

impl AuditRecord {
    /// Truncates request text to the audit summary bound.
    ///
    /// Cuts on a char boundary, never mid-codepoint.
    #[must_use]
    pub fn summarize_request(request_text: &str) -> String {
        if request_text.chars().count() <= REQUEST_SUMMARY_MAX_CHARS {
            request_text.to_string()
        } else {
            request_text
                .chars()
                .take(REQUEST_SUMMARY_MAX_CHARS)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_short_request_unchanged() {
        assert_eq!(AuditRecord::summarize_request("hello"), "hello");
    }

    #[test]
    fn test_summarize_truncates_long_request() {
        let long = "x".repeat(500);
        let summary = AuditRecord::summarize_request(&long);
        assert_eq!(summary.chars().count(), REQUEST_SUMMARY_MAX_CHARS);
    }

    #[test]
    fn test_summarize_respects_char_boundaries() {
        let long = "é".repeat(300);
        let summary = AuditRecord::summarize_request(&long);
        assert_eq!(summary.chars().count(), REQUEST_SUMMARY_MAX_CHARS);
    }
}
