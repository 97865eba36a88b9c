//! Structured orchestration output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ComplexityTier, PatternMatch};

/// The structured result handed to the presentation layer.
///
/// The core emits data only; rendering and disclosure text belong to the
/// consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseContext {
    /// The session the response belongs to.
    pub session_id: String,
    /// Aggregated memory context, bounded by the configured budget.
    pub context: String,
    /// Assigned complexity tier.
    pub tier: ComplexityTier,
    /// Enhancement payload from a successful capability call, if any.
    pub enhancement: Option<Value>,
    /// Methodologies attributed to this response.
    pub attributions: Vec<PatternMatch>,
    /// Whether any step degraded while producing this response.
    pub degraded: bool,
}

impl ResponseContext {
    /// The merged text the pattern detector scans: the context blob plus
    /// any enhancement payload rendering.
    #[must_use]
    pub fn merged_text(&self) -> String {
        match &self.enhancement {
            Some(value) => {
                let mut merged =
                    String::with_capacity(self.context.len() + 64);
                merged.push_str(&self.context);
                if !merged.is_empty() {
                    merged.push('\n');
                }
                merged.push_str(&render_enhancement(value));
                merged
            }
            None => self.context.clone(),
        }
    }
}

/// Flattens an enhancement payload into scannable text.
///
/// String leaves are taken verbatim; everything else falls back to compact
/// JSON so trigger terms inside nested values stay visible.
fn render_enhancement(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .values()
            .map(render_enhancement)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) => items
            .iter()
            .map(render_enhancement)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_response() -> ResponseContext {
        ResponseContext {
            session_id: "s1".to_string(),
            context: "[strategic] prefer additive migrations".to_string(),
            tier: ComplexityTier::Complex,
            enhancement: None,
            attributions: Vec::new(),
            degraded: false,
        }
    }

    #[test]
    fn test_merged_text_without_enhancement() {
        let response = base_response();
        assert_eq!(response.merged_text(), response.context);
    }

    #[test]
    fn test_merged_text_appends_enhancement_strings() {
        let mut response = base_response();
        response.enhancement = Some(json!({
            "analysis": "start from first principles",
            "steps": ["ask why", "ask why again"],
        }));
        let merged = response.merged_text();
        assert!(merged.starts_with("[strategic]"));
        assert!(merged.contains("first principles"));
        assert!(merged.contains("ask why again"));
    }

    #[test]
    fn test_merged_text_with_empty_context_has_no_leading_newline() {
        let mut response = base_response();
        response.context = String::new();
        response.enhancement = Some(json!("standalone analysis"));
        assert_eq!(response.merged_text(), "standalone analysis");
    }
}
