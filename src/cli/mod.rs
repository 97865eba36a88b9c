//! CLI output rendering.
//!
//! The binary's command handlers live in `main.rs`; this module holds the
//! structured report types and the text renderers they share, so every
//! command can serve both human output and `--json` from the same data.

use serde::Serialize;
use std::fmt::Write as _;

use crate::coordinator::CircuitState;
use crate::models::{AuditRecord, Layer, ResponseContext};
use crate::orchestrator::SessionInfo;
use crate::{Error, Result};

/// One provider's circuit, as reported by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Provider identifier.
    pub provider_id: String,
    /// Whether the circuit would admit a call right now.
    pub healthy: bool,
    /// Point-in-time circuit state.
    #[serde(flatten)]
    pub state: CircuitState,
}

/// Entry count for one layer of a session.
#[derive(Debug, Clone, Serialize)]
pub struct LayerCount {
    /// The layer.
    pub layer: Layer,
    /// Live entries in the layer.
    pub entries: usize,
}

/// The `status` command's report.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Registered providers and their circuits, sorted by id.
    pub providers: Vec<ProviderStatus>,
    /// Known session count.
    pub sessions: usize,
    /// Per-layer entry counts, present when a session was requested.
    pub session_layers: Option<Vec<LayerCount>>,
}

/// Serializes any report as pretty JSON for `--json` output.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "render_json".to_string(),
        cause: e.to_string(),
    })
}

/// Renders an orchestrated response for terminal output.
#[must_use]
pub fn render_response(response: &ResponseContext, record: &AuditRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session: {}", response.session_id);
    let _ = writeln!(
        out,
        "Tier: {} (confidence {:.2})",
        response.tier, record.complexity.confidence
    );
    if !record.complexity.matched_signals.is_empty() {
        let _ = writeln!(
            out,
            "Signals: {}",
            record.complexity.matched_signals.join(", ")
        );
    }

    if response.context.is_empty() {
        let _ = writeln!(out, "Context: (none)");
    } else {
        let _ = writeln!(out, "Context:");
        for line in response.context.lines() {
            let _ = writeln!(out, "  {line}");
        }
    }

    if let Some(enhancement) = &response.enhancement {
        let _ = writeln!(out, "Enhancement:");
        let rendered =
            serde_json::to_string_pretty(enhancement).unwrap_or_else(|_| enhancement.to_string());
        for line in rendered.lines() {
            let _ = writeln!(out, "  {line}");
        }
    }

    for call in &record.capability_calls {
        let _ = writeln!(
            out,
            "Capability: {} via {} -> {} ({}ms)",
            call.capability_name,
            call.provider_id,
            call.outcome.as_str(),
            call.completed_at.saturating_sub(call.started_at)
        );
    }

    if !response.attributions.is_empty() {
        let _ = writeln!(out, "Attributions:");
        for m in &response.attributions {
            let _ = writeln!(
                out,
                "  [{:.2}] {} ({})",
                m.confidence,
                m.pattern_id,
                m.matched_terms.join(", ")
            );
        }
    }

    if response.degraded {
        let _ = writeln!(out, "Degraded: {}", record.degraded.join(", "));
    }
    out
}

/// Renders recent audit records, most recent first.
#[must_use]
pub fn render_audit(records: &[AuditRecord]) -> String {
    if records.is_empty() {
        return "No audit records.\n".to_string();
    }

    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "[{}] {} tier={} calls={} matches={}{}",
            record.timestamp,
            record.request_summary,
            record.complexity.tier,
            record.capability_calls.len(),
            record.pattern_matches.len(),
            if record.degraded.is_empty() {
                String::new()
            } else {
                format!(" degraded={}", record.degraded.join(","))
            }
        );
    }
    out
}

/// Renders known sessions.
#[must_use]
pub fn render_sessions(sessions: &[SessionInfo]) -> String {
    if sessions.is_empty() {
        return "No sessions.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Sessions ({}):", sessions.len());
    for session in sessions {
        let _ = writeln!(
            out,
            "  {} (first seen {})",
            session.session_id, session.first_seen_ms
        );
    }
    out
}

/// Renders the status report.
#[must_use]
pub fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Sessions: {}", report.sessions);

    if report.providers.is_empty() {
        let _ = writeln!(out, "Providers: none configured");
    } else {
        let _ = writeln!(out, "Providers:");
        for provider in &report.providers {
            let state = match provider.state {
                CircuitState::Closed {
                    consecutive_failures,
                } => format!("closed (failures {consecutive_failures})"),
                CircuitState::Open {
                    remaining_cooldown_ms,
                } => format!("open (cooldown {remaining_cooldown_ms}ms remaining)"),
                CircuitState::HalfOpen => "half-open (trial in flight)".to_string(),
            };
            let _ = writeln!(
                out,
                "  {} {} [{}]",
                if provider.healthy { "+" } else { "!" },
                provider.provider_id,
                state
            );
        }
    }

    if let Some(layers) = &report.session_layers {
        let _ = writeln!(out, "Layers:");
        for count in layers {
            let _ = writeln!(out, "  {:<16} {}", count.layer.as_str(), count.entries);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CallOutcome, CapabilityCall, ComplexityAssessment, ComplexityTier, PatternMatch,
    };
    use serde_json::json;

    fn sample_record() -> AuditRecord {
        AuditRecord {
            session_id: "s1".to_string(),
            request_summary: "redesign the pipeline".to_string(),
            complexity: ComplexityAssessment {
                tier: ComplexityTier::Complex,
                confidence: 0.8,
                matched_signals: vec!["architecture".to_string()],
                recommended_capability: Some("deep-analysis".to_string()),
            },
            capability_calls: vec![CapabilityCall {
                provider_id: "analyst".to_string(),
                capability_name: "deep-analysis".to_string(),
                request_payload: json!({}),
                started_at: 100,
                completed_at: 150,
                outcome: CallOutcome::Success {
                    payload: json!({"advice": "split it"}),
                },
            }],
            pattern_matches: vec![PatternMatch {
                pattern_id: "first-principles".to_string(),
                confidence: 0.9,
                matched_terms: vec!["first principles".to_string()],
            }],
            degraded: Vec::new(),
            timestamp: 200,
        }
    }

    fn sample_response() -> ResponseContext {
        ResponseContext {
            session_id: "s1".to_string(),
            context: "[strategic] prefer additive migrations".to_string(),
            tier: ComplexityTier::Complex,
            enhancement: Some(json!({"advice": "split it"})),
            attributions: vec![PatternMatch {
                pattern_id: "first-principles".to_string(),
                confidence: 0.9,
                matched_terms: vec!["first principles".to_string()],
            }],
            degraded: false,
        }
    }

    #[test]
    fn test_render_response_covers_sections() {
        let text = render_response(&sample_response(), &sample_record());
        assert!(text.contains("Session: s1"));
        assert!(text.contains("Tier: complex"));
        assert!(text.contains("prefer additive migrations"));
        assert!(text.contains("deep-analysis via analyst -> success (50ms)"));
        assert!(text.contains("[0.90] first-principles"));
        assert!(!text.contains("Degraded"));
    }

    #[test]
    fn test_render_response_marks_degradation() {
        let mut response = sample_response();
        let mut record = sample_record();
        response.degraded = true;
        record.degraded = vec!["capability_timeout".to_string()];
        let text = render_response(&response, &record);
        assert!(text.contains("Degraded: capability_timeout"));
    }

    #[test]
    fn test_render_audit_empty() {
        assert_eq!(render_audit(&[]), "No audit records.\n");
    }

    #[test]
    fn test_render_audit_one_line_per_record() {
        let records = vec![sample_record(), sample_record()];
        let text = render_audit(&records);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("tier=complex calls=1 matches=1"));
    }

    #[test]
    fn test_render_status_reports_circuits() {
        let report = StatusReport {
            providers: vec![
                ProviderStatus {
                    provider_id: "analyst".to_string(),
                    healthy: true,
                    state: CircuitState::Closed {
                        consecutive_failures: 0,
                    },
                },
                ProviderStatus {
                    provider_id: "flaky".to_string(),
                    healthy: false,
                    state: CircuitState::Open {
                        remaining_cooldown_ms: 12_000,
                    },
                },
            ],
            sessions: 3,
            session_layers: None,
        };
        let text = render_status(&report);
        assert!(text.contains("Sessions: 3"));
        assert!(text.contains("+ analyst [closed (failures 0)]"));
        assert!(text.contains("! flaky [open (cooldown 12000ms remaining)]"));
    }

    #[test]
    fn test_status_report_serializes() {
        let report = StatusReport {
            providers: vec![],
            sessions: 0,
            session_layers: Some(vec![LayerCount {
                layer: Layer::Conversation,
                entries: 4,
            }]),
        };
        let json = to_json(&report).unwrap();
        assert!(json.contains("\"conversation\""));
        assert!(json.contains("\"entries\": 4"));
    }
}
