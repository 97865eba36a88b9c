//! End-to-end tests for the decision flow.
//!
//! Exercises the full path from configuration to response: context
//! aggregation, classification, capability routing with circuit breaking,
//! pattern attribution, write-back, and the audit trail. Runs on the
//! in-memory backend except where sqlite durability is the point.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use stratacog::config::{ProviderKind, ProviderSpec, StratacogConfig};
use stratacog::coordinator::{
    CapabilityCoordinator, CapabilityProvider, CapabilityRegistry, CoordinatorConfig,
};
use stratacog::memory::{LayerBounds, RetentionPolicy};
use stratacog::models::{CallOutcome, CapabilityDescriptor, ComplexityTier, Layer};
use stratacog::orchestrator::DecisionOrchestrator;
use stratacog::patterns::{DetectorConfig, PatternLibrary};
use stratacog::storage::{MemoryBackend, SqliteBackend};
use stratacog::{ComplexityClassifier, PatternDetector};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

const COMPLEX_REQUEST: &str =
    "Analyze the architecture and design a migration strategy for the platform";

/// Provider that fails the first `failures` calls, then succeeds.
struct RecoveringProvider {
    id: String,
    failures: u32,
    calls: AtomicU32,
}

impl RecoveringProvider {
    fn new(id: &str, failures: u32) -> Self {
        Self {
            id: id.to_string(),
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CapabilityProvider for RecoveringProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        _capability: &str,
        _payload: &Value,
        _cancel: CancellationToken,
    ) -> stratacog::Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(stratacog::Error::OperationFailed {
                operation: "execute".to_string(),
                cause: format!("scripted failure {call}"),
            })
        } else {
            Ok(json!({"recovered_on_call": call}))
        }
    }
}

/// Provider that never answers within any reasonable deadline.
struct HangingProvider;

#[async_trait]
impl CapabilityProvider for HangingProvider {
    fn id(&self) -> &str {
        "tarpit"
    }

    async fn execute(
        &self,
        _capability: &str,
        _payload: &Value,
        cancel: CancellationToken,
    ) -> stratacog::Result<Value> {
        cancel.cancelled().await;
        Err(stratacog::Error::OperationFailed {
            operation: "execute".to_string(),
            cause: "cancelled".to_string(),
        })
    }
}

fn analysis_descriptor(provider_id: &str) -> CapabilityDescriptor {
    CapabilityDescriptor {
        capability: "deep-analysis".to_string(),
        provider_id: provider_id.to_string(),
        weight: 1.0,
        signals: vec!["architecture".to_string(), "analysis".to_string()],
    }
}

/// Builds an orchestrator around one scripted provider.
fn orchestrator_with_provider(
    provider: Arc<dyn CapabilityProvider>,
    coordinator_config: CoordinatorConfig,
) -> DecisionOrchestrator<MemoryBackend> {
    let descriptor = analysis_descriptor(provider.id());
    let mut registry = CapabilityRegistry::new();
    registry.register_provider(provider);
    registry.add_descriptor(descriptor.clone());

    DecisionOrchestrator::new(
        Arc::new(MemoryBackend::new()),
        RetentionPolicy::new(),
        ComplexityClassifier::new(stratacog::classifier::ClassifierConfig::default(), vec![
            descriptor,
        ]),
        PatternDetector::new(PatternLibrary::builtin(), DetectorConfig::default()),
        CapabilityCoordinator::new(registry, coordinator_config),
    )
}

/// A config wiring a static provider behind the analysis capability.
fn config_with_static_provider() -> StratacogConfig {
    StratacogConfig {
        providers: vec![ProviderSpec {
            id: "canned".to_string(),
            kind: ProviderKind::Static,
            endpoint: None,
            payload: Some(json!({"advice": "cache the hot path"})),
        }],
        capabilities: vec![analysis_descriptor("canned")],
        ..Default::default()
    }
}

// ============================================================================
// Config-Assembled Flow
// ============================================================================

#[tokio::test]
async fn test_config_built_orchestrator_end_to_end() {
    let config = config_with_static_provider();
    let orchestrator = config
        .build_orchestrator(Arc::new(MemoryBackend::new()))
        .expect("build orchestrator");

    let (response, record) = orchestrator
        .handle_request("sess-e2e", COMPLEX_REQUEST)
        .await
        .expect("handle");

    assert!(response.tier >= ComplexityTier::Complex);
    assert_eq!(
        response.enhancement.expect("enhancement")["advice"],
        "cache the hot path"
    );
    assert!(!response.degraded);
    assert_eq!(record.capability_calls.len(), 1);
    assert_eq!(record.capability_calls[0].provider_id, "canned");
    assert!(record.capability_calls[0].outcome.is_success());
}

#[tokio::test]
async fn test_session_memory_accumulates_across_turns() {
    let config = config_with_static_provider();
    let orchestrator = config
        .build_orchestrator(Arc::new(MemoryBackend::new()))
        .expect("build orchestrator");

    for turn in ["we use postgres", "the api is graphql", "deploys are on fridays"] {
        orchestrator
            .handle_request("sess-mem", turn)
            .await
            .expect("handle");
    }

    let (response, _) = orchestrator
        .handle_request("sess-mem", "what do you know so far?")
        .await
        .expect("handle");

    assert!(response.context.contains("we use postgres"));
    assert!(response.context.contains("the api is graphql"));
    assert!(response.context.contains("deploys are on fridays"));
}

#[tokio::test]
async fn test_retention_bounds_hold_across_requests() {
    let config = StratacogConfig {
        retention: RetentionPolicy::new()
            .with_layer_bounds(Layer::Conversation, LayerBounds::entries_only(2)),
        ..Default::default()
    };
    let orchestrator = config
        .build_orchestrator(Arc::new(MemoryBackend::new()))
        .expect("build orchestrator");

    for turn in ["one", "two", "three", "four"] {
        orchestrator
            .handle_request("sess-ret", turn)
            .await
            .expect("handle");
    }

    let entries = orchestrator
        .store()
        .query("sess-ret", Layer::Conversation, 10)
        .expect("query");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].payload, "four");
    assert_eq!(entries[1].payload, "three");
}

#[tokio::test]
async fn test_context_budget_bounds_response_context() {
    let config = StratacogConfig {
        context: stratacog::config::ContextConfig {
            layers: Layer::all().to_vec(),
            budget_chars: 64,
        },
        ..Default::default()
    };
    let orchestrator = config
        .build_orchestrator(Arc::new(MemoryBackend::new()))
        .expect("build orchestrator");

    for i in 0..10 {
        orchestrator
            .handle_request("sess-budget", &format!("observation number {i} about the system"))
            .await
            .expect("handle");
    }

    let (response, _) = orchestrator
        .handle_request("sess-budget", "summarize")
        .await
        .expect("handle");
    assert!(response.context.chars().count() <= 64);
}

// ============================================================================
// Circuit Breaking Under Failure
// ============================================================================

#[tokio::test]
async fn test_breaker_opens_then_recovers_through_half_open() {
    let provider = Arc::new(RecoveringProvider::new("flaky", 2));
    let orchestrator = orchestrator_with_provider(
        provider,
        CoordinatorConfig::default()
            .with_failure_threshold(2)
            .with_cooldown_ms(50),
    );

    // Two failures trip the breaker.
    for _ in 0..2 {
        let (response, record) = orchestrator
            .handle_request("sess-cb", COMPLEX_REQUEST)
            .await
            .expect("handle");
        assert!(response.degraded);
        assert!(matches!(
            record.capability_calls[0].outcome,
            CallOutcome::ProviderError { .. }
        ));
    }

    // While open, the provider is skipped without a call.
    let (_, record) = orchestrator
        .handle_request("sess-cb", COMPLEX_REQUEST)
        .await
        .expect("handle");
    assert!(record.capability_calls.is_empty());
    assert!(record.degraded.iter().any(|d| d == "capability_skipped:flaky"));

    // After the cooldown the half-open trial succeeds and closes the circuit.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let (response, record) = orchestrator
        .handle_request("sess-cb", COMPLEX_REQUEST)
        .await
        .expect("handle");
    assert!(record.capability_calls[0].outcome.is_success());
    assert!(!response.degraded);
    assert!(orchestrator.coordinator().is_provider_healthy("flaky"));
}

#[tokio::test]
async fn test_hanging_provider_times_out_and_degrades() {
    let orchestrator = orchestrator_with_provider(
        Arc::new(HangingProvider),
        CoordinatorConfig::default().with_call_timeout_ms(50),
    );

    let (response, record) = orchestrator
        .handle_request("sess-hang", COMPLEX_REQUEST)
        .await
        .expect("handle");

    assert!(response.degraded);
    assert!(response.enhancement.is_none());
    assert_eq!(record.capability_calls.len(), 1);
    assert!(matches!(
        record.capability_calls[0].outcome,
        CallOutcome::Timeout
    ));
    assert!(record.degraded.iter().any(|d| d == "capability_timeout"));
}

#[tokio::test]
async fn test_degraded_turns_still_reach_audit_and_memory() {
    let provider = Arc::new(RecoveringProvider::new("flaky", u32::MAX));
    let orchestrator =
        orchestrator_with_provider(provider, CoordinatorConfig::default());

    orchestrator
        .handle_request("sess-deg", COMPLEX_REQUEST)
        .await
        .expect("handle");

    let records = orchestrator.audit().recent("sess-deg", 10).expect("recent");
    assert_eq!(records.len(), 1);
    assert!(!records[0].degraded.is_empty());

    let entries = orchestrator
        .store()
        .query("sess-deg", Layer::Conversation, 10)
        .expect("query");
    assert_eq!(entries.len(), 1);
}

// ============================================================================
// Sqlite Durability
// ============================================================================

#[tokio::test]
async fn test_sqlite_sessions_survive_reopen() {
    let temp_dir = TempDir::new().expect("temp dir");
    let db_path = temp_dir.path().join("stratacog.db");
    let config = config_with_static_provider();

    {
        let backend = Arc::new(SqliteBackend::new(&db_path).expect("open sqlite"));
        let orchestrator = config
            .build_orchestrator(backend)
            .expect("build orchestrator");
        orchestrator
            .handle_request("sess-durable", COMPLEX_REQUEST)
            .await
            .expect("handle");
        orchestrator
            .handle_request("sess-durable", "and a follow-up")
            .await
            .expect("handle");
    }

    let backend = Arc::new(SqliteBackend::new(&db_path).expect("reopen sqlite"));
    let orchestrator = config
        .build_orchestrator(backend)
        .expect("build orchestrator");

    let sessions = orchestrator.sessions().expect("sessions");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "sess-durable");

    let records = orchestrator
        .audit()
        .recent("sess-durable", 10)
        .expect("recent");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].request_summary, "and a follow-up");

    let (response, _) = orchestrator
        .handle_request("sess-durable", "what was the plan again?")
        .await
        .expect("handle");
    assert!(response.context.contains("and a follow-up"));
}

// ============================================================================
// Attribution Across the Merged Response
// ============================================================================

#[tokio::test]
async fn test_attribution_covers_enhancement_payload() {
    let provider = Arc::new(stratacog::coordinator::StaticCapabilityProvider::new(
        "mentor",
        json!({"advice": "run a premortem before the rollout"}),
    ));
    let orchestrator =
        orchestrator_with_provider(provider, CoordinatorConfig::default());

    let (response, _) = orchestrator
        .handle_request("sess-attr", COMPLEX_REQUEST)
        .await
        .expect("handle");

    assert!(
        response
            .attributions
            .iter()
            .any(|m| m.pattern_id == "premortem"),
        "expected the enhancement payload to be attributed, got {:?}",
        response.attributions
    );
}
