//! Decision orchestration.
//!
//! [`DecisionOrchestrator::handle_request`] is the single entry point for a
//! turn: aggregate session context, classify complexity, optionally invoke a
//! capability, attribute methodologies, write the turn back, and persist an
//! audit record. Every step short of response construction degrades instead
//! of aborting: a storage outage or misbehaving provider yields a reduced
//! response plus an audit trail of what was skipped, never an error.
//!
//! Requests for the same session are serialized through a per-session lock;
//! distinct sessions proceed in parallel. The only other shared-mutable
//! state is the coordinator's circuit map, which locks internally.

mod audit;

pub use audit::AuditLog;

use crate::classifier::ComplexityClassifier;
use crate::coordinator::CapabilityCoordinator;
use crate::current_timestamp_ms;
use crate::memory::{LayeredStore, RetentionPolicy, validate_session_id};
use crate::models::{
    AuditRecord, CapabilityCall, ComplexityAssessment, ComplexityTier, Layer, ResponseContext,
};
use crate::patterns::PatternDetector;
use crate::storage::StorageBackend;
use crate::{Error, Result};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::instrument;

/// Default character budget for aggregated session context.
pub const DEFAULT_CONTEXT_BUDGET_CHARS: usize = 4_000;

/// How many per-session locks are kept before idle sessions age out.
const SESSION_LOCK_CAPACITY: usize = 1_024;

/// Storage key for a session marker.
fn session_key(session_id: &str) -> String {
    format!("session/{session_id}")
}

/// A session known to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// The session identifier.
    pub session_id: String,
    /// When the session's first request arrived (Unix epoch milliseconds).
    pub first_seen_ms: u64,
}

/// Importance assigned to a turn's write-back, derived from its tier.
const fn turn_importance(tier: ComplexityTier) -> f64 {
    match tier {
        ComplexityTier::Simple => 0.3,
        ComplexityTier::Moderate => 0.5,
        ComplexityTier::Complex => 0.7,
        ComplexityTier::Systematic => 0.9,
    }
}

/// Facade over the memory store, classifier, coordinator, and detector.
pub struct DecisionOrchestrator<B: StorageBackend> {
    backend: Arc<B>,
    store: LayeredStore<B>,
    audit: AuditLog<B>,
    classifier: ComplexityClassifier,
    detector: PatternDetector,
    coordinator: CapabilityCoordinator,
    context_layers: Vec<Layer>,
    context_budget_chars: usize,
    session_locks: Mutex<LruCache<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<B: StorageBackend> DecisionOrchestrator<B> {
    /// Creates a new orchestrator over the given backend and components.
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        policy: RetentionPolicy,
        classifier: ComplexityClassifier,
        detector: PatternDetector,
        coordinator: CapabilityCoordinator,
    ) -> Self {
        let capacity =
            NonZeroUsize::new(SESSION_LOCK_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: LayeredStore::new(Arc::clone(&backend), policy),
            audit: AuditLog::new(Arc::clone(&backend)),
            backend,
            classifier,
            detector,
            coordinator,
            context_layers: Layer::all().to_vec(),
            context_budget_chars: DEFAULT_CONTEXT_BUDGET_CHARS,
            session_locks: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Sets the layers aggregated into request context.
    #[must_use]
    pub fn with_context_layers(mut self, layers: Vec<Layer>) -> Self {
        self.context_layers = layers;
        self
    }

    /// Sets the character budget for aggregated context.
    #[must_use]
    pub const fn with_context_budget(mut self, budget_chars: usize) -> Self {
        self.context_budget_chars = budget_chars;
        self
    }

    /// Returns the layered memory store.
    #[must_use]
    pub const fn store(&self) -> &LayeredStore<B> {
        &self.store
    }

    /// Returns the audit log.
    #[must_use]
    pub const fn audit(&self) -> &AuditLog<B> {
        &self.audit
    }

    /// Returns the capability coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &CapabilityCoordinator {
        &self.coordinator
    }

    /// Handles one request for a session.
    ///
    /// Runs the full decision flow and returns the response context along
    /// with the audit record persisted for the turn. Steps degrade
    /// individually; the audit record's `degraded` list names everything
    /// that was skipped or reduced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OrchestrationFailed`] only when no response can be
    /// constructed at all (currently: an unusable session id). Degraded
    /// responses are `Ok`.
    #[instrument(
        name = "stratacog.handle_request",
        skip(self, request_text),
        fields(session = %session_id, tier = tracing::field::Empty)
    )]
    pub async fn handle_request(
        &self,
        session_id: &str,
        request_text: &str,
    ) -> Result<(ResponseContext, AuditRecord)> {
        if let Err(err) = validate_session_id(session_id) {
            return Err(Error::OrchestrationFailed {
                cause: err.to_string(),
            });
        }

        let lock = self.session_lock(session_id);
        let _serialized = lock.lock().await;
        let request_start = Instant::now();
        let mut degraded: Vec<String> = Vec::new();

        self.ensure_session_marker(session_id);

        // Step 1: bounded context from the memory layers.
        let context = match self.store.aggregate_context(
            session_id,
            &self.context_layers,
            self.context_budget_chars,
        ) {
            Ok(blob) => blob,
            Err(err) => {
                tracing::warn!(session = %session_id, error = %err, "Context aggregation degraded");
                degraded.push("context_unavailable".to_string());
                String::new()
            },
        };

        // Step 2: classify the request against its context.
        let assessment = self.classifier.assess(request_text, &context);
        tracing::Span::current().record("tier", assessment.tier.as_str());

        // Step 3: invoke the recommended capability if its provider is healthy.
        let call = match assessment.recommended_capability.as_deref() {
            Some(capability) => {
                self.invoke_capability(capability, session_id, request_text, &context, &mut degraded)
                    .await
            },
            None => None,
        };

        // Step 4: merge context and enhancement into the response.
        let enhancement = call
            .as_ref()
            .and_then(|c| c.result_payload())
            .cloned();
        let mut response = ResponseContext {
            session_id: session_id.to_string(),
            context,
            tier: assessment.tier,
            enhancement,
            attributions: Vec::new(),
            degraded: false,
        };

        // Step 5: attribute methodologies on the merged text.
        let matches = self.detector.detect(&response.merged_text());
        response.attributions.clone_from(&matches);

        // Step 6: write the turn back into the conversation layer.
        if let Err(err) = self.write_turn(session_id, request_text, &assessment) {
            tracing::warn!(session = %session_id, error = %err, "Turn write-back degraded");
            degraded.push("turn_write_failed".to_string());
        }

        // Step 7: persist the audit record.
        let record = AuditRecord {
            session_id: session_id.to_string(),
            request_summary: AuditRecord::summarize_request(request_text),
            complexity: assessment,
            capability_calls: call.into_iter().collect(),
            pattern_matches: matches,
            degraded: degraded.clone(),
            timestamp: current_timestamp_ms(),
        };
        if let Err(err) = self.audit.append(&record) {
            tracing::warn!(session = %session_id, error = %err, "Audit append failed");
            metrics::counter!("stratacog_audit_append_failures_total").increment(1);
        }

        response.degraded = !degraded.is_empty();
        metrics::counter!(
            "stratacog_requests_total",
            "tier" => record.complexity.tier.as_str(),
            "degraded" => if response.degraded { "true" } else { "false" }
        )
        .increment(1);
        metrics::histogram!("stratacog_request_duration_ms")
            .record(request_start.elapsed().as_secs_f64() * 1000.0);

        Ok((response, record))
    }

    /// Returns every session known to the store, ordered by session id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend is unavailable.
    pub fn sessions(&self) -> Result<Vec<SessionInfo>> {
        let rows = self.backend.get_range("session/", usize::MAX)?;
        let mut sessions: Vec<SessionInfo> = rows
            .iter()
            .filter_map(|(key, value)| match serde_json::from_str(value) {
                Ok(info) => Some(info),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "Skipping corrupt session marker");
                    None
                },
            })
            .collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(sessions)
    }

    /// Resolves the recommended capability and invokes it when routable.
    async fn invoke_capability(
        &self,
        capability: &str,
        session_id: &str,
        request_text: &str,
        context: &str,
        degraded: &mut Vec<String>,
    ) -> Option<CapabilityCall> {
        let provider_id = match self
            .coordinator
            .registry()
            .descriptor_for_capability(capability)
        {
            Some(descriptor) => descriptor.provider_id.clone(),
            None => {
                tracing::warn!(capability = %capability, "Recommended capability has no provider");
                degraded.push(format!("capability_unresolved:{capability}"));
                return None;
            },
        };

        // Known-unhealthy providers are skipped outright rather than burned
        // as a guaranteed CircuitOpen call.
        if !self.coordinator.is_provider_healthy(&provider_id) {
            tracing::info!(
                provider = %provider_id,
                capability = %capability,
                "Skipping unhealthy provider"
            );
            degraded.push(format!("capability_skipped:{provider_id}"));
            return None;
        }

        let payload = serde_json::json!({
            "session_id": session_id,
            "request": request_text,
            "context": context,
        });
        let call = self
            .coordinator
            .invoke(
                &provider_id,
                capability,
                &payload,
                self.coordinator.call_timeout(),
            )
            .await;

        if !call.outcome.is_success() {
            degraded.push(format!("capability_{}", call.outcome.as_str()));
        }
        Some(call)
    }

    /// Writes the turn summary into the conversation layer.
    fn write_turn(
        &self,
        session_id: &str,
        request_text: &str,
        assessment: &ComplexityAssessment,
    ) -> Result<()> {
        let summary = AuditRecord::summarize_request(request_text);
        if summary.is_empty() {
            return Ok(());
        }
        self.store
            .write(
                session_id,
                Layer::Conversation,
                &summary,
                turn_importance(assessment.tier),
            )
            .map(|_| ())
    }

    /// Persists a session marker on first contact.
    fn ensure_session_marker(&self, session_id: &str) {
        let key = session_key(session_id);
        match self.backend.get(&key) {
            Ok(Some(_)) => {},
            Ok(None) => {
                let info = SessionInfo {
                    session_id: session_id.to_string(),
                    first_seen_ms: current_timestamp_ms(),
                };
                let Ok(value) = serde_json::to_string(&info) else {
                    return;
                };
                if let Err(err) = self.backend.put(&key, &value) {
                    tracing::warn!(session = %session_id, error = %err, "Failed to persist session marker");
                }
            },
            Err(err) => {
                tracing::warn!(session = %session_id, error = %err, "Failed to read session marker");
            },
        }
    }

    /// Returns the serialization lock for a session.
    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .session_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(session_id) {
            return Arc::clone(lock);
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.put(session_id.to_string(), Arc::clone(&lock));
        lock
    }
}
