//! Fault-tolerant capability coordination.
//!
//! The coordinator is the only path to external capability providers. Every
//! call passes a per-provider circuit breaker, runs under a hard deadline,
//! and lands in a terminal [`CapabilityCall`] record. Operational outcomes
//! (`Timeout`, `ProviderError`, `CircuitOpen`) are data, not errors: a
//! misbehaving provider degrades the response instead of failing the
//! request.

mod breaker;
mod provider;

pub use breaker::{CircuitBreaker, CircuitState};
pub use provider::{
    CapabilityProvider, HttpCapabilityProvider, ProviderHttpConfig, StaticCapabilityProvider,
    build_http_client,
};

use crate::current_timestamp_ms;
use crate::models::{CallOutcome, CapabilityCall, CapabilityDescriptor};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Consecutive failures before a provider's circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit waits before admitting a trial call.
    pub cooldown_ms: u64,
    /// Hard per-call timeout in milliseconds (0 to disable).
    pub call_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
            call_timeout_ms: 10_000,
        }
    }
}

impl CoordinatorConfig {
    /// Loads coordinator configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("STRATACOG_BREAKER_FAILURE_THRESHOLD") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.failure_threshold = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("STRATACOG_BREAKER_COOLDOWN_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.cooldown_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("STRATACOG_CALL_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.call_timeout_ms = parsed;
            }
        }
        self
    }

    /// Sets the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the open-circuit cooldown in milliseconds.
    #[must_use]
    pub const fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    /// Sets the per-call timeout in milliseconds.
    #[must_use]
    pub const fn with_call_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.call_timeout_ms = timeout_ms;
        self
    }
}

/// Registry of capability providers and the capabilities they advertise.
#[derive(Default)]
pub struct CapabilityRegistry {
    providers: HashMap<String, Arc<dyn CapabilityProvider>>,
    descriptors: Vec<CapabilityDescriptor>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, replacing any previous provider with the same id.
    pub fn register_provider(&mut self, provider: Arc<dyn CapabilityProvider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Adds a capability descriptor.
    pub fn add_descriptor(&mut self, descriptor: CapabilityDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Returns the provider registered under the given id.
    #[must_use]
    pub fn provider(&self, provider_id: &str) -> Option<Arc<dyn CapabilityProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Returns all registered capability descriptors.
    #[must_use]
    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    /// Resolves a capability name to its best descriptor.
    ///
    /// Only descriptors whose provider is actually registered qualify.
    /// Highest weight wins; ties break to the lexically smallest provider id
    /// so resolution is deterministic.
    #[must_use]
    pub fn descriptor_for_capability(&self, capability: &str) -> Option<&CapabilityDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.capability == capability && self.providers.contains_key(&d.provider_id))
            .max_by(|a, b| {
                a.weight
                    .total_cmp(&b.weight)
                    .then_with(|| b.provider_id.cmp(&a.provider_id))
            })
    }

    /// Returns registered provider ids, sorted.
    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Coordinates capability calls with circuit breaking and hard deadlines.
pub struct CapabilityCoordinator {
    registry: CapabilityRegistry,
    config: CoordinatorConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    shutdown: CancellationToken,
}

impl CapabilityCoordinator {
    /// Creates a new coordinator over the given registry.
    #[must_use]
    pub fn new(registry: CapabilityRegistry, config: CoordinatorConfig) -> Self {
        Self {
            registry,
            config,
            breakers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the coordinator configuration.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Returns the provider registry.
    #[must_use]
    pub const fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Returns the configured per-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.config.call_timeout_ms)
    }

    /// Invokes a capability on a provider, returning a terminal call record.
    ///
    /// The circuit state for the provider applies first: an open circuit
    /// fails fast with a `CircuitOpen` outcome and no dispatch. Admitted
    /// calls run under the given hard timeout; the cancellation token passed
    /// to the provider fires when the deadline does, so a stalled provider
    /// cannot outlive the call.
    #[tracing::instrument(
        name = "stratacog.capability_call",
        skip(self, payload, timeout),
        fields(
            provider = %provider_id,
            capability = %capability_name,
            status = tracing::field::Empty
        )
    )]
    pub async fn invoke(
        &self,
        provider_id: &str,
        capability_name: &str,
        payload: &Value,
        timeout: Duration,
    ) -> CapabilityCall {
        let started_at = current_timestamp_ms();
        let call_start = Instant::now();

        let Some(provider) = self.registry.provider(provider_id) else {
            tracing::warn!(provider = %provider_id, "Unknown capability provider");
            let outcome = CallOutcome::ProviderError {
                detail: format!("unknown provider '{provider_id}'"),
            };
            return Self::finish_call(
                provider_id,
                capability_name,
                payload,
                started_at,
                call_start,
                outcome,
            );
        };

        if !self.admit(provider_id) {
            metrics::counter!(
                "stratacog_circuit_breaker_rejections_total",
                "provider" => provider_id.to_string()
            )
            .increment(1);
            return Self::finish_call(
                provider_id,
                capability_name,
                payload,
                started_at,
                call_start,
                CallOutcome::CircuitOpen,
            );
        }

        let outcome = Self::execute_with_deadline(
            provider.as_ref(),
            capability_name,
            payload,
            timeout,
            self.shutdown.child_token(),
        )
        .await;

        self.record_outcome(provider_id, &outcome);
        Self::finish_call(
            provider_id,
            capability_name,
            payload,
            started_at,
            call_start,
            outcome,
        )
    }

    /// Reports whether a provider's circuit would admit a call right now.
    ///
    /// Pure read of circuit state; a provider that has never been called is
    /// healthy. Used to avoid routing to a known-unhealthy provider before
    /// even attempting a call.
    #[must_use]
    pub fn is_provider_healthy(&self, provider_id: &str) -> bool {
        let breakers = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        breakers.get(provider_id).is_none_or(CircuitBreaker::is_healthy)
    }

    /// Returns a snapshot of every provider circuit, sorted by provider id.
    #[must_use]
    pub fn circuit_states(&self) -> Vec<(String, CircuitState)> {
        let breakers = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<(String, CircuitState)> = breakers
            .iter()
            .map(|(id, breaker)| (id.clone(), breaker.snapshot()))
            .collect();
        drop(breakers);
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Cancels all in-flight provider calls.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs the breaker admission check for a provider.
    fn admit(&self, provider_id: &str) -> bool {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let breaker = breakers
            .entry(provider_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(&self.config, provider_id));
        let admitted = breaker.allow();
        let state = breaker.state_value();
        drop(breakers);

        metrics::gauge!(
            "stratacog_circuit_breaker_state",
            "provider" => provider_id.to_string()
        )
        .set(f64::from(state));
        admitted
    }

    async fn execute_with_deadline(
        provider: &dyn CapabilityProvider,
        capability_name: &str,
        payload: &Value,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> CallOutcome {
        let deadline = if timeout.is_zero() {
            Duration::MAX
        } else {
            timeout
        };

        match tokio::time::timeout(
            deadline,
            provider.execute(capability_name, payload, cancel.clone()),
        )
        .await
        {
            Ok(Ok(result)) => CallOutcome::Success { payload: result },
            Ok(Err(err)) => CallOutcome::ProviderError {
                detail: err.to_string(),
            },
            Err(_) => {
                // Deadline fired: cancel so the provider task cannot
                // outlive the call.
                cancel.cancel();
                CallOutcome::Timeout
            },
        }
    }

    /// Feeds a call outcome into the provider's breaker.
    fn record_outcome(&self, provider_id: &str, outcome: &CallOutcome) {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(breaker) = breakers.get_mut(provider_id) else {
            return;
        };

        if outcome.is_success() {
            breaker.on_success();
        } else if outcome.counts_as_failure() {
            let tripped = breaker.on_failure();
            if tripped {
                metrics::counter!(
                    "stratacog_circuit_breaker_trips_total",
                    "provider" => provider_id.to_string()
                )
                .increment(1);
            }
        }
        let state = breaker.state_value();
        drop(breakers);

        metrics::gauge!(
            "stratacog_circuit_breaker_state",
            "provider" => provider_id.to_string()
        )
        .set(f64::from(state));
    }

    /// Builds the terminal call record and emits per-call telemetry.
    fn finish_call(
        provider_id: &str,
        capability_name: &str,
        payload: &Value,
        started_at: u64,
        call_start: Instant,
        outcome: CallOutcome,
    ) -> CapabilityCall {
        let status = outcome.as_str();
        tracing::Span::current().record("status", status);

        metrics::counter!(
            "stratacog_capability_requests_total",
            "provider" => provider_id.to_string(),
            "capability" => capability_name.to_string(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            "stratacog_capability_call_duration_ms",
            "provider" => provider_id.to_string(),
            "status" => status
        )
        .record(call_start.elapsed().as_secs_f64() * 1000.0);

        CapabilityCall {
            provider_id: provider_id.to_string(),
            capability_name: capability_name.to_string(),
            request_payload: payload.clone(),
            started_at,
            completed_at: current_timestamp_ms(),
            outcome,
        }
    }
}
