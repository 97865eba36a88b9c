//! # Stratacog
//!
//! Context layering and enhancement decision core for interactive AI
//! sessions.
//!
//! Stratacog maintains a multi-layer, retention-bounded memory of an ongoing
//! session, classifies each incoming request by complexity, decides whether
//! to engage an external specialist capability, coordinates those calls with
//! circuit breaking and hard timeouts, and attributes named methodologies to
//! the produced response with confidence scores.
//!
//! ## Features
//!
//! - Eight independent memory layers with per-layer retention bounds
//! - Deterministic lexical complexity classification with tier thresholds
//! - Per-provider circuit breakers with bounded-timeout capability calls
//! - Word-boundary pattern attribution with confidence scoring
//! - Append-only audit trail for every orchestrated request
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stratacog::{MemoryBackend, StratacogConfig};
//!
//! let config = StratacogConfig::load_default().with_env_overrides();
//! let orchestrator = config.build_orchestrator(Arc::new(MemoryBackend::new()))?;
//! let (response, audit) = orchestrator
//!     .handle_request("session-1", "Design a migration strategy")
//!     .await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod classifier;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod memory;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod patterns;
pub mod storage;

// Re-exports for convenience
pub use classifier::ComplexityClassifier;
pub use config::StratacogConfig;
pub use coordinator::{CapabilityCoordinator, CapabilityProvider, CircuitBreaker};
pub use memory::LayeredStore;
pub use models::{
    AuditRecord, CallOutcome, CapabilityCall, ComplexityAssessment, ComplexityTier, Layer,
    MemoryEntry, PatternMatch, ResponseContext,
};
pub use orchestrator::DecisionOrchestrator;
pub use patterns::PatternDetector;
pub use storage::{MemoryBackend, SqliteBackend, StorageBackend};

/// Error type for stratacog operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `UnknownLayer` | A layer name outside the fixed registry reaches the store |
/// | `StorageUnavailable` | A storage operation still fails after one bounded retry |
/// | `InvalidInput` | Missing required parameters, malformed JSON, empty requests |
/// | `OperationFailed` | I/O errors, database failures, provider setup failures |
/// | `OrchestrationFailed` | No response could be constructed at all |
/// | `Config` | Configuration file or environment overrides are malformed |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A layer name does not match any registered memory layer.
    ///
    /// This is a programmer error: the set of layers is fixed and callers
    /// are expected to resolve names through [`models::Layer::from_name`]
    /// before touching the store.
    #[error("unknown memory layer: {name}")]
    UnknownLayer {
        /// The unrecognized layer name.
        name: String,
    },

    /// The durable store failed and the bounded retry was exhausted.
    ///
    /// Callers treat this as "context is now best-effort degraded", never
    /// as fatal to the overall request.
    #[error("storage unavailable during '{operation}': {cause}")]
    StorageUnavailable {
        /// The storage operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Required parameters are missing (e.g., empty request text)
    /// - JSON deserialization of a stored record fails
    /// - An importance score is not a finite number
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail before the retry layer
    /// - A capability provider cannot be constructed
    /// - Serialization of an audit record fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// No response could be constructed for the request.
    ///
    /// Every sub-component failure short of this degrades the response
    /// instead; this variant is the only one the orchestrator surfaces to
    /// external callers.
    #[error("orchestration failed: {cause}")]
    OrchestrationFailed {
        /// The underlying cause.
        cause: String,
    },

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for stratacog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Centralized so every component stamps entries and audit records from the
/// same clock. Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use stratacog::current_timestamp_ms;
///
/// let ts = current_timestamp_ms();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
