//! Memory entry envelope and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Layer;

/// Unique identifier for a memory entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Creates a new entry ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single record in one memory layer.
///
/// The envelope is identical across all layers; the [`Layer`] discriminator
/// plus an opaque payload replaces per-layer record schemas. Payload
/// structure is the writer's business and is carried through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier within the layer.
    pub entry_id: EntryId,
    /// The session this entry belongs to.
    pub session_id: String,
    /// The layer this entry lives in.
    pub layer: Layer,
    /// Opaque entry content.
    pub payload: String,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: u64,
    /// Retention priority in `[0.0, 1.0]`; higher survives eviction longer.
    pub importance_score: f64,
}

impl MemoryEntry {
    /// Renders the entry as one context line, `[layer] payload`.
    ///
    /// This is the unit the context aggregator packs whole; it never splits
    /// a rendered line.
    #[must_use]
    pub fn render(&self) -> String {
        format!("[{}] {}", self.layer, self.payload)
    }
}
