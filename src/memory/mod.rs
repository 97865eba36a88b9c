//! Layered session memory.
//!
//! Eight independent layers share one envelope type and one addressing
//! scheme: `memory/{session}/{layer}/{timestamp}-{seq}-{uuid}`. Keys embed
//! a zero-padded timestamp plus a write sequence, so a descending range
//! scan returns entries most-recent-first without a sort.

pub mod aggregate;
pub mod retention;

pub use aggregate::pack_entries;
pub use retention::{EvictionPlan, LayerBounds, RetentionPolicy, default_bounds};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::instrument;
use uuid::Uuid;

use crate::models::{EntryId, Layer, MemoryEntry};
use crate::storage::{StorageBackend, with_retry};
use crate::{Error, Result, current_timestamp_ms};

/// Validates a session identifier at the string boundary.
///
/// Session ids become key path segments, so a `/` would leak entries
/// across prefix scans.
pub(crate) fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(Error::InvalidInput(
            "session id must not be empty".to_string(),
        ));
    }
    if session_id.contains('/') {
        return Err(Error::InvalidInput(
            "session id must not contain '/'".to_string(),
        ));
    }
    Ok(())
}

fn layer_prefix(session_id: &str, layer: Layer) -> String {
    format!("memory/{session_id}/{layer}/")
}

fn entry_key(session_id: &str, layer: Layer, created_at: u64, seq: u64, entry_id: &EntryId) -> String {
    format!("memory/{session_id}/{layer}/{created_at:020}-{seq:010}-{entry_id}")
}

/// The multi-layer session memory store.
///
/// Writes run the retention policy synchronously before returning, so a
/// layer is never observed above its bounds. All storage faults inside
/// write/query paths go through the retry-once shim and surface as
/// [`Error::StorageUnavailable`], which callers treat as degraded context
/// rather than fatal.
pub struct LayeredStore<B: StorageBackend> {
    backend: Arc<B>,
    policy: RetentionPolicy,
    /// Orders writes that land in the same millisecond.
    write_seq: AtomicU64,
}

impl<B: StorageBackend> LayeredStore<B> {
    /// Creates a store over a shared backend.
    #[must_use]
    pub fn new(backend: Arc<B>, policy: RetentionPolicy) -> Self {
        Self {
            backend,
            policy,
            write_seq: AtomicU64::new(0),
        }
    }

    /// Returns the retention policy in force.
    #[must_use]
    pub const fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Appends an entry to a layer.
    ///
    /// `importance_score` is clamped into `[0.0, 1.0]`. Retention for the
    /// written layer runs before this returns; the returned id may
    /// therefore already be evicted when the new entry itself is the
    /// layer's lowest priority.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty session id, a session
    /// id containing `/`, an empty payload, or a non-finite importance;
    /// [`Error::StorageUnavailable`] when storage still fails after the
    /// bounded retry.
    #[instrument(name = "stratacog.memory.write", skip(self, payload), fields(layer = %layer))]
    pub fn write(
        &self,
        session_id: &str,
        layer: Layer,
        payload: &str,
        importance_score: f64,
    ) -> Result<EntryId> {
        validate_session_id(session_id)?;
        if payload.trim().is_empty() {
            return Err(Error::InvalidInput("payload must not be empty".to_string()));
        }
        if !importance_score.is_finite() {
            return Err(Error::InvalidInput(
                "importance score must be a finite number".to_string(),
            ));
        }

        let entry = MemoryEntry {
            entry_id: EntryId::new(Uuid::now_v7().to_string()),
            session_id: session_id.to_string(),
            layer,
            payload: payload.to_string(),
            created_at: current_timestamp_ms(),
            importance_score: importance_score.clamp(0.0, 1.0),
        };

        let json = serde_json::to_string(&entry).map_err(|e| Error::OperationFailed {
            operation: "serialize_entry".to_string(),
            cause: e.to_string(),
        })?;
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let key = entry_key(session_id, layer, entry.created_at, seq, &entry.entry_id);

        with_retry("memory_write", || self.backend.put(&key, &json))?;
        metrics::counter!("stratacog_memory_writes_total", "layer" => layer.as_str())
            .increment(1);

        let evicted = self.enforce_retention(session_id, layer)?;
        if evicted > 0 {
            tracing::debug!(layer = %layer, evicted, "retention evicted entries after write");
        }

        Ok(entry.entry_id)
    }

    /// Returns up to `limit` entries from a layer, most-recent-first.
    ///
    /// Returns an empty vec (not an error) when the layer has no entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] when storage still fails
    /// after the bounded retry.
    pub fn query(&self, session_id: &str, layer: Layer, limit: usize) -> Result<Vec<MemoryEntry>> {
        self.query_filtered(session_id, layer, limit, |_| true)
    }

    /// Returns up to `limit` entries matching `predicate`, most-recent-first.
    ///
    /// The predicate filters before the limit applies, so the caller gets
    /// up to `limit` matching entries rather than a filtered page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] when storage still fails
    /// after the bounded retry.
    pub fn query_filtered<F>(
        &self,
        session_id: &str,
        layer: Layer,
        limit: usize,
        predicate: F,
    ) -> Result<Vec<MemoryEntry>>
    where
        F: Fn(&MemoryEntry) -> bool,
    {
        validate_session_id(session_id)?;
        let rows = self.load_layer(session_id, layer)?;
        Ok(rows
            .into_iter()
            .map(|(_, entry)| entry)
            .filter(|entry| predicate(entry))
            .take(limit)
            .collect())
    }

    /// Packs entries from the requested layers into one bounded blob.
    ///
    /// Priority is importance descending then recency descending; ties
    /// across layers follow the order of `layers`. The output length never
    /// exceeds `budget_chars` and entries are dropped whole, lowest
    /// priority first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] when any layer read still
    /// fails after the bounded retry.
    #[instrument(name = "stratacog.memory.aggregate", skip(self, layers))]
    pub fn aggregate_context(
        &self,
        session_id: &str,
        layers: &[Layer],
        budget_chars: usize,
    ) -> Result<String> {
        validate_session_id(session_id)?;

        let mut seen = Vec::with_capacity(layers.len());
        let mut entries = Vec::new();
        for layer in layers.iter().copied() {
            if seen.contains(&layer) {
                continue;
            }
            seen.push(layer);
            let rows = self.load_layer(session_id, layer)?;
            entries.extend(rows.into_iter().map(|(_, entry)| entry));
        }

        let blob = pack_entries(&entries, budget_chars);
        metrics::histogram!("stratacog_context_chars")
            .record(u32::try_from(blob.chars().count()).map_or(f64::MAX, f64::from));
        Ok(blob)
    }

    /// Entry counts per layer for one session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] when storage still fails
    /// after the bounded retry.
    pub fn layer_counts(&self, session_id: &str) -> Result<Vec<(Layer, usize)>> {
        validate_session_id(session_id)?;
        let mut counts = Vec::with_capacity(Layer::all().len());
        for layer in Layer::all().iter().copied() {
            let prefix = layer_prefix(session_id, layer);
            let count = with_retry("memory_count", || self.backend.count_prefix(&prefix))?;
            counts.push((layer, count));
        }
        Ok(counts)
    }

    /// Loads a full layer as `(key, entry)` pairs, most-recent-first.
    ///
    /// Records that fail to deserialize are skipped with a warning rather
    /// than failing the read; one corrupt row must not take the layer down.
    fn load_layer(&self, session_id: &str, layer: Layer) -> Result<Vec<(String, MemoryEntry)>> {
        let prefix = layer_prefix(session_id, layer);
        let rows = with_retry("memory_query", || {
            self.backend.get_range(&prefix, usize::MAX)
        })?;

        let mut parsed = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            match serde_json::from_str::<MemoryEntry>(&value) {
                Ok(entry) => parsed.push((key, entry)),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping corrupt memory entry");
                    metrics::counter!("stratacog_memory_corrupt_entries_total").increment(1);
                }
            }
        }
        Ok(parsed)
    }

    /// Applies the retention plan for one layer, returning evicted count.
    ///
    /// Eviction is all-or-nothing per entry: a failed delete leaves that
    /// entry whole and moves on.
    fn enforce_retention(&self, session_id: &str, layer: Layer) -> Result<usize> {
        let rows = self.load_layer(session_id, layer)?;
        let entries: Vec<MemoryEntry> = rows.iter().map(|(_, e)| e.clone()).collect();
        let plan = self.policy.plan(layer, &entries, current_timestamp_ms());
        if plan.is_empty() {
            return Ok(0);
        }

        let mut evicted = 0;
        for entry_id in plan.evict_ids() {
            let Some((key, _)) = rows.iter().find(|(_, e)| &e.entry_id == entry_id) else {
                continue;
            };
            match with_retry("memory_evict", || self.backend.delete(key)) {
                Ok(_) => evicted += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "failed to evict entry, leaving it whole");
                }
            }
        }

        if evicted > 0 {
            metrics::counter!("stratacog_memory_evictions_total", "layer" => layer.as_str())
                .increment(u64::try_from(evicted).unwrap_or(u64::MAX));
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn test_store() -> LayeredStore<MemoryBackend> {
        LayeredStore::new(Arc::new(MemoryBackend::new()), RetentionPolicy::new())
    }

    #[test]
    fn test_write_then_query_round_trip() {
        let store = test_store();
        let id = store
            .write("s1", Layer::Strategic, "prefer additive migrations", 0.8)
            .unwrap();

        let entries = store.query("s1", Layer::Strategic, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_id, id);
        assert_eq!(entries[0].payload, "prefer additive migrations");
        assert!((entries[0].importance_score - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_query_empty_layer_is_not_an_error() {
        let store = test_store();
        let entries = store.query("s1", Layer::Predictions, 10).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_query_most_recent_first() {
        let store = test_store();
        store.write("s1", Layer::Conversation, "first", 0.5).unwrap();
        store.write("s1", Layer::Conversation, "second", 0.5).unwrap();
        store.write("s1", Layer::Conversation, "third", 0.5).unwrap();

        let entries = store.query("s1", Layer::Conversation, 2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload, "third");
        assert_eq!(entries[1].payload, "second");
    }

    #[test]
    fn test_query_filtered_applies_before_limit() {
        let store = test_store();
        for i in 0..6 {
            let payload = if i % 2 == 0 {
                format!("match {i}")
            } else {
                format!("skip {i}")
            };
            store.write("s1", Layer::Live, &payload, 0.5).unwrap();
        }

        let entries = store
            .query_filtered("s1", Layer::Live, 3, |e| e.payload.starts_with("match"))
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.payload.starts_with("match")));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = test_store();
        store.write("s1", Layer::Live, "mine", 0.5).unwrap();
        store.write("s2", Layer::Live, "theirs", 0.5).unwrap();

        let entries = store.query("s1", Layer::Live, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, "mine");
    }

    #[test]
    fn test_importance_clamped_on_write() {
        let store = test_store();
        store.write("s1", Layer::Live, "hot", 7.5).unwrap();
        store.write("s1", Layer::Live, "cold", -2.0).unwrap();

        let entries = store.query("s1", Layer::Live, 10).unwrap();
        let hot = entries.iter().find(|e| e.payload == "hot").unwrap();
        let cold = entries.iter().find(|e| e.payload == "cold").unwrap();
        assert!((hot.importance_score - 1.0).abs() < f64::EPSILON);
        assert!(cold.importance_score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_write_rejects_bad_input() {
        let store = test_store();
        assert!(matches!(
            store.write("", Layer::Live, "x", 0.5),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.write("a/b", Layer::Live, "x", 0.5),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.write("s1", Layer::Live, "   ", 0.5),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.write("s1", Layer::Live, "x", f64::NAN),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_eviction_keeps_layer_at_bound() {
        let policy = RetentionPolicy::new()
            .with_layer_bounds(Layer::Conversation, LayerBounds::entries_only(3));
        let store = LayeredStore::new(Arc::new(MemoryBackend::new()), policy);

        store.write("s1", Layer::Conversation, "a", 0.9).unwrap();
        store.write("s1", Layer::Conversation, "b", 0.2).unwrap();
        store.write("s1", Layer::Conversation, "c", 0.7).unwrap();
        store.write("s1", Layer::Conversation, "d", 0.8).unwrap();

        let entries = store.query("s1", Layer::Conversation, 10).unwrap();
        assert_eq!(entries.len(), 3);
        // The lowest-importance entry is the one evicted.
        assert!(entries.iter().all(|e| e.payload != "b"));
    }

    #[test]
    fn test_aggregate_context_respects_budget_and_priority() {
        let store = test_store();
        store.write("s1", Layer::Strategic, "vital fact", 0.95).unwrap();
        store.write("s1", Layer::Conversation, "idle chatter", 0.05).unwrap();

        let blob = store
            .aggregate_context("s1", &[Layer::Conversation, Layer::Strategic], 25)
            .unwrap();
        // Only the high-importance strategic line fits the budget.
        assert_eq!(blob, "[strategic] vital fact");
    }

    #[test]
    fn test_aggregate_context_deduplicates_layer_list() {
        let store = test_store();
        store.write("s1", Layer::Live, "signal", 0.5).unwrap();

        let blob = store
            .aggregate_context("s1", &[Layer::Live, Layer::Live], 100)
            .unwrap();
        assert_eq!(blob, "[live] signal");
    }

    #[test]
    fn test_layer_counts() {
        let store = test_store();
        store.write("s1", Layer::Live, "x", 0.5).unwrap();
        store.write("s1", Layer::Live, "y", 0.5).unwrap();
        store.write("s1", Layer::Strategic, "z", 0.5).unwrap();

        let counts = store.layer_counts("s1").unwrap();
        let live = counts.iter().find(|(l, _)| *l == Layer::Live).unwrap();
        let strategic = counts.iter().find(|(l, _)| *l == Layer::Strategic).unwrap();
        let outcomes = counts.iter().find(|(l, _)| *l == Layer::Outcomes).unwrap();
        assert_eq!(live.1, 2);
        assert_eq!(strategic.1, 1);
        assert_eq!(outcomes.1, 0);
    }
}
