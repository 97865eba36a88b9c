//! Per-layer retention bounds and eviction planning.
//!
//! Every layer carries its own `(max_entries, max_age)` bound. Planning is
//! a pure function over a layer's current entries so the policy is
//! unit-testable without storage; the store applies the resulting plan
//! synchronously inside every write.
//!
//! # Configuration
//!
//! Bounds can be configured via:
//! - Config file: `[layers.conversation] max_entries = 50`
//! - Environment: `STRATACOG_LAYER_CONVERSATION_MAX_ENTRIES=50`

use std::collections::HashMap;

use crate::models::{EntryId, Layer, MemoryEntry};

/// Retention bounds for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerBounds {
    /// Maximum live entries before overflow eviction.
    pub max_entries: usize,
    /// Maximum entry age in milliseconds; `None` means no age bound.
    pub max_age_ms: Option<u64>,
}

impl LayerBounds {
    /// Creates bounds with a count cap and no age bound.
    #[must_use]
    pub const fn entries_only(max_entries: usize) -> Self {
        Self {
            max_entries,
            max_age_ms: None,
        }
    }

    /// Creates bounds with both a count cap and an age bound.
    #[must_use]
    pub const fn with_age(max_entries: usize, max_age_ms: u64) -> Self {
        Self {
            max_entries,
            max_age_ms: Some(max_age_ms),
        }
    }
}

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Default bounds per layer.
///
/// Conversation and live signals churn fast and stay small; strategic and
/// organizational facts are durable and age-unbounded.
#[must_use]
pub const fn default_bounds(layer: Layer) -> LayerBounds {
    match layer {
        Layer::Conversation => LayerBounds::with_age(50, DAY_MS),
        Layer::Strategic => LayerBounds::entries_only(200),
        Layer::Entities => LayerBounds::with_age(150, 30 * DAY_MS),
        Layer::Outcomes => LayerBounds::with_age(100, 90 * DAY_MS),
        Layer::Organizational => LayerBounds::entries_only(100),
        Layer::Coordination => LayerBounds::with_age(75, 7 * DAY_MS),
        Layer::Live => LayerBounds::with_age(25, HOUR_MS),
        Layer::Predictions => LayerBounds::with_age(50, 14 * DAY_MS),
    }
}

/// Retention policy across all layers.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    layer_bounds: HashMap<Layer, LayerBounds>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        let mut layer_bounds = HashMap::new();
        for layer in Layer::all().iter().copied() {
            layer_bounds.insert(layer, default_bounds(layer));
        }
        Self { layer_bounds }
    }
}

impl RetentionPolicy {
    /// Creates a policy with the default per-layer bounds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the bounds for one layer.
    #[must_use]
    pub fn with_layer_bounds(mut self, layer: Layer, bounds: LayerBounds) -> Self {
        self.layer_bounds.insert(layer, bounds);
        self
    }

    /// Returns the effective bounds for a layer.
    #[must_use]
    pub fn bounds_for(&self, layer: Layer) -> LayerBounds {
        self.layer_bounds
            .get(&layer)
            .copied()
            .unwrap_or_else(|| default_bounds(layer))
    }

    /// Returns the expiry cutoff for a layer, if it has an age bound.
    ///
    /// Entries created before the cutoff are expired.
    #[must_use]
    pub fn cutoff_timestamp(&self, layer: Layer, now_ms: u64) -> Option<u64> {
        self.bounds_for(layer)
            .max_age_ms
            .map(|age| now_ms.saturating_sub(age))
    }

    /// Plans eviction for one layer's current entries.
    ///
    /// Expired entries go first; if the survivors still exceed
    /// `max_entries`, the overflow is filled lowest-importance-first, ties
    /// oldest-first. The plan never splits an entry; the store deletes each
    /// planned entry whole or leaves it whole.
    #[must_use]
    pub fn plan(&self, layer: Layer, entries: &[MemoryEntry], now_ms: u64) -> EvictionPlan {
        let bounds = self.bounds_for(layer);
        let cutoff = self.cutoff_timestamp(layer, now_ms);

        let mut expired = Vec::new();
        let mut survivors: Vec<&MemoryEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            match cutoff {
                Some(cut) if entry.created_at < cut => expired.push(entry.entry_id.clone()),
                _ => survivors.push(entry),
            }
        }

        let mut overflow = Vec::new();
        if survivors.len() > bounds.max_entries {
            let excess = survivors.len() - bounds.max_entries;
            survivors.sort_by(|a, b| {
                a.importance_score
                    .total_cmp(&b.importance_score)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.entry_id.as_str().cmp(b.entry_id.as_str()))
            });
            overflow = survivors
                .iter()
                .take(excess)
                .map(|e| e.entry_id.clone())
                .collect();
        }

        EvictionPlan { expired, overflow }
    }
}

/// The entries one retention pass removes.
#[derive(Debug, Clone, Default)]
pub struct EvictionPlan {
    /// Entries past their layer's age bound.
    pub expired: Vec<EntryId>,
    /// Entries evicted to bring the layer back under its count cap.
    pub overflow: Vec<EntryId>,
}

impl EvictionPlan {
    /// True when nothing needs evicting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.overflow.is_empty()
    }

    /// Total entries the plan removes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.expired.len() + self.overflow.len()
    }

    /// Iterates over every entry id the plan removes.
    pub fn evict_ids(&self) -> impl Iterator<Item = &EntryId> {
        self.expired.iter().chain(self.overflow.iter())
    }
}
