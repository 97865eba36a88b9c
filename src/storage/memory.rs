//! In-memory storage backend.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use super::{StorageBackend, prefix_upper_bound};
use crate::Result;

/// In-memory key/range backend over a `BTreeMap`.
///
/// Useful for tests and ephemeral runs; shares the ordering semantics of
/// the durable backend so the two are interchangeable behind
/// [`StorageBackend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl StorageBackend for MemoryBackend {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read().get(key).cloned())
    }

    fn get_range(&self, prefix: &str, limit: usize) -> Result<Vec<(String, String)>> {
        let map = self.read();
        let lower = Bound::Included(prefix.to_string());
        let upper = match prefix_upper_bound(prefix) {
            Some(bound) => Bound::Excluded(bound),
            None => Bound::Unbounded,
        };
        Ok(map
            .range((lower, upper))
            .rev()
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.write().remove(key).is_some())
    }

    fn count_prefix(&self, prefix: &str) -> Result<usize> {
        let map = self.read();
        let lower = Bound::Included(prefix.to_string());
        let upper = match prefix_upper_bound(prefix) {
            Some(bound) => Bound::Excluded(bound),
            None => Bound::Unbounded,
        };
        Ok(map.range((lower, upper)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_round_trip() {
        let backend = MemoryBackend::new();
        backend.put("memory/s1/live/0001-a", "one").unwrap();
        assert_eq!(
            backend.get("memory/s1/live/0001-a").unwrap(),
            Some("one".to_string())
        );
        assert_eq!(backend.get("memory/s1/live/0002-b").unwrap(), None);
    }

    #[test]
    fn test_put_replaces_existing() {
        let backend = MemoryBackend::new();
        backend.put("k", "first").unwrap();
        backend.put("k", "second").unwrap();
        assert_eq!(backend.get("k").unwrap(), Some("second".to_string()));
    }

    #[test]
    fn test_get_range_descending_and_bounded() {
        let backend = MemoryBackend::new();
        backend.put("memory/s1/live/0001", "a").unwrap();
        backend.put("memory/s1/live/0002", "b").unwrap();
        backend.put("memory/s1/live/0003", "c").unwrap();
        backend.put("memory/s2/live/0009", "other").unwrap();

        let rows = backend.get_range("memory/s1/", 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "memory/s1/live/0003");
        assert_eq!(rows[1].0, "memory/s1/live/0002");
    }

    #[test]
    fn test_get_range_excludes_sibling_prefixes() {
        let backend = MemoryBackend::new();
        backend.put("audit/s1/0001", "a").unwrap();
        backend.put("audit/s10/0001", "b").unwrap();

        let rows = backend.get_range("audit/s1/", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "a");
    }

    #[test]
    fn test_delete_reports_existence() {
        let backend = MemoryBackend::new();
        backend.put("k", "v").unwrap();
        assert!(backend.delete("k").unwrap());
        assert!(!backend.delete("k").unwrap());
    }

    #[test]
    fn test_count_prefix() {
        let backend = MemoryBackend::new();
        for i in 0..5 {
            backend.put(&format!("memory/s1/live/{i:04}"), "v").unwrap();
        }
        backend.put("memory/s2/live/0000", "v").unwrap();
        assert_eq!(backend.count_prefix("memory/s1/").unwrap(), 5);
        assert_eq!(backend.count_prefix("memory/").unwrap(), 6);
    }
}
