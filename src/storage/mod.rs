//! Durable key/range storage.
//!
//! The memory layers and the audit log both sit on one narrow contract:
//! ordered string keys with `put`/`get`/`get_range`/`delete` semantics.
//! Range scans return keys in descending order, so keys that embed a
//! zero-padded timestamp come back most-recent-first without any
//! backend-specific ordering logic.

mod memory;
mod retry;
mod sqlite;

pub use memory::MemoryBackend;
pub use retry::{RETRY_BACKOFF_MS, with_retry};
pub use sqlite::SqliteBackend;

use crate::Result;

/// Trait for durable key/range storage backends.
///
/// Backends are shared across sessions and tasks, so every operation takes
/// `&self`; implementations provide their own interior locking.
pub trait StorageBackend: Send + Sync {
    /// Stores a value, replacing any existing value under the same key.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieves a single value by exact key.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns up to `limit` key/value pairs whose keys start with
    /// `prefix`, in descending key order.
    fn get_range(&self, prefix: &str, limit: usize) -> Result<Vec<(String, String)>>;

    /// Deletes a key, returning whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Counts keys under a prefix.
    fn count_prefix(&self, prefix: &str) -> Result<usize> {
        Ok(self.get_range(prefix, usize::MAX)?.len())
    }
}

/// Smallest string greater than every string starting with `prefix`.
///
/// Used as the exclusive upper bound of a prefix range scan. Returns `None`
/// when no such bound exists (empty prefix, or every char is already at the
/// maximum), in which case the scan runs to the end of the keyspace.
#[must_use]
pub fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        // Skips the surrogate gap and the end of the char range.
        if let Some(next) = char::from_u32(last as u32 + 1) {
            let mut bound: String = chars.iter().collect();
            bound.push(next);
            return Some(bound);
        }
    }
    None
}
