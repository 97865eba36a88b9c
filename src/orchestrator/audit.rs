//! Append-only audit trail.
//!
//! Every handled request produces one [`AuditRecord`] holding the
//! classifier verdict, every capability call issued, pattern attributions,
//! and the list of steps that degraded. Records are keyed monotonically per
//! session so a descending scan yields the most recent first.

use crate::memory::validate_session_id;
use crate::models::AuditRecord;
use crate::storage::{StorageBackend, with_retry};
use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Key prefix for one session's audit records.
fn audit_prefix(session_id: &str) -> String {
    format!("audit/{session_id}/")
}

/// Storage key for a single audit record.
///
/// Zero-padded timestamp plus a process-local sequence keep keys
/// monotonically ordered; the uuid suffix keeps writers from distinct
/// processes from colliding.
fn audit_key(session_id: &str, timestamp: u64, seq: u64) -> String {
    format!(
        "audit/{session_id}/{timestamp:020}-{seq:010}-{}",
        uuid::Uuid::now_v7()
    )
}

/// Append-only audit trail persisted through the storage backend.
pub struct AuditLog<B: StorageBackend> {
    backend: Arc<B>,
    write_seq: AtomicU64,
}

impl<B: StorageBackend> AuditLog<B> {
    /// Creates a new audit log over the given backend.
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            write_seq: AtomicU64::new(0),
        }
    }

    /// Appends a record to the session's audit trail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid session id and
    /// [`Error::StorageUnavailable`] when the backend stays down after the
    /// bounded retry.
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        validate_session_id(&record.session_id)?;

        let seq = self.write_seq.fetch_add(1, Ordering::SeqCst);
        let key = audit_key(&record.session_id, record.timestamp, seq);
        let value = serde_json::to_string(record).map_err(|e| Error::OperationFailed {
            operation: "serialize_audit_record".to_string(),
            cause: e.to_string(),
        })?;

        with_retry("audit_append", || self.backend.put(&key, &value))?;
        metrics::counter!("stratacog_audit_appends_total").increment(1);
        Ok(())
    }

    /// Returns up to `limit` records for a session, most recent first.
    ///
    /// Corrupt records are skipped, not fatal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid session id and
    /// [`Error::StorageUnavailable`] when the backend stays down after the
    /// bounded retry.
    pub fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<AuditRecord>> {
        validate_session_id(session_id)?;

        let prefix = audit_prefix(session_id);
        let rows = with_retry("audit_scan", || self.backend.get_range(&prefix, limit))?;

        let mut records = Vec::with_capacity(rows.len());
        for (key, value) in &rows {
            match serde_json::from_str::<AuditRecord>(value) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "Skipping corrupt audit record");
                    metrics::counter!("stratacog_audit_corrupt_records_total").increment(1);
                },
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComplexityAssessment, ComplexityTier};
    use crate::storage::MemoryBackend;

    fn record(session_id: &str, timestamp: u64, summary: &str) -> AuditRecord {
        AuditRecord {
            session_id: session_id.to_string(),
            request_summary: summary.to_string(),
            complexity: ComplexityAssessment {
                tier: ComplexityTier::Simple,
                confidence: 0.2,
                matched_signals: vec![],
                recommended_capability: None,
            },
            capability_calls: vec![],
            pattern_matches: vec![],
            degraded: vec![],
            timestamp,
        }
    }

    fn audit_log() -> AuditLog<MemoryBackend> {
        AuditLog::new(Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn test_append_and_recent_round_trip() {
        let log = audit_log();
        log.append(&record("sess-1", 1_000, "first request"))
            .expect("append");

        let records = log.recent("sess-1", 10).expect("recent");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request_summary, "first request");
    }

    #[test]
    fn test_recent_most_recent_first() {
        let log = audit_log();
        log.append(&record("sess-1", 1_000, "older")).expect("append");
        log.append(&record("sess-1", 2_000, "newer")).expect("append");

        let records = log.recent("sess-1", 10).expect("recent");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].request_summary, "newer");
        assert_eq!(records[1].request_summary, "older");
    }

    #[test]
    fn test_recent_respects_limit() {
        let log = audit_log();
        for i in 0..5 {
            log.append(&record("sess-1", 1_000 + i, "request"))
                .expect("append");
        }

        let records = log.recent("sess-1", 2).expect("recent");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_recent_isolates_sessions() {
        let log = audit_log();
        log.append(&record("sess-1", 1_000, "one")).expect("append");
        log.append(&record("sess-10", 1_000, "ten")).expect("append");

        let records = log.recent("sess-1", 10).expect("recent");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, "sess-1");
    }

    #[test]
    fn test_recent_skips_corrupt_records() {
        let backend = Arc::new(MemoryBackend::new());
        let log = AuditLog::new(Arc::clone(&backend));
        log.append(&record("sess-1", 1_000, "good")).expect("append");
        backend
            .put("audit/sess-1/00000000000000000999-0000000000-junk", "{not json")
            .expect("put");

        let records = log.recent("sess-1", 10).expect("recent");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request_summary, "good");
    }

    #[test]
    fn test_append_rejects_invalid_session() {
        let log = audit_log();
        let result = log.append(&record("bad/session", 1_000, "nope"));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_recent_empty_session_is_empty() {
        let log = audit_log();
        let records = log.recent("sess-1", 10).expect("recent");
        assert!(records.is_empty());
    }
}
