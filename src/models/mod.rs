//! Data models for stratacog.
//!
//! This module contains all the core data structures used throughout the system.

mod assessment;
mod audit;
mod capability;
mod entry;
mod layer;
mod pattern;
mod response;

pub use assessment::{ComplexityAssessment, ComplexityTier};
pub use audit::{AuditRecord, REQUEST_SUMMARY_MAX_CHARS};
pub use capability::{CallOutcome, CapabilityCall, CapabilityDescriptor};
pub use entry::{EntryId, MemoryEntry};
pub use layer::Layer;
pub use pattern::PatternMatch;
pub use response::ResponseContext;
