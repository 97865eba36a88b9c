//! Methodology pattern detection.
//!
//! A static library of named methodologies, each with lexical triggers
//! and a base weight, plus the detector that scans produced responses and
//! attributes confidence-scored matches.

pub mod detector;
pub mod library;

pub use detector::{DetectorConfig, PatternDetector};
pub use library::{PatternLibrary, PatternSpec, builtin_specs};
