//! The named methodology library.
//!
//! Patterns are data: an id, a set of lexical trigger terms, and a base
//! weight. Configuration may override or extend the built-in set; the
//! compiled library is read-only after startup.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One methodology as configuration data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Stable pattern identifier, e.g. `five-whys`.
    pub id: String,
    /// Lexical trigger terms; multi-word terms match across any
    /// whitespace run.
    pub triggers: Vec<String>,
    /// Base weight multiplied by the matched trigger fraction.
    pub weight: f64,
}

/// A pattern with its triggers compiled to word-boundary regexes.
#[derive(Debug)]
pub(crate) struct CompiledPattern {
    pub(crate) id: String,
    pub(crate) weight: f64,
    /// `(term, matcher)` pairs; the term is reported back verbatim.
    pub(crate) triggers: Vec<(String, Regex)>,
}

/// The compiled, read-only pattern library.
#[derive(Debug)]
pub struct PatternLibrary {
    patterns: Vec<CompiledPattern>,
}

impl PatternLibrary {
    /// Compiles the built-in methodology set.
    #[must_use]
    #[allow(clippy::expect_used)] // built-in triggers are static and known-good
    pub fn builtin() -> Self {
        Self::from_specs(&builtin_specs()).expect("static pattern library compiles")
    }

    /// Compiles a library from specs, later duplicates replacing earlier.
    ///
    /// This is how configuration overrides built-ins: pass the built-in
    /// specs followed by the configured ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a pattern with no id, an empty or
    /// blank trigger term, or a non-positive weight.
    pub fn from_specs(specs: &[PatternSpec]) -> Result<Self> {
        let mut patterns: Vec<CompiledPattern> = Vec::with_capacity(specs.len());
        for spec in specs {
            let compiled = compile_pattern(spec)?;
            if let Some(existing) = patterns.iter_mut().find(|p| p.id == compiled.id) {
                *existing = compiled;
            } else {
                patterns.push(compiled);
            }
        }
        Ok(Self { patterns })
    }

    /// Built-ins merged with configured overrides and additions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a configured pattern is invalid.
    pub fn with_overrides(overrides: &[PatternSpec]) -> Result<Self> {
        let mut specs = builtin_specs();
        specs.extend_from_slice(overrides);
        Self::from_specs(&specs)
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when the library holds no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Lists the pattern ids, in library order.
    #[must_use]
    pub fn pattern_ids(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.id.as_str()).collect()
    }

    pub(crate) fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

fn compile_pattern(spec: &PatternSpec) -> Result<CompiledPattern> {
    if spec.id.trim().is_empty() {
        return Err(Error::Config("pattern id must not be empty".to_string()));
    }
    if spec.triggers.is_empty() {
        return Err(Error::Config(format!(
            "pattern '{}' must declare at least one trigger",
            spec.id
        )));
    }
    if spec.weight <= 0.0 || !spec.weight.is_finite() {
        return Err(Error::Config(format!(
            "pattern '{}' weight must be a positive number",
            spec.id
        )));
    }

    let mut triggers = Vec::with_capacity(spec.triggers.len());
    for term in &spec.triggers {
        if term.trim().is_empty() {
            return Err(Error::Config(format!(
                "pattern '{}' has a blank trigger term",
                spec.id
            )));
        }
        triggers.push((term.clone(), trigger_regex(term)?));
    }

    Ok(CompiledPattern {
        id: spec.id.clone(),
        weight: spec.weight,
        triggers,
    })
}

/// Compiles one trigger term into a case-insensitive word-boundary
/// matcher.
///
/// The term is escaped whole, so triggers are literal text, never regex;
/// whitespace between words matches any whitespace run. Word boundaries
/// keep `ui` from matching inside `guide`.
fn trigger_regex(term: &str) -> Result<Regex> {
    let body = term
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    Regex::new(&format!(r"(?i)\b{body}\b")).map_err(|e| {
        Error::Config(format!("trigger term '{term}' failed to compile: {e}"))
    })
}

/// The built-in methodology specs.
#[must_use]
pub fn builtin_specs() -> Vec<PatternSpec> {
    fn spec(id: &str, triggers: &[&str], weight: f64) -> PatternSpec {
        PatternSpec {
            id: id.to_string(),
            triggers: triggers.iter().map(|t| (*t).to_string()).collect(),
            weight,
        }
    }

    vec![
        spec(
            "first-principles",
            &["first principles", "fundamental assumptions"],
            1.0,
        ),
        spec("five-whys", &["five whys", "5 whys"], 1.0),
        spec("swot", &["swot", "strengths and weaknesses"], 1.0),
        spec(
            "systems-thinking",
            &["systems thinking", "feedback loops"],
            1.0,
        ),
        spec("pareto", &["pareto", "80/20"], 1.0),
        spec("mece", &["mece", "mutually exclusive"], 1.0),
        spec("premortem", &["premortem", "pre-mortem"], 1.0),
        spec("ooda-loop", &["ooda", "observe orient decide act"], 1.0),
        spec("socratic", &["socratic"], 0.9),
        spec(
            "devils-advocate",
            &["devil's advocate", "devils advocate"],
            1.0,
        ),
    ]
}
