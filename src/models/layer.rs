//! Memory layer registry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// The fixed set of session memory layers.
///
/// Each layer is an independently-managed partition of session memory with
/// its own retention bounds. Entries in every layer share the same envelope
/// type ([`super::MemoryEntry`]) and addressing scheme (session id plus
/// timestamp); only retention policy and intended content differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Recent conversation turns.
    #[default]
    Conversation,
    /// Durable strategic facts.
    Strategic,
    /// Relationship and entity intelligence.
    Entities,
    /// Learned-outcome patterns.
    Outcomes,
    /// Organizational facts.
    Organizational,
    /// Cross-entity coordination signals.
    Coordination,
    /// Live and streaming signals.
    Live,
    /// Statistically-derived pattern predictions.
    Predictions,
}

impl Layer {
    /// Returns all layer variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Conversation,
            Self::Strategic,
            Self::Entities,
            Self::Outcomes,
            Self::Organizational,
            Self::Coordination,
            Self::Live,
            Self::Predictions,
        ]
    }

    /// Returns the layer as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Strategic => "strategic",
            Self::Entities => "entities",
            Self::Outcomes => "outcomes",
            Self::Organizational => "organizational",
            Self::Coordination => "coordination",
            Self::Live => "live",
            Self::Predictions => "predictions",
        }
    }

    /// Parses a layer from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "conversation" => Some(Self::Conversation),
            "strategic" => Some(Self::Strategic),
            "entities" => Some(Self::Entities),
            "outcomes" => Some(Self::Outcomes),
            "organizational" => Some(Self::Organizational),
            "coordination" => Some(Self::Coordination),
            "live" => Some(Self::Live),
            "predictions" => Some(Self::Predictions),
            _ => None,
        }
    }

    /// Resolves a layer name, rejecting anything outside the registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLayer`] when `name` does not match a
    /// registered layer. Callers at string boundaries (CLI, config,
    /// stored keys) must go through this; typed callers use the enum
    /// directly.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::parse(name).ok_or_else(|| Error::UnknownLayer {
            name: name.to_string(),
        })
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
