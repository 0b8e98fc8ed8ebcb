//! Evidence route for a question: documents, the structured store, or both.

use serde::{Deserialize, Serialize};

/// The chosen evidence strategy for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Answer from reference documents only; no structured query runs.
    Document,
    /// Answer from the structured store only; no retrieval runs.
    Structured,
    /// Retrieve documents *and* run a structured query.
    Hybrid,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Document => "document",
            Self::Structured => "structured",
            Self::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

impl Route {
    /// Strict parse of the routing vocabulary. Anything else is
    /// out-of-vocabulary and the caller must fall back.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "document" => Some(Self::Document),
            "structured" => Some(Self::Structured),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    /// Whether this route retrieves document snippets.
    pub fn uses_documents(&self) -> bool {
        matches!(self, Self::Document | Self::Hybrid)
    }

    /// Whether this route executes a structured query.
    pub fn uses_store(&self) -> bool {
        matches!(self, Self::Structured | Self::Hybrid)
    }
}
