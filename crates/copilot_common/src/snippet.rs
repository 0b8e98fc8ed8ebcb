//! Retrieved reference-document snippets.

use serde::{Deserialize, Serialize};

/// A retrieval hit from the evidence index. Owned by the run state for the
/// run's duration and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    /// Stable chunk identifier, e.g. `product_policy::chunk2`.
    pub id: String,
    /// Chunk text content.
    pub content: String,
    /// Source document file name.
    pub source: String,
    /// Relevance score in [0, 1], higher is better.
    pub score: f64,
}

impl Snippet {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source: source.into(),
            score,
        }
    }
}
