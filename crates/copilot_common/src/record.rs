//! Batch wire records, one JSON object per line.

use crate::answer::AnswerValue;
use serde::{Deserialize, Serialize};

fn default_format_hint() -> String {
    "generic".to_string()
}

/// One input question record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInput {
    pub id: String,
    pub question: String,
    #[serde(default = "default_format_hint")]
    pub format_hint: String,
}

/// One output answer record, order-preserving with respect to the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub id: String,
    pub final_answer: AnswerValue,
    pub query: String,
    pub confidence: f64,
    pub explanation: String,
    pub citations: Vec<String>,
}

impl BatchOutput {
    /// Record emitted when processing a question failed outright: null
    /// answer, zero confidence, the error text as explanation.
    pub fn errored(id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            id: id.into(),
            final_answer: AnswerValue::Null,
            query: String::new(),
            confidence: 0.0,
            explanation: format!("Error: {}", error),
            citations: Vec::new(),
        }
    }
}
