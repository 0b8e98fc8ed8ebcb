//! Typed answers and the format-hint vocabulary.
//!
//! The format hint declares the expected shape of the final answer and
//! dictates how raw rows or document text are coerced. The hint grammar is
//! small: `int`, `float`, a named object shape (`{category, quantity}` or
//! `category+quantity`), a named list shape (`list[{product, revenue}]` or
//! `list of product+revenue`), or anything else, which is treated as
//! unconstrained.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected shape of the final answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatHint {
    Int,
    Float,
    /// Named object shape with ordered field names.
    Object(Vec<String>),
    /// Named list shape; each element is an object with these field names.
    List(Vec<String>),
    /// No shape constraint.
    Generic,
}

impl FormatHint {
    /// Parse the hint vocabulary. Unknown hints degrade to `Generic`
    /// rather than failing the run.
    pub fn parse(hint: &str) -> Self {
        let lower = hint.trim().to_lowercase();
        match lower.as_str() {
            "int" => Self::Int,
            "float" => Self::Float,
            _ => {
                if let Some(rest) = lower.strip_prefix("list") {
                    Self::List(shape_fields(rest))
                } else if lower.contains('{') || lower.contains('+') {
                    Self::Object(shape_fields(&lower))
                } else {
                    Self::Generic
                }
            }
        }
    }

    /// The type-appropriate default used when no evidence produced an
    /// answer: `0`, `0.0`, `{}`, `[]`, or `null`.
    pub fn zero(&self) -> AnswerValue {
        match self {
            Self::Int => AnswerValue::Int(0),
            Self::Float => AnswerValue::Float(0.0),
            Self::Object(_) => AnswerValue::Object(BTreeMap::new()),
            Self::List(_) => AnswerValue::List(Vec::new()),
            Self::Generic => AnswerValue::Null,
        }
    }
}

/// Extract field names from a shape hint fragment, e.g. `[{product,
/// revenue}]`, `{category, quantity}`, or `of product+revenue`.
fn shape_fields(fragment: &str) -> Vec<String> {
    let inner = match (fragment.find('{'), fragment.rfind('}')) {
        (Some(a), Some(b)) if a < b => &fragment[a + 1..b],
        _ => {
            let rest = fragment.trim();
            rest.strip_prefix("of ").unwrap_or(rest)
        }
    };

    inner
        .split([',', '+'])
        .map(|f| {
            f.trim()
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
                .to_string()
        })
        .filter(|f| !f.is_empty())
        .collect()
}

/// A final answer value. Serializes untagged, so `Int(3)` is `3` on the
/// wire and `Null` is `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<AnswerValue>),
    Object(BTreeMap<String, AnswerValue>),
}

impl AnswerValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Float answers are reported with 2-decimal precision.
    pub fn rounded(x: f64) -> f64 {
        (x * 100.0).round() / 100.0
    }
}
