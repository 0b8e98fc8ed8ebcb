//! Structured query results.
//!
//! Execution failures are values, not errors: the orchestrator inspects the
//! `success` flag to decide between repair and synthesis, and a run must
//! always reach its terminal state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of executing a structured query against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub error: Option<String>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn ok(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self {
            success: true,
            columns,
            rows,
            error: None,
            row_count,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(reason.into()),
            row_count: 0,
        }
    }

    /// True when there is nothing to extract an answer from.
    pub fn is_empty(&self) -> bool {
        !self.success || self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_counts_rows() {
        let r = QueryResult::ok(
            vec!["n".to_string()],
            vec![vec![json!(1)], vec![json!(2)]],
        );
        assert!(r.success);
        assert_eq!(r.row_count, 2);
        assert!(!r.is_empty());
        assert!(r.error.is_none());
    }

    #[test]
    fn test_failure_is_empty() {
        let r = QueryResult::failure("no such table: Foo");
        assert!(!r.success);
        assert!(r.is_empty());
        assert_eq!(r.row_count, 0);
        assert_eq!(r.error.as_deref(), Some("no such table: Foo"));
    }

    #[test]
    fn test_ok_with_no_rows_is_empty() {
        let r = QueryResult::ok(vec!["n".to_string()], vec![]);
        assert!(r.success);
        assert!(r.is_empty());
    }
}
