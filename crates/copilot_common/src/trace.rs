//! Append-only run trace.
//!
//! The trace is owned solely by its run and appended to through a single
//! method; it is never shared or aliased across runs. One entry is pushed
//! per stage visit, so the trace length always equals the number of stages
//! the run executed.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One stage transition record.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub stage: String,
    pub summary: String,
    pub at: DateTime<Utc>,
}

/// Ordered log of stage visits for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry. This is the only way the trace grows.
    pub fn push(&mut self, stage: &str, summary: impl Into<String>) {
        self.entries.push(TraceEntry {
            stage: stage.to_string(),
            summary: summary.into(),
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stage names in visit order, for assertions and debugging.
    pub fn stages(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.stage.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let mut trace = Trace::new();
        trace.push("route", "route=hybrid");
        trace.push("retrieve", "3 snippets");
        trace.push("plan", "2 constraints");

        assert_eq!(trace.len(), 3);
        assert_eq!(trace.stages(), vec!["route", "retrieve", "plan"]);
        assert_eq!(trace.entries()[1].summary, "3 snippets");
    }

    #[test]
    fn test_empty_trace() {
        let trace = Trace::new();
        assert!(trace.is_empty());
        assert_eq!(trace.len(), 0);
    }
}
