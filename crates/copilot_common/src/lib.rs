//! Shared domain types for the retail copilot.
//!
//! Everything here is plain data: routes, format hints, typed answers,
//! retrieval snippets, query results, the run trace, and the batch wire
//! records. The engine crate owns all behavior.

pub mod answer;
pub mod error;
pub mod query;
pub mod record;
pub mod route;
pub mod snippet;
pub mod trace;

pub use answer::{AnswerValue, FormatHint};
pub use error::CopilotError;
pub use query::QueryResult;
pub use record::{BatchInput, BatchOutput};
pub use route::Route;
pub use snippet::Snippet;
pub use trace::{Trace, TraceEntry};
