//! Run orchestration.
//!
//! A run walks a fixed stage graph: route, retrieve (document and hybrid
//! routes), plan, draft, execute, a bounded repair loop, then synthesis.
//! Every stage appends to the trace, so a finished run carries a full
//! account of how its answer was produced.
//!
//! The engine owns its strategies behind trait objects; swapping the LLM
//! policies for the deterministic ones changes construction, not the graph.

use crate::drafter::DraftPolicy;
use crate::planner::{self, Constraints};
use crate::retrieval::EvidenceIndex;
use crate::router::RoutePolicy;
use crate::store::SqlStore;
use crate::synthesize;
use crate::config::RetrievalConfig;
use anyhow::Result;
use copilot_common::{AnswerValue, FormatHint, QueryResult, Route, Snippet, Trace};
use tracing::{debug, info};

/// Repairs allowed per run. After the second failed repair the run
/// synthesizes from whatever it has.
pub const MAX_REPAIRS: u32 = 2;

/// Stages of the run graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Route,
    Retrieve,
    Plan,
    DraftQuery,
    ExecuteQuery,
    Repair,
    Synthesize,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Route => "route",
            Stage::Retrieve => "retrieve",
            Stage::Plan => "plan",
            Stage::DraftQuery => "draft_query",
            Stage::ExecuteQuery => "execute_query",
            Stage::Repair => "repair",
            Stage::Synthesize => "synthesize",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Mutable state threaded through one run.
pub struct RunState {
    pub question: String,
    pub format_hint: FormatHint,
    pub route: Route,
    pub snippets: Vec<Snippet>,
    pub constraints: Constraints,
    pub query: Option<String>,
    pub result: Option<QueryResult>,
    pub repair_count: u32,
    pub trace: Trace,
}

impl RunState {
    fn new(question: &str, format_hint: FormatHint) -> Self {
        Self {
            question: question.to_string(),
            format_hint,
            route: Route::Structured,
            snippets: Vec::new(),
            constraints: Constraints::default(),
            query: None,
            result: None,
            repair_count: 0,
            trace: Trace::default(),
        }
    }
}

/// Everything a caller gets back from a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub answer: AnswerValue,
    pub query: Option<String>,
    pub confidence: f64,
    pub explanation: String,
    pub citations: Vec<String>,
    pub route: Route,
    pub repair_count: u32,
    pub trace: Trace,
}

pub struct Engine {
    router: Box<dyn RoutePolicy>,
    drafter: Box<dyn DraftPolicy>,
    index: EvidenceIndex,
    store: SqlStore,
    retrieval: RetrievalConfig,
}

impl Engine {
    pub fn new(
        router: Box<dyn RoutePolicy>,
        drafter: Box<dyn DraftPolicy>,
        index: EvidenceIndex,
        store: SqlStore,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            router,
            drafter,
            index,
            store,
            retrieval,
        }
    }

    /// Answer one question. The stage graph always terminates: the only
    /// cycle is draft/execute/repair, and repairs are capped.
    pub async fn run(&self, question: &str, format_hint: &str) -> Result<RunOutcome> {
        let hint = FormatHint::parse(format_hint);
        let mut state = RunState::new(question, hint);
        let mut stage = Stage::Route;

        info!("Run started: {:?}", question);
        while stage != Stage::Done {
            stage = self.step(stage, &mut state).await?;
        }

        let tables = self.store.table_names()?;
        let synthesis = synthesize::synthesize(&state, &tables);
        state
            .trace
            .push("synthesize", &format!("confidence={}", synthesis.confidence));

        Ok(RunOutcome {
            answer: synthesis.answer,
            query: state.query,
            confidence: synthesis.confidence,
            explanation: synthesis.explanation,
            citations: synthesis.citations,
            route: state.route,
            repair_count: state.repair_count,
            trace: state.trace,
        })
    }

    async fn step(&self, stage: Stage, state: &mut RunState) -> Result<Stage> {
        debug!("Stage: {}", stage);
        let next = match stage {
            Stage::Route => {
                state.route = self.router.classify(&state.question).await;
                state.trace.push("route", &state.route.to_string());
                if state.route.uses_documents() {
                    Stage::Retrieve
                } else {
                    Stage::Plan
                }
            }

            Stage::Retrieve => {
                state.snippets = self.index.retrieve(
                    &state.question,
                    self.retrieval.top_k,
                    self.retrieval.min_score,
                );
                state
                    .trace
                    .push("retrieve", &format!("{} snippets", state.snippets.len()));
                if state.route == Route::Document {
                    Stage::Synthesize
                } else {
                    Stage::Plan
                }
            }

            Stage::Plan => {
                state.constraints = planner::derive_constraints(&state.question, &state.snippets);
                state.trace.push("plan", &state.constraints.to_json());
                Stage::DraftQuery
            }

            Stage::DraftQuery => {
                let failure = state.result.as_ref().and_then(|r| r.error.as_deref());
                let schema = self.store.schema()?;
                let drafted = self
                    .drafter
                    .draft(&state.question, &state.constraints, schema, failure)
                    .await?;
                state
                    .trace
                    .push("draft_query", &format!("{} {}", drafted.origin, preview(&drafted.sql)));
                state.query = Some(drafted.sql);
                Stage::ExecuteQuery
            }

            Stage::ExecuteQuery => {
                // A drafted query always exists on this path.
                let sql = state.query.as_deref().unwrap_or_default();
                let result = self.store.execute(sql);
                state.trace.push(
                    "execute_query",
                    &format!("success={} rows={}", result.success, result.row_count),
                );
                let failed = !result.success;
                state.result = Some(result);
                if failed && state.repair_count < MAX_REPAIRS {
                    Stage::Repair
                } else {
                    Stage::Synthesize
                }
            }

            Stage::Repair => {
                state.repair_count += 1;
                state
                    .trace
                    .push("repair", &format!("attempt {}", state.repair_count));
                Stage::DraftQuery
            }

            Stage::Synthesize => Stage::Done,

            Stage::Done => Stage::Done,
        };
        Ok(next)
    }

    pub fn store(&self) -> &SqlStore {
        &self.store
    }

    pub fn index(&self) -> &EvidenceIndex {
        &self.index
    }
}

fn preview(sql: &str) -> String {
    let flat = sql.replace('\n', " ");
    if flat.chars().count() > 100 {
        format!("{}...", flat.chars().take(100).collect::<String>())
    } else {
        flat
    }
}
