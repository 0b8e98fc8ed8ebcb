//! Prompt building for the generation service.
//!
//! Everything returned by the service is untrusted text; the prompts ask
//! for machine-parseable output, but callers must still clean and validate
//! whatever comes back.

use crate::planner::Constraints;

/// Routing vocabulary the classifier must answer with.
pub const ROUTE_LABELS: &str = "document, structured, hybrid";

/// Build the route-classification prompt.
pub fn build_route_prompt(question: &str) -> String {
    format!(
        "Classify how to answer this retail analytics question.\n\
         Answer with exactly one word out of: {labels}.\n\
         - document: answerable from policy/reference documents alone\n\
         - structured: answerable from the sales database alone\n\
         - hybrid: needs both (e.g. campaign dates from documents, numbers from the database)\n\n\
         Question: {question}\n\
         Label:",
        labels = ROUTE_LABELS,
        question = question
    )
}

/// Build the query-drafting prompt. `failure` carries the error text of the
/// previous attempt during a repair pass.
pub fn build_draft_prompt(
    question: &str,
    schema: &str,
    constraints: &Constraints,
    failure: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Write one SQLite SELECT query answering the question below.\n\
         Rules: SELECT only, no semicolon, no explanation, no code fences.\n\n\
         Schema:\n{schema}\n\n\
         Constraints (use these literal values when filtering):\n{constraints}\n\n\
         Question: {question}\n",
        schema = schema,
        constraints = constraints.to_json(),
        question = question
    );

    if let Some(err) = failure {
        prompt.push_str(&format!(
            "\nThe previous query failed with:\n{}\nFix the problem and try again.\n",
            err
        ));
    }

    prompt.push_str("\nSQL:");
    prompt
}
