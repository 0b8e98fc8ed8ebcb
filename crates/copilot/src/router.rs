//! Route classification with a deterministic rule fallback.
//!
//! The routing policy is a strategy chosen at construction: `LlmRouter`
//! asks the generation service for a label and defers to the rules on any
//! failure or out-of-vocabulary answer; `RuleRouter` is the rules alone and
//! is a first-class, directly testable unit.

use crate::ollama::Generator;
use crate::prompts::build_route_prompt;
use async_trait::async_trait;
use copilot_common::Route;
use std::sync::Arc;
use tracing::{info, warn};

/// Routing strategy seam.
#[async_trait]
pub trait RoutePolicy: Send + Sync {
    /// Classify a question. Infallible: every policy must resolve to a
    /// route, falling back to the deterministic rules if it has to.
    async fn classify(&self, question: &str) -> Route;
}

/// Policy/definition language routes to documents.
const POLICY_TERMS: &[&str] = &[
    "according to",
    "policy",
    "definition",
    "defined as",
    "return window",
];

/// Campaign windows and derived metrics suggest evidence is needed to
/// parameterize a query.
const WINDOW_TERMS: &[&str] = &[
    "during",
    "summer",
    "winter",
    "campaign",
    "aov",
    "average order value",
    "margin",
];

/// Aggregation targets the structured store can compute.
const AGGREGATE_TERMS: &[&str] = &[
    "revenue",
    "quantity",
    "top",
    "highest",
    "total",
    "value",
    "customer",
];

/// Deterministic keyword router.
pub struct RuleRouter;

impl RuleRouter {
    /// The rules themselves, callable without a policy object.
    pub fn classify_rules(question: &str) -> Route {
        let q = question.to_lowercase();

        if POLICY_TERMS.iter().any(|t| q.contains(t)) {
            return Route::Document;
        }

        let has_window = WINDOW_TERMS.iter().any(|t| q.contains(t));
        let has_aggregate = AGGREGATE_TERMS.iter().any(|t| q.contains(t));
        if has_window && has_aggregate {
            return Route::Hybrid;
        }

        Route::Structured
    }
}

#[async_trait]
impl RoutePolicy for RuleRouter {
    async fn classify(&self, question: &str) -> Route {
        let route = Self::classify_rules(question);
        info!("Rule router: route={}", route);
        route
    }
}

/// Generation-service router with the rule router as its fallback.
pub struct LlmRouter {
    generator: Arc<dyn Generator>,
}

impl LlmRouter {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl RoutePolicy for LlmRouter {
    async fn classify(&self, question: &str) -> Route {
        let prompt = build_route_prompt(question);

        match self.generator.complete(&prompt).await {
            Ok(text) => {
                // Take the first token; models love to elaborate.
                let label = text
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .trim_matches(|c: char| !c.is_alphabetic());
                match Route::parse(label) {
                    Some(route) => {
                        info!("LLM router: route={}", route);
                        route
                    }
                    None => {
                        warn!("LLM router returned out-of-vocabulary '{}', using rules", text);
                        RuleRouter::classify_rules(question)
                    }
                }
            }
            Err(e) => {
                warn!("LLM router unavailable ({}), using rules", e);
                RuleRouter::classify_rules(question)
            }
        }
    }
}
