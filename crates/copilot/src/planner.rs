//! Constraint planning.
//!
//! Turns a question plus retrieved evidence into a small set of named
//! constraints (campaign window, category, year, metric formula) that the
//! query drafter consumes. Entirely rule-based and deterministic.

use copilot_common::Snippet;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Known campaigns and their date windows. Matching is keyword-first (the
/// way people phrase questions), with the full campaign name as a fallback
/// against evidence text.
struct Campaign {
    name: &'static str,
    keywords: &'static [&'static str],
    start: &'static str,
    end: &'static str,
}

const CAMPAIGNS: &[Campaign] = &[
    Campaign {
        name: "Summer Beverages 1997",
        keywords: &["summer beverages 1997", "summer"],
        start: "1997-06-01",
        end: "1997-06-30",
    },
    Campaign {
        name: "Winter Classics 1997",
        keywords: &["winter classics 1997", "winter"],
        start: "1997-12-01",
        end: "1997-12-31",
    },
];

/// Category keywords mapped to catalogue names.
const CATEGORIES: &[(&str, &str)] = &[
    ("beverage", "Beverages"),
    ("condiment", "Condiments"),
    ("confection", "Confections"),
    ("dairy", "Dairy Products"),
    ("produce", "Produce"),
    ("seafood", "Seafood"),
];

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());

/// Named constraints derived for a question. Keys are stable strings
/// (`campaign`, `start_date`, `end_date`, `category`, `year`,
/// `metric_formula`) so they serialize predictably into prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    values: BTreeMap<String, String>,
}

impl Constraints {
    pub fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// JSON rendering for prompts and traces. BTreeMap keeps key order
    /// stable across runs.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.values).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Derive constraints from the question and any retrieved evidence.
pub fn derive_constraints(question: &str, snippets: &[Snippet]) -> Constraints {
    let q = question.to_lowercase();
    let mut constraints = Constraints::default();

    // Campaign window: keyword match on the question first.
    for campaign in CAMPAIGNS {
        if campaign.keywords.iter().any(|k| q.contains(k)) {
            constraints.insert("campaign", campaign.name);
            constraints.insert("start_date", campaign.start);
            constraints.insert("end_date", campaign.end);
            break;
        }
    }

    // Fallback: a campaign-shaped question whose window only appears in the
    // evidence text.
    if constraints.get("campaign").is_none() && (q.contains("campaign") || q.contains("during")) {
        'outer: for snippet in snippets {
            for campaign in CAMPAIGNS {
                if snippet.content.contains(campaign.name) {
                    constraints.insert("campaign", campaign.name);
                    constraints.insert("start_date", campaign.start);
                    constraints.insert("end_date", campaign.end);
                    break 'outer;
                }
            }
        }
    }

    for (keyword, name) in CATEGORIES {
        if q.contains(keyword) {
            constraints.insert("category", name);
            break;
        }
    }

    // A bare year only matters when no campaign window pinned the dates.
    if constraints.get("start_date").is_none() {
        if let Some(m) = YEAR_RE.captures(&q) {
            constraints.insert("year", m.get(1).map(|y| y.as_str()).unwrap_or_default());
        }
    }

    if q.contains("aov") || q.contains("average order value") {
        constraints.insert(
            "metric_formula",
            "SUM(od.UnitPrice * od.Quantity * (1 - od.Discount)) / COUNT(DISTINCT o.OrderID)",
        );
    } else if q.contains("margin") {
        constraints.insert(
            "metric_formula",
            "(od.UnitPrice - od.UnitPrice * 0.7) * od.Quantity * (1 - od.Discount)",
        );
    }

    constraints
}
