//! Read-only SQLite store access.
//!
//! Opens the retail database with read-only flags and exposes schema
//! introspection, query validation, and execution. Validation is
//! belt-and-braces on top of the read-only connection: drafted SQL comes
//! from templates or a language model, and rejecting non-SELECT text early
//! gives the repair loop a clean error to work with.

use anyhow::{Context, Result};
use copilot_common::{CopilotError, QueryResult};
use once_cell::sync::OnceCell;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

const DANGEROUS_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE",
];

/// Read-only handle on the retail SQLite database.
#[derive(Debug)]
pub struct SqlStore {
    conn: Connection,
    schema_cache: OnceCell<String>,
}

impl SqlStore {
    /// Open the database read-only. Fails up front when the file is absent
    /// rather than letting SQLite create an empty one.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.is_file() {
            return Err(CopilotError::DbMissing(db_path.display().to_string()).into());
        }
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("opening database {}", db_path.display()))?;
        Ok(Self {
            conn,
            schema_cache: OnceCell::new(),
        })
    }

    /// User table names, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Textual schema for prompting: one block per table listing columns,
    /// types, and primary keys. Computed once per store.
    pub fn schema(&self) -> Result<&str> {
        self.schema_cache
            .get_or_try_init(|| {
                let mut parts = Vec::new();
                for table in self.table_names()? {
                    let mut stmt = self
                        .conn
                        .prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
                    let cols = stmt.query_map([], |row| {
                        let name: String = row.get(1)?;
                        let kind: String = row.get(2)?;
                        let pk: i64 = row.get(5)?;
                        Ok(format!(
                            "  {} {}{}",
                            name,
                            kind,
                            if pk != 0 { " PRIMARY KEY" } else { "" }
                        ))
                    })?;
                    let col_defs = cols.collect::<rusqlite::Result<Vec<_>>>()?;
                    parts.push(format!("\"{}\"(\n{}\n)", table, col_defs.join(",\n")));
                }
                Ok::<_, anyhow::Error>(parts.join("\n\n"))
            })
            .map(String::as_str)
    }

    /// Cheap static checks before execution: SELECT-only, no mutation
    /// keywords, balanced parentheses.
    pub fn validate(sql: &str) -> Result<(), String> {
        let upper = sql.trim().to_uppercase();
        if !upper.starts_with("SELECT") {
            return Err("Only SELECT queries are allowed".to_string());
        }
        for keyword in DANGEROUS_KEYWORDS {
            if upper.contains(keyword) {
                return Err(format!("Keyword {} not allowed", keyword));
            }
        }
        let open = sql.matches('(').count();
        let close = sql.matches(')').count();
        if open != close {
            return Err("Unbalanced parentheses".to_string());
        }
        Ok(())
    }

    /// Validate and run a query. Execution failures come back inside the
    /// [`QueryResult`], never as an Err: a bad query is a repairable
    /// outcome, not a crash.
    pub fn execute(&self, sql: &str) -> QueryResult {
        if let Err(reason) = Self::validate(sql) {
            return QueryResult::failure(&reason);
        }

        let mut stmt = match self.conn.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e) => return QueryResult::failure(&e.to_string()),
        };

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mapped = stmt.query_map([], |row| {
            let mut out = Vec::with_capacity(width);
            for i in 0..width {
                out.push(json_value(row.get_ref(i)?));
            }
            Ok(out)
        });

        let rows = match mapped {
            Ok(iter) => match iter.collect::<rusqlite::Result<Vec<_>>>() {
                Ok(rows) => rows,
                Err(e) => return QueryResult::failure(&e.to_string()),
            },
            Err(e) => return QueryResult::failure(&e.to_string()),
        };

        debug!("Query returned {} rows", rows.len());
        QueryResult::ok(columns, rows)
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_db(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("retail.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE Orders (OrderID INTEGER PRIMARY KEY, CustomerID TEXT, OrderDate TEXT);
            CREATE TABLE "Order Details" (
                OrderID INTEGER, ProductID INTEGER,
                UnitPrice REAL, Quantity INTEGER, Discount REAL
            );
            CREATE TABLE Products (ProductID INTEGER PRIMARY KEY, ProductName TEXT, CategoryID INTEGER);
            INSERT INTO Orders VALUES (1, 'ALFKI', '1997-06-05'), (2, 'BONAP', '1997-06-12');
            INSERT INTO "Order Details" VALUES (1, 10, 18.0, 4, 0.0), (2, 10, 18.0, 2, 0.1);
            INSERT INTO Products VALUES (10, 'Chai', 1);
            "#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_open_missing_db_fails() {
        let err = SqlStore::open(Path::new("/nonexistent/retail.db")).unwrap_err();
        assert!(err.to_string().contains("database not found"));
    }

    #[test]
    fn test_schema_lists_tables_and_primary_keys() {
        let dir = TempDir::new().unwrap();
        let store = SqlStore::open(&seed_db(&dir)).unwrap();

        let schema = store.schema().unwrap();
        assert!(schema.contains("\"Orders\"("));
        assert!(schema.contains("OrderID INTEGER PRIMARY KEY"));
        assert!(schema.contains("\"Order Details\"("));
    }

    #[test]
    fn test_table_names_sorted() {
        let dir = TempDir::new().unwrap();
        let store = SqlStore::open(&seed_db(&dir)).unwrap();
        assert_eq!(
            store.table_names().unwrap(),
            vec!["Order Details", "Orders", "Products"]
        );
    }

    #[test]
    fn test_validate_rejects_mutation() {
        assert!(SqlStore::validate("SELECT * FROM Orders").is_ok());
        assert!(SqlStore::validate("DELETE FROM Orders").is_err());
        assert!(SqlStore::validate("SELECT * FROM Orders WHERE id IN (SELECT 1").is_err());
        let err = SqlStore::validate("SELECT 1; DROP TABLE Orders").unwrap_err();
        assert!(err.contains("DROP"));
    }

    #[test]
    fn test_execute_returns_typed_rows() {
        let dir = TempDir::new().unwrap();
        let store = SqlStore::open(&seed_db(&dir)).unwrap();

        let result = store.execute("SELECT OrderID, CustomerID FROM Orders ORDER BY OrderID");
        assert!(result.success);
        assert_eq!(result.columns, vec!["OrderID", "CustomerID"]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[0][0], serde_json::json!(1));
        assert_eq!(result.rows[0][1], serde_json::json!("ALFKI"));
    }

    #[test]
    fn test_execute_failure_is_a_result() {
        let dir = TempDir::new().unwrap();
        let store = SqlStore::open(&seed_db(&dir)).unwrap();

        let result = store.execute("SELECT * FROM NoSuchTable");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("NoSuchTable"));
        assert_eq!(result.row_count, 0);
    }

    #[test]
    fn test_aggregate_real_values() {
        let dir = TempDir::new().unwrap();
        let store = SqlStore::open(&seed_db(&dir)).unwrap();

        let result = store.execute(
            "SELECT SUM(UnitPrice * Quantity * (1 - Discount)) FROM \"Order Details\"",
        );
        assert!(result.success);
        let total = result.rows[0][0].as_f64().unwrap();
        assert!((total - 104.4).abs() < 1e-9);
    }
}
