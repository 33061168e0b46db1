//! In-memory executor for unit tests.
//!
//! Understands just enough SQL to serve the statements this crate generates: projections,
//! `WHERE "col" IN (...)`, `COUNT(*)`, `EXPLAIN` and the foreign-key introspection query.
//! Every statement is recorded so tests can assert on the exact SQL that ran.

use crate::error::{RestError, RestResult};
use crate::executor::Executor;
use crate::row::JsonRow;
use crate::schema::FkInfo;
use crate::value::SqlValue;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

pub(crate) fn fk(
    constraint_name: &str,
    from_table: &str,
    from_column: &str,
    to_table: &str,
    to_column: &str,
) -> FkInfo {
    FkInfo {
        constraint_name: constraint_name.to_string(),
        from_table: from_table.to_string(),
        from_column: from_column.to_string(),
        to_table: to_table.to_string(),
        to_column: to_column.to_string(),
    }
}

/// Build a row from a `json!({...})` object.
pub(crate) fn row(value: Value) -> JsonRow {
    match value {
        Value::Object(map) => map,
        other => panic!("row fixture must be an object, got {other}"),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
pub(crate) struct MockExecutor {
    tables: HashMap<String, Vec<JsonRow>>,
    fks: Vec<FkInfo>,
    responses: Vec<(String, Vec<JsonRow>)>,
    plan_rows: i64,
    affected: u64,
    latency: Option<Duration>,
    failures: Mutex<Vec<String>>,
    calls: Mutex<Vec<Call>>,
}

impl MockExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_fks(mut self, fks: Vec<FkInfo>) -> Self {
        self.fks = fks;
        self
    }

    pub(crate) fn with_table(mut self, name: &str, rows: Vec<Value>) -> Self {
        self.tables
            .insert(name.to_string(), rows.into_iter().map(row).collect());
        self
    }

    /// Answer any statement containing `needle` with `rows`.
    pub(crate) fn with_response(mut self, needle: &str, rows: Vec<Value>) -> Self {
        self.responses
            .push((needle.to_string(), rows.into_iter().map(row).collect()));
        self
    }

    pub(crate) fn with_plan_rows(mut self, rows: i64) -> Self {
        self.plan_rows = rows;
        self
    }

    pub(crate) fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    /// Suspend every statement for `latency` so concurrent callers overlap.
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every statement containing `needle`.
    pub(crate) fn failing(self, needle: &str) -> Self {
        self.failures.lock().unwrap().push(needle.to_string());
        self
    }

    pub(crate) fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.sql).collect()
    }

    pub(crate) fn count_matching(&self, needle: &str) -> usize {
        self.statements()
            .iter()
            .filter(|sql| sql.contains(needle))
            .count()
    }

    fn record(&self, sql: &str, params: &[SqlValue]) -> RestResult<()> {
        self.calls.lock().unwrap().push(Call {
            sql: sql.to_string(),
            params: params.iter().map(|p| p.0.clone()).collect(),
        });
        let failures = self.failures.lock().unwrap();
        if let Some(needle) = failures.iter().find(|n| sql.contains(n.as_str())) {
            return Err(RestError::Database {
                message: format!("mock failure for '{needle}'"),
                code: "XX000".to_string(),
                details: None,
                hint: None,
            });
        }
        Ok(())
    }

    fn answer(&self, sql: &str, params: &[SqlValue]) -> Vec<JsonRow> {
        if let Some((_, rows)) = self.responses.iter().find(|(n, _)| sql.contains(n.as_str())) {
            return rows.clone();
        }
        if sql.contains("information_schema") {
            return self
                .fks
                .iter()
                .map(|f| {
                    row(json!({
                        "constraint_name": f.constraint_name,
                        "from_table": f.from_table,
                        "from_column": f.from_column,
                        "to_table": f.to_table,
                        "to_column": f.to_column,
                    }))
                })
                .collect();
        }
        if sql.starts_with("EXPLAIN") {
            return vec![row(json!({
                "QUERY PLAN": [{"Plan": {"Plan Rows": self.plan_rows}}]
            }))];
        }
        let Some(caps) = select_re().captures(sql) else {
            return Vec::new();
        };
        let table = self.tables.get(&caps[2]).cloned().unwrap_or_default();
        let table = match (caps.get(3), caps.get(4)) {
            (Some(column), Some(list)) => {
                let wanted: Vec<&Value> = placeholder_re()
                    .captures_iter(list.as_str())
                    .filter_map(|c| c[1].parse::<usize>().ok())
                    .filter_map(|i| params.get(i - 1).map(|p| &p.0))
                    .collect();
                table
                    .into_iter()
                    .filter(|r| r.get(column.as_str()).is_some_and(|v| wanted.contains(&v)))
                    .collect()
            }
            _ => table,
        };

        let projection = &caps[1];
        if projection.contains("COUNT(*)") {
            return vec![row(json!({ "count": table.len() }))];
        }
        table.iter().map(|r| project(r, projection)).collect()
    }
}

fn select_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^SELECT (.*?) FROM "(\w+)"(?: WHERE "(\w+)" IN \(([^)]*)\))?"#).unwrap()
    })
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\d+)").unwrap())
}

fn column_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^"(\w+)"(?:::[\w\[\]]+)?(?: AS "(\w+)")?$"#).unwrap())
}

fn project(source: &JsonRow, projection: &str) -> JsonRow {
    let mut out = JsonRow::new();
    for part in projection.split(", ") {
        if part == "*" {
            out.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
            continue;
        }
        if let Some(c) = column_re().captures(part) {
            let name = c.get(2).unwrap_or_else(|| c.get(1).unwrap()).as_str();
            let value = source.get(&c[1]).cloned().unwrap_or(Value::Null);
            out.insert(name.to_string(), value);
        }
    }
    out
}

impl Executor for MockExecutor {
    async fn query_rows(&self, sql: &str, params: &[SqlValue]) -> RestResult<Vec<JsonRow>> {
        let recorded = self.record(sql, params);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        recorded?;
        Ok(self.answer(sql, params))
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> RestResult<u64> {
        self.record(sql, params)?;
        Ok(self.affected)
    }

    async fn batch_execute(&self, sql: &str) -> RestResult<()> {
        self.record(sql, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_projected_in_lookups() {
        let exec = MockExecutor::new().with_table(
            "profiles",
            vec![
                json!({"id": 1, "username": "ann", "bio": "x"}),
                json!({"id": 2, "username": "bob", "bio": "y"}),
            ],
        );
        let rows = exec
            .query_rows(
                r#"SELECT "username" AS "name", "id" FROM "profiles" WHERE "id" IN ($1)"#,
                &[SqlValue::new(2)],
            )
            .await
            .unwrap();
        assert_eq!(rows, vec![row(json!({"name": "bob", "id": 2}))]);
    }
}
