//! Terminal methods: run the count, the main statement and the relationship queries.

use super::compile::{self, Statement};
use super::{Action, Count, QueryBuilder};
use crate::error::{RestError, RestResult};
use crate::executor::{Executor, Runner};
use crate::join::{JoinContext, PlannedJoin, plan_joins, projection, required_columns, resolve_joins};
use crate::log::StatementKind;
use crate::result::QueryResult;
use crate::row::JsonRow;
use crate::select::parse_select;
use serde_json::Value;
use std::sync::Arc;

/// Rows (absent in head mode or for a mutation without `select`) plus the count.
struct Output {
    rows: Option<Vec<JsonRow>>,
    count: Option<i64>,
}

impl<E: Executor> QueryBuilder<'_, E> {
    /// Run the statement and return every row.
    pub async fn execute(self) -> QueryResult<Vec<JsonRow>> {
        match self.run().await {
            Ok(out) => QueryResult {
                data: out.rows,
                error: None,
                count: out.count,
            },
            Err(e) => QueryResult::err(e),
        }
    }

    /// Run the statement and require exactly one row (`PGRST116` otherwise).
    pub async fn single(self) -> QueryResult<JsonRow> {
        self.one(false).await
    }

    /// Run the statement and accept zero or one row; zero yields `data: None`.
    pub async fn maybe_single(self) -> QueryResult<JsonRow> {
        self.one(true).await
    }

    async fn one(self, allow_none: bool) -> QueryResult<JsonRow> {
        let out = match self.run().await {
            Ok(out) => out,
            Err(e) => return QueryResult::err(e),
        };
        let Some(mut rows) = out.rows else {
            return QueryResult::empty().with_count(out.count);
        };
        let result = match rows.len() {
            1 => QueryResult::ok(rows.remove(0)),
            0 if allow_none => QueryResult::empty(),
            n => QueryResult::err(RestError::Cardinality { rows: n }),
        };
        result.with_count(out.count)
    }

    async fn run(mut self) -> RestResult<Output> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        let runner = self.client.runner();
        match &self.action {
            Action::Select => self.run_select(runner).await,
            _ => self.run_mutation(runner).await,
        }
    }

    async fn run_select(&self, runner: Runner<'_, E>) -> RestResult<Output> {
        let count = match self.count {
            Some(mode) => Some(self.count_rows(runner, mode).await?),
            None => None,
        };
        if self.head {
            return Ok(Output { rows: None, count });
        }
        let columns = self.columns.as_deref().unwrap_or("*");
        let rows = self.fetch(runner, columns, StatementKind::Select).await?;
        Ok(Output {
            rows: Some(rows),
            count,
        })
    }

    async fn run_mutation(&self, runner: Runner<'_, E>) -> RestResult<Output> {
        let kind = match &self.action {
            Action::Insert(rows) | Action::Upsert(rows, _) if rows.is_empty() => {
                // Nothing to write.
                return Ok(Output {
                    rows: self.columns.as_ref().map(|_| Vec::new()),
                    count: self.count.map(|_| 0),
                });
            }
            Action::Insert(_) => StatementKind::Insert,
            Action::Upsert(..) => StatementKind::Upsert,
            Action::Update(_) => StatementKind::Update,
            Action::Delete => StatementKind::Delete,
            Action::Select => StatementKind::Select,
        };

        match self.columns.as_deref() {
            Some(columns) => {
                let rows = self.fetch(runner, columns, kind).await?;
                let count = self.count.map(|_| rows.len() as i64);
                Ok(Output {
                    rows: Some(rows),
                    count,
                })
            }
            None => {
                let stmt = self.compile_main(None)?;
                let affected = runner.execute(kind, &stmt.sql, &stmt.params).await?;
                Ok(Output {
                    rows: None,
                    count: self.count.map(|_| affected as i64),
                })
            }
        }
    }

    /// Run the main statement with `columns` as its projection and resolve its joins.
    async fn fetch(
        &self,
        runner: Runner<'_, E>,
        columns: &str,
        kind: StatementKind,
    ) -> RestResult<Vec<JsonRow>> {
        let parsed = parse_select(columns);
        let (fks, mut planned): (Arc<[_]>, Vec<PlannedJoin>) = if parsed.joins.is_empty() {
            (Arc::from(Vec::new()), Vec::new())
        } else {
            let fks = self.client.schema_cache().get(runner).await?;
            let planned = plan_joins(
                &fks,
                &parsed.joins,
                &self.source_table()?,
                runner.config().fk_name_fallback,
            );
            (fks, planned)
        };

        let projection = projection(&parsed, &required_columns(&planned))?;
        projection.bind(&mut planned);
        let stmt = self.compile_main(Some(&projection.sql))?;
        let mut rows = runner.rows(kind, &stmt.sql, &stmt.params).await?;

        let ctx = JoinContext {
            runner,
            fks,
            foreign_orders: self.foreign_orders(),
        };
        resolve_joins(&ctx, &mut rows, &planned, &projection.added).await;
        Ok(rows)
    }

    async fn count_rows(&self, runner: Runner<'_, E>, mode: Count) -> RestResult<i64> {
        let parts = self.parts();
        match mode {
            Count::Exact => exact_count(runner, &compile::count(&parts)?).await,
            Count::Planned => planned_count(runner, &compile::planned_count(&parts)?).await,
            Count::Estimated => {
                let estimate = planned_count(runner, &compile::planned_count(&parts)?).await?;
                if estimate < runner.config().estimated_count_threshold {
                    exact_count(runner, &compile::count(&parts)?).await
                } else {
                    Ok(estimate)
                }
            }
        }
    }
}

async fn exact_count<E: Executor>(runner: Runner<'_, E>, stmt: &Statement) -> RestResult<i64> {
    let rows = runner
        .rows(StatementKind::Count, &stmt.sql, &stmt.params)
        .await?;
    rows.first()
        .and_then(|row| row.get("count"))
        .and_then(Value::as_i64)
        .ok_or_else(|| RestError::decode("count", "count query returned no integer"))
}

async fn planned_count<E: Executor>(runner: Runner<'_, E>, stmt: &Statement) -> RestResult<i64> {
    let rows = runner
        .rows(StatementKind::Count, &stmt.sql, &stmt.params)
        .await?;
    let plan = rows
        .first()
        .and_then(|row| row.get("QUERY PLAN"))
        .ok_or_else(|| RestError::decode("QUERY PLAN", "EXPLAIN returned no plan"))?;
    plan_rows(plan).ok_or_else(|| RestError::decode("QUERY PLAN", "plan has no 'Plan Rows'"))
}

/// `[{"Plan": {"Plan Rows": n}}]`, as JSON or as its text form.
fn plan_rows(plan: &Value) -> Option<i64> {
    let parsed;
    let plan = match plan {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text).ok()?;
            &parsed
        }
        other => other,
    };
    let rows = plan.get(0)?.get("Plan")?.get("Plan Rows")?;
    rows.as_i64().or_else(|| rows.as_f64().map(|f| f as i64))
}
