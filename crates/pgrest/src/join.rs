//! Relationship resolution for select expressions.
//!
//! For every [`JoinRef`] the resolver decides the join direction, then fetches the related
//! rows for *all* parent rows with one batched `IN (...)` query, resolves nested references
//! on the fetched rows, and attaches the result under the reference's alias.
//!
//! A failing relationship never fails the statement: it is logged and its alias is set to
//! `null` (many-to-one) or `[]` (one-to-many) on every parent row.

use crate::builder::OrderClause;
use crate::builder::compile::order_by_sql;
use crate::error::{RestError, RestResult};
use crate::executor::{Executor, Runner};
use crate::ident::quote_ident;
use crate::log::StatementKind;
use crate::row::JsonRow;
use crate::schema::FkInfo;
use crate::select::{JoinRef, ParsedSelect, column_sql, parse_select};
use crate::value::SqlValue;
use futures_util::future::{BoxFuture, join_all};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Which side of the relationship holds the foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The source row holds the foreign key; attaches one object or `null`.
    ManyToOne,
    /// The related rows point back at the source; attaches an array.
    OneToMany,
}

impl Direction {
    fn empty_value(self) -> Value {
        match self {
            Direction::ManyToOne => Value::Null,
            Direction::OneToMany => Value::Array(Vec::new()),
        }
    }
}

/// How one relationship reference is joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkPlan {
    pub direction: Direction,
    /// Column read from the parent rows.
    pub local_column: String,
    /// Column matched on the related table.
    pub foreign_column: String,
    pub foreign_table: String,
}

/// Resolve a relationship reference against the foreign-key graph.
///
/// First match wins: explicit constraint name, constraint-name convention
/// (`{table}_{column}_fkey`), table-pair lookup, then `{alias}_id -> id`.
pub fn resolve_fk(fks: &[FkInfo], join: &JoinRef, source_table: &str) -> Option<FkPlan> {
    resolve(fks, join, source_table, true)
}

pub(crate) fn resolve(
    fks: &[FkInfo],
    join: &JoinRef,
    source_table: &str,
    name_fallback: bool,
) -> Option<FkPlan> {
    if let Some(hint) = join.constraint.as_deref() {
        if let Some(fk) = fks.iter().find(|fk| fk.constraint_name == hint) {
            return Some(plan_for(fk, source_table));
        }
        if let Some(plan) = plan_from_constraint_name(hint, join, source_table) {
            return Some(plan);
        }
    }

    let preferred_column = format!("{}_id", join.alias);
    let pick = |candidates: Vec<&FkInfo>| -> Option<FkInfo> {
        candidates
            .iter()
            .find(|fk| fk.from_column == preferred_column)
            .or_else(|| candidates.first())
            .map(|fk| (*fk).clone())
    };

    let outgoing = fks
        .iter()
        .filter(|fk| fk.from_table == source_table && fk.to_table == join.table)
        .collect();
    if let Some(fk) = pick(outgoing) {
        return Some(plan_for(&fk, source_table));
    }
    let incoming = fks
        .iter()
        .filter(|fk| fk.from_table == join.table && fk.to_table == source_table)
        .collect();
    if let Some(fk) = pick(incoming) {
        return Some(plan_for(&fk, source_table));
    }

    if !name_fallback {
        return None;
    }
    tracing::warn!(
        target: "pgrest.join",
        source_table,
        table = %join.table,
        alias = %join.alias,
        column = %preferred_column,
        "no foreign key found, guessing {{alias}}_id -> id; add a constraint hint to be explicit"
    );
    Some(FkPlan {
        direction: Direction::ManyToOne,
        local_column: preferred_column,
        foreign_column: "id".to_string(),
        foreign_table: join.table.clone(),
    })
}

fn plan_for(fk: &FkInfo, source_table: &str) -> FkPlan {
    if fk.from_table == source_table {
        FkPlan {
            direction: Direction::ManyToOne,
            local_column: fk.from_column.clone(),
            foreign_column: fk.to_column.clone(),
            foreign_table: fk.to_table.clone(),
        }
    } else {
        FkPlan {
            direction: Direction::OneToMany,
            local_column: fk.to_column.clone(),
            foreign_column: fk.from_column.clone(),
            foreign_table: fk.from_table.clone(),
        }
    }
}

/// `{source}_{col}_fkey` is many-to-one on `col`; `{join_table}_{col}_fkey` is one-to-many.
fn plan_from_constraint_name(hint: &str, join: &JoinRef, source_table: &str) -> Option<FkPlan> {
    let stem = hint.strip_suffix("_fkey")?;
    if let Some(col) = stem.strip_prefix(&format!("{source_table}_")).filter(|c| !c.is_empty()) {
        return Some(FkPlan {
            direction: Direction::ManyToOne,
            local_column: col.to_string(),
            foreign_column: "id".to_string(),
            foreign_table: join.table.clone(),
        });
    }
    if let Some(col) = stem.strip_prefix(&format!("{}_", join.table)).filter(|c| !c.is_empty()) {
        return Some(FkPlan {
            direction: Direction::OneToMany,
            local_column: "id".to_string(),
            foreign_column: col.to_string(),
            foreign_table: join.table.clone(),
        });
    }
    None
}

/// A relationship reference with its resolved plan (`None` when unresolvable).
#[derive(Debug, Clone)]
pub(crate) struct PlannedJoin {
    pub join: JoinRef,
    pub plan: Option<FkPlan>,
    /// Row key the parent's join value is read from. See [`Projection::bind`].
    pub local_key: String,
}

pub(crate) fn plan_joins(
    fks: &[FkInfo],
    joins: &[JoinRef],
    source_table: &str,
    name_fallback: bool,
) -> Vec<PlannedJoin> {
    joins
        .iter()
        .map(|join| {
            let plan = resolve(fks, join, source_table, name_fallback);
            if plan.is_none() {
                tracing::warn!(
                    target: "pgrest.join",
                    source_table,
                    table = %join.table,
                    alias = %join.alias,
                    "could not resolve relationship"
                );
            }
            let local_key = plan
                .as_ref()
                .map(|p| p.local_column.clone())
                .unwrap_or_default();
            PlannedJoin {
                join: join.clone(),
                plan,
                local_key,
            }
        })
        .collect()
}

/// Prefix for join columns fetched under a private name because the select list already
/// uses their name for something else.
const JOIN_KEY_PREFIX: &str = "__pgrest_";

/// A select list ready for SQL, plus the columns added only to perform joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Projection {
    pub sql: String,
    /// Row keys to strip once joins are resolved.
    pub added: Vec<String>,
    /// Required column -> row key, for columns fetched under a private name.
    keys: HashMap<String, String>,
}

impl Projection {
    /// Row key holding the stored value of `column`.
    pub(crate) fn key_for<'a>(&'a self, column: &'a str) -> &'a str {
        self.keys.get(column).map_or(column, String::as_str)
    }

    /// Point each planned join at the row key of its local column.
    pub(crate) fn bind(&self, planned: &mut [PlannedJoin]) {
        for p in planned {
            if let Some(key) = self.keys.get(&p.local_key) {
                p.local_key = key.clone();
            }
        }
    }
}

/// Render the plain columns of `parsed`, adding any `required` column the caller did not
/// select. Added columns are reported so they can be stripped from results.
///
/// A required column only counts as selected when its stored value appears under its own
/// name. `author_id:editor_id` or `author_id::text` do not qualify, so the real column is
/// fetched under a private name instead.
pub(crate) fn projection(parsed: &ParsedSelect, required: &[&str]) -> RestResult<Projection> {
    let mut parts = Vec::new();
    let mut raw = HashSet::new();
    let mut renamed = HashSet::new();
    let mut star = false;
    for token in parsed.column_tokens() {
        let col = column_sql(token)?;
        match col.output {
            None => star = true,
            Some(name) if col.raw => {
                raw.insert(name);
            }
            Some(name) => {
                renamed.insert(name);
            }
        }
        parts.push(col.sql);
    }

    let mut added = Vec::new();
    let mut keys = HashMap::new();
    let mut seen = HashSet::new();
    for &column in required {
        if !seen.insert(column) {
            continue;
        }
        let shadowed = renamed.contains(column);
        if !shadowed && (star || raw.contains(column)) {
            continue;
        }
        let mut sql = quote_ident(column)?;
        let key = if shadowed {
            let key = format!("{JOIN_KEY_PREFIX}{column}");
            sql.push_str(" AS ");
            sql.push_str(&quote_ident(&key)?);
            keys.insert(column.to_string(), key.clone());
            key
        } else {
            column.to_string()
        };
        parts.push(sql);
        added.push(key);
    }
    Ok(Projection {
        sql: parts.join(", "),
        added,
        keys,
    })
}

/// Parent-row columns the planned joins read.
pub(crate) fn required_columns(planned: &[PlannedJoin]) -> Vec<&str> {
    planned
        .iter()
        .filter_map(|p| p.plan.as_ref().map(|plan| plan.local_column.as_str()))
        .collect()
}

/// Shared state for resolving the joins of one statement.
pub(crate) struct JoinContext<'a, E> {
    pub runner: Runner<'a, E>,
    pub fks: Arc<[FkInfo]>,
    /// `order()` clauses targeting related tables.
    pub foreign_orders: Vec<OrderClause>,
}

/// Resolve `planned` on `rows`, strip `strip`, then attach every alias.
pub(crate) fn resolve_joins<'a, E: Executor>(
    ctx: &'a JoinContext<'a, E>,
    rows: &'a mut Vec<JsonRow>,
    planned: &'a [PlannedJoin],
    strip: &'a [String],
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        if rows.is_empty() || planned.is_empty() {
            strip_columns(rows, strip);
            return;
        }

        let parents: &[JsonRow] = &rows[..];
        let outcomes = join_all(planned.iter().map(|p| fetch_relation(ctx, parents, p))).await;

        strip_columns(rows, strip);
        let mut inner_aliases = Vec::new();
        for (planned, outcome) in planned.iter().zip(outcomes) {
            let alias = &planned.join.alias;
            let values = match outcome {
                Some(values) => {
                    if planned.join.inner {
                        inner_aliases.push(alias.as_str());
                    }
                    values
                }
                None => {
                    let empty = planned
                        .plan
                        .as_ref()
                        .map_or(Value::Null, |p| p.direction.empty_value());
                    vec![empty; rows.len()]
                }
            };
            for (row, value) in rows.iter_mut().zip(values) {
                row.insert(alias.clone(), value);
            }
        }

        if !inner_aliases.is_empty() {
            rows.retain(|row| {
                inner_aliases.iter().all(|alias| match row.get(*alias) {
                    Some(Value::Null) | None => false,
                    Some(Value::Array(items)) => !items.is_empty(),
                    Some(_) => true,
                })
            });
        }
    })
}

fn strip_columns(rows: &mut [JsonRow], strip: &[String]) {
    if strip.is_empty() {
        return;
    }
    for row in rows {
        for column in strip {
            row.shift_remove(column);
        }
    }
}

/// One value per parent row, or `None` when the relationship failed.
async fn fetch_relation<E: Executor>(
    ctx: &JoinContext<'_, E>,
    parents: &[JsonRow],
    planned: &PlannedJoin,
) -> Option<Vec<Value>> {
    let plan = planned.plan.as_ref()?;
    match load_relation(ctx, parents, planned, plan).await {
        Ok(values) => Some(values),
        Err(e) => {
            tracing::warn!(
                target: "pgrest.join",
                alias = %planned.join.alias,
                table = %plan.foreign_table,
                error = %e,
                "relationship query failed, attaching empty value"
            );
            None
        }
    }
}

async fn load_relation<E: Executor>(
    ctx: &JoinContext<'_, E>,
    parents: &[JsonRow],
    planned: &PlannedJoin,
    plan: &FkPlan,
) -> RestResult<Vec<Value>> {
    let keys = distinct_keys(parents, &planned.local_key);
    if keys.is_empty() {
        return Ok(vec![plan.direction.empty_value(); parents.len()]);
    }

    let related = fetch_related(ctx, &planned.join, plan, keys).await?;
    let local_key = |row: &JsonRow| row.get(&planned.local_key).and_then(value_key);

    Ok(match plan.direction {
        Direction::ManyToOne => {
            let mut by_key: HashMap<String, Value> = HashMap::with_capacity(related.len());
            for (key, row) in related {
                by_key.entry(key).or_insert(Value::Object(row));
            }
            parents
                .iter()
                .map(|p| {
                    local_key(p)
                        .and_then(|k| by_key.get(&k).cloned())
                        .unwrap_or(Value::Null)
                })
                .collect()
        }
        Direction::OneToMany => {
            let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
            for (key, row) in related {
                groups.entry(key).or_default().push(Value::Object(row));
            }
            parents
                .iter()
                .map(|p| {
                    Value::Array(
                        local_key(p)
                            .and_then(|k| groups.get(&k).cloned())
                            .unwrap_or_default(),
                    )
                })
                .collect()
        }
    })
}

/// Fetch related rows for `keys` in batches, resolve their nested references, and return
/// them keyed by the matched column.
async fn fetch_related<E: Executor>(
    ctx: &JoinContext<'_, E>,
    join: &JoinRef,
    plan: &FkPlan,
    keys: Vec<Value>,
) -> RestResult<Vec<(String, JsonRow)>> {
    let parsed = parse_select(&join.columns);
    let config = ctx.runner.config();
    let mut nested = plan_joins(
        &ctx.fks,
        &parsed.joins,
        &plan.foreign_table,
        config.fk_name_fallback,
    );

    let mut required = vec![plan.foreign_column.as_str()];
    required.extend(required_columns(&nested));
    let projection = projection(&parsed, &required)?;
    projection.bind(&mut nested);
    let match_key = projection.key_for(&plan.foreign_column);

    let table = quote_ident(&plan.foreign_table)?;
    let column = quote_ident(&plan.foreign_column)?;
    let orders: Vec<&OrderClause> = ctx
        .foreign_orders
        .iter()
        .filter(|o| {
            o.foreign_table
                .as_deref()
                .is_some_and(|t| t == join.alias || t == join.table)
        })
        .collect();
    let order_sql = order_by_sql(&orders)?;

    let mut rows = Vec::new();
    for chunk in keys.chunks(config.join_batch_size.max(1)) {
        let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("${i}")).collect();
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            projection.sql,
            table,
            column,
            placeholders.join(", ")
        );
        if !order_sql.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_sql);
        }
        let params: Vec<SqlValue> = chunk.iter().cloned().map(SqlValue).collect();
        rows.extend(
            ctx.runner
                .rows(StatementKind::Relation, &sql, &params)
                .await?,
        );
    }

    // The matched column must survive nested resolution; strip it after keying.
    let foreign_added = projection.added.iter().any(|c| c == match_key);
    let nested_strip: Vec<String> = projection
        .added
        .iter()
        .filter(|c| *c != match_key)
        .cloned()
        .collect();
    resolve_joins(ctx, &mut rows, &nested, &nested_strip).await;

    rows.into_iter()
        .map(|mut row| {
            let key = row
                .get(match_key)
                .and_then(value_key)
                .ok_or_else(|| {
                    RestError::decode(
                        plan.foreign_column.clone(),
                        "related row is missing its join column",
                    )
                })?;
            if foreign_added {
                row.shift_remove(match_key);
            }
            Ok((key, row))
        })
        .collect()
}

/// Distinct non-null values of `column`, in first-seen order.
fn distinct_keys(rows: &[JsonRow], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter(|v| !v.is_null())
        .filter(|v| value_key(v).is_some_and(|k| seen.insert(k)))
        .cloned()
        .collect()
}

/// Canonical hash key for a join value. `None` for null.
fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(format!("s:{s}")),
        Value::Number(n) => Some(format!("n:{n}")),
        Value::Bool(b) => Some(format!("b:{b}")),
        other => Some(format!("j:{other}")),
    }
}

#[cfg(test)]
mod tests;
