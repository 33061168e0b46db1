//! SQL generation for every statement a builder can issue.
//!
//! Payload parameters (`VALUES`, `SET`) are numbered first; filter parameters continue the
//! same sequence. LIMIT and OFFSET are inlined integers.

use super::{Action, OrderClause, QueryBuilder, UpsertOptions};
use crate::error::{RestError, RestResult};
use crate::filter::FilterSet;
use crate::filter::param::ParamList;
use crate::ident::{Ident, column_list, quote_ident};
use crate::join::projection;
use crate::row::JsonRow;
use crate::select::parse_select;
use crate::value::{SqlValue, is_json_shaped};
use serde_json::Value;

/// A compiled statement and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Parameters as plain JSON values.
    pub fn values(&self) -> Vec<&Value> {
        self.params.iter().map(SqlValue::as_value).collect()
    }
}

/// The pieces of a builder the compiler reads.
pub(crate) struct Parts<'q> {
    pub table: &'q str,
    pub filters: &'q FilterSet,
    pub ts_config: &'q str,
}

impl Parts<'_> {
    fn table_sql(&self) -> RestResult<String> {
        quote_ident(self.table)
            .map_err(|e| RestError::validation(format!("invalid table '{}': {e}", self.table)))
    }

    /// Append ` WHERE ...` when there are filters.
    fn push_where(&self, sql: &mut String, params: &mut ParamList) -> RestResult<()> {
        let predicate = self.filters.build_into(params, self.ts_config)?;
        if !predicate.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        Ok(())
    }
}

/// `"col" [ASC|DESC] [NULLS FIRST|LAST], ...`; empty for no terms.
pub(crate) fn order_by_sql(orders: &[&OrderClause]) -> RestResult<String> {
    let mut terms = Vec::with_capacity(orders.len());
    for order in orders {
        let mut term = quote_ident(&order.column).map_err(|e| {
            RestError::validation(format!("invalid order column '{}': {e}", order.column))
        })?;
        term.push_str(if order.ascending { " ASC" } else { " DESC" });
        match order.nulls_first {
            Some(true) => term.push_str(" NULLS FIRST"),
            Some(false) => term.push_str(" NULLS LAST"),
            None => {}
        }
        terms.push(term);
    }
    Ok(terms.join(", "))
}

pub(crate) fn select(
    parts: &Parts<'_>,
    columns: &str,
    orders: &[&OrderClause],
    limit: Option<u64>,
    offset: Option<u64>,
) -> RestResult<Statement> {
    let mut params = ParamList::new();
    let mut sql = if columns.is_empty() {
        format!("SELECT FROM {}", parts.table_sql()?)
    } else {
        format!("SELECT {} FROM {}", columns, parts.table_sql()?)
    };
    parts.push_where(&mut sql, &mut params)?;
    let order = order_by_sql(orders)?;
    if !order.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order);
    }
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
    Ok(Statement {
        sql,
        params: params.into_vec(),
    })
}

pub(crate) fn count(parts: &Parts<'_>) -> RestResult<Statement> {
    let mut params = ParamList::new();
    let mut sql = format!("SELECT COUNT(*) AS \"count\" FROM {}", parts.table_sql()?);
    parts.push_where(&mut sql, &mut params)?;
    Ok(Statement {
        sql,
        params: params.into_vec(),
    })
}

/// Planner estimate for the filtered table; the plan is read from `QUERY PLAN`.
pub(crate) fn planned_count(parts: &Parts<'_>) -> RestResult<Statement> {
    let mut params = ParamList::new();
    let mut sql = format!("EXPLAIN (FORMAT JSON) SELECT 1 FROM {}", parts.table_sql()?);
    parts.push_where(&mut sql, &mut params)?;
    Ok(Statement {
        sql,
        params: params.into_vec(),
    })
}

fn placeholder(params: &mut ParamList, value: &Value) -> String {
    let idx = params.push(SqlValue(value.clone()));
    if is_json_shaped(value) {
        format!("${idx}::jsonb")
    } else {
        format!("${idx}")
    }
}

/// Union of row keys, in first-seen order.
fn insert_columns(rows: &[JsonRow]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    columns
}

fn conflict_target(options: &UpsertOptions) -> Vec<String> {
    options
        .on_conflict
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|cols| !cols.is_empty())
        .unwrap_or_else(|| vec!["id".to_string()])
}

pub(crate) fn insert(
    parts: &Parts<'_>,
    rows: &[JsonRow],
    upsert: Option<&UpsertOptions>,
    returning: Option<&str>,
) -> RestResult<Statement> {
    let table = parts.table_sql()?;
    let columns = insert_columns(rows);
    let mut params = ParamList::new();

    let mut sql = format!("INSERT INTO {table}");
    if columns.is_empty() {
        if rows.len() > 1 {
            return Err(RestError::validation(
                "cannot insert several rows that have no columns",
            ));
        }
        sql.push_str(" DEFAULT VALUES");
    } else {
        sql.push_str(&format!(" ({}) VALUES ", column_list(&columns)?));
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let values: Vec<String> = columns
                .iter()
                .map(|col| match row.get(*col) {
                    Some(value) => placeholder(&mut params, value),
                    None => "DEFAULT".to_string(),
                })
                .collect();
            sql.push('(');
            sql.push_str(&values.join(", "));
            sql.push(')');
        }
    }

    if let Some(options) = upsert {
        let target = conflict_target(options);
        sql.push_str(&format!(" ON CONFLICT ({})", column_list(&target)?));
        let updates: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|c| !target.iter().any(|t| t == c))
            .collect();
        if options.ignore_duplicates || updates.is_empty() {
            sql.push_str(" DO NOTHING");
        } else {
            let set: RestResult<Vec<String>> = updates
                .iter()
                .map(|c| {
                    let col = quote_ident(c)?;
                    Ok(format!("{col} = EXCLUDED.{col}"))
                })
                .collect();
            sql.push_str(" DO UPDATE SET ");
            sql.push_str(&set?.join(", "));
        }
    }

    push_returning(&mut sql, returning)?;
    Ok(Statement {
        sql,
        params: params.into_vec(),
    })
}

pub(crate) fn update(
    parts: &Parts<'_>,
    patch: &JsonRow,
    returning: Option<&str>,
) -> RestResult<Statement> {
    if patch.is_empty() {
        return Err(RestError::validation("update patch has no columns"));
    }
    let mut params = ParamList::new();
    let mut assignments = Vec::with_capacity(patch.len());
    for (column, value) in patch {
        let col = quote_ident(column)?;
        assignments.push(format!("{col} = {}", placeholder(&mut params, value)));
    }
    let mut sql = format!(
        "UPDATE {} SET {}",
        parts.table_sql()?,
        assignments.join(", ")
    );
    parts.push_where(&mut sql, &mut params)?;
    push_returning(&mut sql, returning)?;
    Ok(Statement {
        sql,
        params: params.into_vec(),
    })
}

pub(crate) fn delete(parts: &Parts<'_>, returning: Option<&str>) -> RestResult<Statement> {
    let mut params = ParamList::new();
    let mut sql = format!("DELETE FROM {}", parts.table_sql()?);
    parts.push_where(&mut sql, &mut params)?;
    push_returning(&mut sql, returning)?;
    Ok(Statement {
        sql,
        params: params.into_vec(),
    })
}

fn push_returning(sql: &mut String, returning: Option<&str>) -> RestResult<()> {
    match returning {
        None => Ok(()),
        Some("") => Err(RestError::validation(
            "the returned columns must include at least one plain column",
        )),
        Some(columns) => {
            sql.push_str(" RETURNING ");
            sql.push_str(columns);
            Ok(())
        }
    }
}

impl<E> QueryBuilder<'_, E> {
    pub(crate) fn parts(&self) -> Parts<'_> {
        Parts {
            table: &self.table,
            filters: &self.filters,
            ts_config: &self.client.config().text_search_config,
        }
    }

    /// Table name without its schema, as the foreign-key graph names it.
    pub(crate) fn source_table(&self) -> RestResult<String> {
        Ok(Ident::parse(&self.table)?.name().to_string())
    }

    /// Compile the main statement with `projection` as its select / RETURNING list.
    pub(crate) fn compile_main(&self, projection: Option<&str>) -> RestResult<Statement> {
        let parts = self.parts();
        match &self.action {
            Action::Select => {
                let (limit, offset) = self.paging();
                select(
                    &parts,
                    projection.unwrap_or("*"),
                    &self.main_orders(),
                    limit,
                    offset,
                )
            }
            Action::Insert(rows) => insert(&parts, rows, None, projection),
            Action::Upsert(rows, options) => insert(&parts, rows, Some(options), projection),
            Action::Update(patch) => update(&parts, patch, projection),
            Action::Delete => delete(&parts, projection),
        }
    }

    /// The main statement this builder would run, without executing anything.
    ///
    /// Relationship references are resolved by separate queries at execution time; columns
    /// they need that were not selected are added then, so they do not appear here.
    pub fn to_sql(&self) -> RestResult<Statement> {
        if let Some(err) = &self.deferred {
            return Err(match err {
                RestError::Serialization(message) => RestError::Serialization(message.clone()),
                RestError::Validation(message) => RestError::Validation(message.clone()),
                other => RestError::validation(other.to_string()),
            });
        }
        let list = match &self.columns {
            Some(columns) => Some(projection(&parse_select(columns), &[])?.sql),
            None if self.action.is_mutation() => None,
            None => Some("*".to_string()),
        };
        self.compile_main(list.as_deref())
    }
}
