//! Fluent, single-use query builder returned by [`RestClient::from`](crate::RestClient::from).
//!
//! Shaping calls (`select`, `insert`, `update`, `upsert`, `delete`) pick the statement,
//! filter calls narrow it, and a terminal (`execute`, `single`, `maybe_single`) consumes the
//! builder and produces a [`QueryResult`](crate::QueryResult).
//!
//! ```ignore
//! let result = client
//!     .from("games")
//!     .select("id, title, studio:studios(name)")
//!     .eq("genre", "roguelike")
//!     .order("released_at", OrderOptions::desc())
//!     .range(0, 9)
//!     .execute()
//!     .await;
//! ```
//!
//! Values passed to filters and payloads only need `Serialize`. A value that fails to
//! serialize, or an invalid argument, is remembered and reported by the terminal call.

pub(crate) mod compile;
mod execute;

use crate::client::RestClient;
use crate::error::RestError;
use crate::filter::{Filter, FilterOp, FilterSet, IsValue, TextSearchOptions};
use crate::row::JsonRow;
use serde::Serialize;
use serde_json::Value;

/// `LIMIT` and `OFFSET` are bigint in Postgres.
const MAX_ROWS: u64 = i64::MAX as u64;

pub use compile::Statement;

/// How to count matching rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    /// `SELECT COUNT(*)` with the same filters.
    Exact,
    /// The planner's row estimate.
    Planned,
    /// The planner's estimate, or an exact count when the estimate is small.
    Estimated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectOptions {
    pub count: Option<Count>,
    /// Only count; return no rows.
    pub head: bool,
}

impl SelectOptions {
    pub fn count(count: Count) -> Self {
        Self {
            count: Some(count),
            head: false,
        }
    }

    pub fn head(mut self) -> Self {
        self.head = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOptions {
    /// Comma-separated conflict target columns. Defaults to `id`.
    pub on_conflict: Option<String>,
    /// `ON CONFLICT DO NOTHING` instead of updating the existing row.
    pub ignore_duplicates: bool,
}

impl UpsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_conflict(mut self, columns: impl Into<String>) -> Self {
        self.on_conflict = Some(columns.into());
        self
    }

    pub fn ignore_duplicates(mut self) -> Self {
        self.ignore_duplicates = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderOptions {
    pub ascending: bool,
    /// `None` keeps the server default (NULLS LAST ascending, NULLS FIRST descending).
    pub nulls_first: Option<bool>,
    /// Order the rows of a related table (by alias or table name) instead of the main rows.
    pub foreign_table: Option<String>,
}

impl Default for OrderOptions {
    fn default() -> Self {
        Self {
            ascending: true,
            nulls_first: None,
            foreign_table: None,
        }
    }
}

impl OrderOptions {
    pub fn asc() -> Self {
        Self::default()
    }

    pub fn desc() -> Self {
        Self {
            ascending: false,
            ..Self::default()
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls_first = Some(true);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_first = Some(false);
        self
    }

    pub fn foreign_table(mut self, table: impl Into<String>) -> Self {
        self.foreign_table = Some(table.into());
        self
    }
}

/// One `order()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OrderClause {
    pub column: String,
    pub ascending: bool,
    pub nulls_first: Option<bool>,
    pub foreign_table: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) enum Action {
    Select,
    Insert(Vec<JsonRow>),
    Upsert(Vec<JsonRow>, UpsertOptions),
    Update(JsonRow),
    Delete,
}

impl Action {
    fn is_mutation(&self) -> bool {
        !matches!(self, Action::Select)
    }
}

/// Builder for one statement against one table.
#[must_use = "a query builder does nothing until a terminal method is awaited"]
pub struct QueryBuilder<'a, E> {
    client: &'a RestClient<E>,
    table: String,
    action: Action,
    /// Select expression, or the RETURNING expression of a mutation.
    columns: Option<String>,
    count: Option<Count>,
    head: bool,
    filters: FilterSet,
    orders: Vec<OrderClause>,
    limit: Option<u64>,
    range: Option<(u64, u64)>,
    deferred: Option<RestError>,
}

impl<'a, E> QueryBuilder<'a, E> {
    pub(crate) fn new(client: &'a RestClient<E>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            action: Action::Select,
            columns: None,
            count: None,
            head: false,
            filters: FilterSet::new(),
            orders: Vec::new(),
            limit: None,
            range: None,
            deferred: None,
        }
    }

    /// Keep the first error; later calls are still recorded but never reported.
    fn defer(&mut self, err: RestError) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }

    fn json(&mut self, value: impl Serialize) -> Value {
        match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                self.defer(e.into());
                Value::Null
            }
        }
    }

    fn payload_rows(&mut self, values: impl Serialize) -> Vec<JsonRow> {
        match self.json(values) {
            Value::Object(row) => vec![row],
            Value::Array(items) => {
                let mut rows = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(row) => rows.push(row),
                        other => {
                            self.defer(RestError::validation(format!(
                                "every row must be a JSON object, got {other}"
                            )));
                            return Vec::new();
                        }
                    }
                }
                rows
            }
            Value::Null if self.deferred.is_some() => Vec::new(),
            other => {
                self.defer(RestError::validation(format!(
                    "payload must be an object or an array of objects, got {other}"
                )));
                Vec::new()
            }
        }
    }

    // ==================== Shaping ====================

    /// Choose the columns to return. On a mutation this sets the RETURNING projection.
    pub fn select(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    /// [`select`](Self::select) with a count mode and head mode.
    pub fn select_with(mut self, columns: &str, options: SelectOptions) -> Self {
        self.columns = Some(columns.to_string());
        self.count = options.count;
        self.head = options.head;
        self
    }

    /// Insert one object or an array of objects.
    pub fn insert(mut self, values: impl Serialize) -> Self {
        let rows = self.payload_rows(values);
        self.action = Action::Insert(rows);
        self
    }

    /// Insert, resolving conflicts on `options.on_conflict`.
    pub fn upsert(mut self, values: impl Serialize, options: UpsertOptions) -> Self {
        let rows = self.payload_rows(values);
        self.action = Action::Upsert(rows, options);
        self
    }

    /// Update every row matching the filters with the keys of `patch`.
    pub fn update(mut self, patch: impl Serialize) -> Self {
        let patch = match self.json(patch) {
            Value::Object(patch) => patch,
            other => {
                if self.deferred.is_none() {
                    self.defer(RestError::validation(format!(
                        "update patch must be a JSON object, got {other}"
                    )));
                }
                JsonRow::new()
            }
        };
        self.action = Action::Update(patch);
        self
    }

    /// Delete every row matching the filters.
    pub fn delete(mut self) -> Self {
        self.action = Action::Delete;
        self
    }

    /// Count matching rows (or affected rows, for a mutation).
    pub fn count(mut self, count: Count) -> Self {
        self.count = Some(count);
        self
    }

    // ==================== Filters ====================

    fn push(mut self, column: &str, op: FilterOp, value: impl Serialize) -> Self {
        let value = self.json(value);
        self.filters.push(Filter::new(column, op, value));
        self
    }

    /// `column = value`
    pub fn eq(self, column: &str, value: impl Serialize) -> Self {
        self.push(column, FilterOp::Eq, value)
    }

    /// `column != value`
    pub fn neq(self, column: &str, value: impl Serialize) -> Self {
        self.push(column, FilterOp::Neq, value)
    }

    pub fn gt(self, column: &str, value: impl Serialize) -> Self {
        self.push(column, FilterOp::Gt, value)
    }

    pub fn gte(self, column: &str, value: impl Serialize) -> Self {
        self.push(column, FilterOp::Gte, value)
    }

    pub fn lt(self, column: &str, value: impl Serialize) -> Self {
        self.push(column, FilterOp::Lt, value)
    }

    pub fn lte(self, column: &str, value: impl Serialize) -> Self {
        self.push(column, FilterOp::Lte, value)
    }

    /// `column LIKE pattern` (`%` and `_` wildcards).
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.push(column, FilterOp::Like, pattern)
    }

    /// Case-insensitive [`like`](Self::like).
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.push(column, FilterOp::Ilike, pattern)
    }

    /// `column IS NULL | TRUE | FALSE`
    pub fn is(self, column: &str, value: impl Into<IsValue>) -> Self {
        let value: IsValue = value.into();
        self.push(column, FilterOp::Is, Value::from(value))
    }

    /// `column IN (...)`. An empty list matches nothing.
    pub fn in_<T: Serialize>(self, column: &str, values: impl IntoIterator<Item = T>) -> Self {
        let values: Vec<T> = values.into_iter().collect();
        self.push(column, FilterOp::In, values)
    }

    /// `column @> value`, for arrays, ranges and JSON objects.
    pub fn contains(self, column: &str, value: impl Serialize) -> Self {
        self.push(column, FilterOp::Contains, value)
    }

    /// `column <@ value`
    pub fn contained_by(self, column: &str, value: impl Serialize) -> Self {
        self.push(column, FilterOp::ContainedBy, value)
    }

    /// `column && value`. An empty array matches nothing.
    pub fn overlaps(self, column: &str, value: impl Serialize) -> Self {
        self.push(column, FilterOp::Overlaps, value)
    }

    /// Full-text search on a tsvector column.
    pub fn text_search(self, column: &str, query: &str, options: TextSearchOptions) -> Self {
        let op = FilterOp::TextSearch {
            kind: options.kind,
            config: options.config,
        };
        self.push(column, op, query)
    }

    /// One `eq` per key of `query`, in key order.
    pub fn match_(mut self, query: impl Serialize) -> Self {
        match self.json(query) {
            Value::Object(map) => {
                for (column, value) in map {
                    self.filters.push(Filter::new(column, FilterOp::Eq, value));
                }
            }
            Value::Null if self.deferred.is_some() => {}
            other => self.defer(RestError::validation(format!(
                "match_ expects a JSON object, got {other}"
            ))),
        }
        self
    }

    /// Negate a filter given by operator name (`eq`, `in`, `is`, `cs`, ...).
    pub fn not(mut self, column: &str, op: &str, value: impl Serialize) -> Self {
        let value = self.json(value);
        self.filters.push_not(column, op, value);
        self
    }

    /// OR together filters written in the compact grammar:
    /// `"status.eq.active,and(age.gte.18,age.lt.65)"`.
    pub fn or(mut self, filters: &str) -> Self {
        self.filters.push_or(filters);
        self
    }

    /// Add a filter by PostgREST operator name. `not.` prefixes negate.
    pub fn filter(mut self, column: &str, op: &str, value: impl Serialize) -> Self {
        if let Some(op) = op.strip_prefix("not.") {
            return self.not(column, op, value);
        }
        let Some(parsed) = FilterOp::parse(op) else {
            self.defer(RestError::validation(format!("unknown filter operator '{op}'")));
            return self;
        };
        let value = match self.json(value) {
            Value::String(raw) => match crate::filter::or_parse::parse_operand(&parsed, &raw) {
                Ok(value) => value,
                Err(e) => {
                    self.defer(e);
                    return self;
                }
            },
            other => other,
        };
        self.filters.push(Filter::new(column, parsed, value));
        self
    }

    // ==================== Ordering & paging ====================

    /// Append an ORDER BY term. Terms apply in call order.
    pub fn order(mut self, column: &str, options: OrderOptions) -> Self {
        self.orders.push(OrderClause {
            column: column.to_string(),
            ascending: options.ascending,
            nulls_first: options.nulls_first,
            foreign_table: options.foreign_table,
        });
        self
    }

    /// Limit the number of rows. Ignored when [`range`](Self::range) is set.
    pub fn limit(mut self, count: u64) -> Self {
        if count > MAX_ROWS {
            self.defer(RestError::validation(format!(
                "limit {count} exceeds {MAX_ROWS}"
            )));
        }
        self.limit = Some(count);
        self
    }

    /// Rows `from..=to`, zero-based.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        if to < from {
            self.defer(RestError::validation(format!(
                "invalid range {from}..={to}: end is before start"
            )));
        } else if from > MAX_ROWS || to - from >= MAX_ROWS {
            self.defer(RestError::validation(format!(
                "invalid range {from}..={to}: bounds exceed {MAX_ROWS}"
            )));
        }
        self.range = Some((from, to));
        self
    }

    /// `(limit, offset)` after range precedence.
    pub(crate) fn paging(&self) -> (Option<u64>, Option<u64>) {
        match self.range {
            Some((from, to)) => (Some(to.saturating_sub(from).saturating_add(1)), Some(from)),
            None => (self.limit, None),
        }
    }

    fn main_orders(&self) -> Vec<&OrderClause> {
        self.orders
            .iter()
            .filter(|o| o.foreign_table.is_none())
            .collect()
    }

    fn foreign_orders(&self) -> Vec<OrderClause> {
        self.orders
            .iter()
            .filter(|o| o.foreign_table.is_some())
            .cloned()
            .collect()
    }
}
