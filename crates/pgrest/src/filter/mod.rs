//! Filter accumulation and WHERE-clause compilation.
//!
//! Filters are collected in three ordered lists (plain filters, `or()` groups and `not()`
//! filters) and compiled into one predicate. Parameter numbering is continuous across all
//! three and can start after parameters emitted earlier in the statement.

pub mod expr;
pub(crate) mod or_parse;
pub mod param;


use crate::error::{RestError, RestResult};
use crate::ident::quote_ident;
use crate::value::SqlValue;
use expr::Expr;
use param::ParamList;
use serde_json::Value;

/// Full-text search query parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSearchType {
    /// `plainto_tsquery`
    #[default]
    Plain,
    /// `phraseto_tsquery`
    Phrase,
    /// `websearch_to_tsquery`
    Websearch,
    /// `to_tsquery`, raw tsquery syntax (`fts` in the filter grammar)
    Raw,
}

impl TextSearchType {
    fn function(self) -> &'static str {
        match self {
            TextSearchType::Plain => "plainto_tsquery",
            TextSearchType::Phrase => "phraseto_tsquery",
            TextSearchType::Websearch => "websearch_to_tsquery",
            TextSearchType::Raw => "to_tsquery",
        }
    }
}

/// Options for [`QueryBuilder::text_search`](crate::QueryBuilder::text_search).
#[derive(Debug, Clone, Default)]
pub struct TextSearchOptions {
    pub kind: TextSearchType,
    /// Text search configuration; the client default (usually `english`) when `None`.
    pub config: Option<String>,
}

impl TextSearchOptions {
    pub fn websearch() -> Self {
        Self {
            kind: TextSearchType::Websearch,
            config: None,
        }
    }

    pub fn phrase() -> Self {
        Self {
            kind: TextSearchType::Phrase,
            config: None,
        }
    }

    pub fn config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }
}

/// Filter operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Is,
    In,
    Contains,
    ContainedBy,
    Overlaps,
    TextSearch {
        kind: TextSearchType,
        config: Option<String>,
    },
}

impl FilterOp {
    /// Parse an operator name. Accepts the method names (`containedBy`, `textSearch`) and the
    /// PostgREST abbreviations (`cs`, `cd`, `ov`, `fts`, `plfts`, `phfts`, `wfts`), the
    /// latter optionally followed by `(config)`.
    pub fn parse(name: &str) -> Option<Self> {
        let (base, config) = match name.split_once('(') {
            Some((base, rest)) => (base, Some(rest.strip_suffix(')')?.to_string())),
            None => (name, None),
        };
        let text_search = |kind| FilterOp::TextSearch {
            kind,
            config: config.clone(),
        };
        let op = match base {
            "fts" => text_search(TextSearchType::Raw),
            "plfts" | "textSearch" | "text_search" => text_search(TextSearchType::Plain),
            "phfts" => text_search(TextSearchType::Phrase),
            "wfts" => text_search(TextSearchType::Websearch),
            _ if config.is_some() => return None,
            "eq" => FilterOp::Eq,
            "neq" => FilterOp::Neq,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "like" => FilterOp::Like,
            "ilike" => FilterOp::Ilike,
            "is" => FilterOp::Is,
            "in" => FilterOp::In,
            "cs" | "contains" => FilterOp::Contains,
            "cd" | "containedBy" | "contained_by" => FilterOp::ContainedBy,
            "ov" | "overlaps" => FilterOp::Overlaps,
            _ => return None,
        };
        Some(op)
    }
}

/// Value accepted by `is()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsValue {
    Null,
    True,
    False,
}

impl From<bool> for IsValue {
    fn from(b: bool) -> Self {
        if b { IsValue::True } else { IsValue::False }
    }
}

impl From<Option<bool>> for IsValue {
    fn from(b: Option<bool>) -> Self {
        b.map_or(IsValue::Null, IsValue::from)
    }
}

impl From<IsValue> for Value {
    fn from(v: IsValue) -> Self {
        match v {
            IsValue::Null => Value::Null,
            IsValue::True => Value::Bool(true),
            IsValue::False => Value::Bool(false),
        }
    }
}

/// One accumulated filter: `{op, column, value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    fn quoted_column(&self) -> RestResult<String> {
        quote_ident(&self.column).map_err(|e| {
            RestError::validation(format!("invalid filter column '{}': {e}", self.column))
        })
    }

    /// Compile to a predicate.
    pub(crate) fn to_expr(&self, ts_config: &str) -> RestResult<Expr> {
        let column = self.quoted_column()?;
        let value = || SqlValue(self.value.clone());
        Ok(match &self.op {
            FilterOp::Eq => Expr::compare(column, "=", value()),
            FilterOp::Neq => Expr::compare(column, "!=", value()),
            FilterOp::Gt => Expr::compare(column, ">", value()),
            FilterOp::Gte => Expr::compare(column, ">=", value()),
            FilterOp::Lt => Expr::compare(column, "<", value()),
            FilterOp::Lte => Expr::compare(column, "<=", value()),
            FilterOp::Like => Expr::compare(column, "LIKE", value()),
            FilterOp::Ilike => Expr::compare(column, "ILIKE", value()),
            FilterOp::Is => Expr::Is {
                column,
                keyword: is_keyword(&self.value)?,
                negated: false,
            },
            FilterOp::In => Expr::in_list(column, self.list_values()?),
            FilterOp::Contains => self.containment(column, "@>"),
            FilterOp::ContainedBy if is_empty_array(&self.value) => Expr::False,
            FilterOp::ContainedBy => self.containment(column, "<@"),
            FilterOp::Overlaps if is_empty_array(&self.value) => Expr::False,
            FilterOp::Overlaps => Expr::compare(column, "&&", value()),
            FilterOp::TextSearch { kind, config } => Expr::TextSearch {
                column,
                function: kind.function(),
                config: config.clone().unwrap_or_else(|| ts_config.to_string()),
                query: value(),
            },
        })
    }

    /// Compile the negation: `eq` → `!=`, `is` → `IS NOT`, `in` → `NOT IN`,
    /// `like` → `NOT LIKE`; everything else is wrapped in `NOT (...)`.
    pub(crate) fn to_negated_expr(&self, ts_config: &str) -> RestResult<Expr> {
        let column = self.quoted_column()?;
        let value = || SqlValue(self.value.clone());
        Ok(match &self.op {
            FilterOp::Eq => Expr::compare(column, "!=", value()),
            FilterOp::Neq => Expr::compare(column, "=", value()),
            FilterOp::Like => Expr::compare(column, "NOT LIKE", value()),
            FilterOp::Ilike => Expr::compare(column, "NOT ILIKE", value()),
            FilterOp::Is => Expr::Is {
                column,
                keyword: is_keyword(&self.value)?,
                negated: true,
            },
            FilterOp::In => Expr::not_in(column, self.list_values()?),
            _ => Expr::not(self.to_expr(ts_config)?),
        })
    }

    fn list_values(&self) -> RestResult<Vec<SqlValue>> {
        match &self.value {
            Value::Array(items) => Ok(items.iter().cloned().map(SqlValue).collect()),
            Value::String(s) if s.starts_with('(') => {
                match or_parse::parse_operand(&FilterOp::In, s)? {
                    Value::Array(items) => Ok(items.into_iter().map(SqlValue).collect()),
                    other => Ok(vec![SqlValue(other)]),
                }
            }
            other => Ok(vec![SqlValue(other.clone())]),
        }
    }

    fn containment(&self, column: String, op: &'static str) -> Expr {
        Expr::Compare {
            column,
            op,
            value: SqlValue(self.value.clone()),
            cast: self.value.is_object().then_some("jsonb"),
        }
    }
}

fn is_empty_array(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.is_empty())
}

fn is_keyword(value: &Value) -> RestResult<&'static str> {
    match value {
        Value::Null => Ok("NULL"),
        Value::Bool(true) => Ok("TRUE"),
        Value::Bool(false) => Ok("FALSE"),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "null" => Ok("NULL"),
            "true" => Ok("TRUE"),
            "false" => Ok("FALSE"),
            "unknown" => Ok("UNKNOWN"),
            _ => Err(RestError::validation(format!(
                "'is' expects null, true or false, got '{s}'"
            ))),
        },
        other => Err(RestError::validation(format!(
            "'is' expects null, true or false, got {other}"
        ))),
    }
}

/// A `not()` filter. Unknown operators fall back to `NOT (column = value)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NotFilter {
    Known(Filter),
    Fallback(Filter),
}

/// Compiled WHERE predicate (without the `WHERE` keyword).
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    /// Empty when there are no filters.
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub next_index: usize,
}

/// Ordered filter lists of one builder.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
    or_groups: Vec<String>,
    not_filters: Vec<NotFilter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.or_groups.is_empty() && self.not_filters.is_empty()
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Add an `or()` group in the compact grammar. Parsed when the statement is built.
    pub fn push_or(&mut self, raw: impl Into<String>) {
        self.or_groups.push(raw.into());
    }

    /// Add a negated filter by operator name.
    pub fn push_not(&mut self, column: impl Into<String>, op: &str, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match FilterOp::parse(op) {
            Some(op) => {
                let value = match value {
                    Value::String(raw) => {
                        or_parse::parse_operand(&op, &raw).unwrap_or(Value::String(raw))
                    }
                    other => other,
                };
                self.not_filters
                    .push(NotFilter::Known(Filter { column, op, value }));
            }
            None => {
                tracing::warn!(
                    target: "pgrest.filter",
                    op,
                    column = %column,
                    "unknown operator in not(), falling back to NOT (column = value)"
                );
                self.not_filters
                    .push(NotFilter::Fallback(Filter::new(column, FilterOp::Eq, value)));
            }
        }
    }

    /// Combine everything into one AND-ed predicate.
    pub(crate) fn to_expr(&self, ts_config: &str) -> RestResult<Expr> {
        let mut parts = Vec::with_capacity(
            self.filters.len() + self.or_groups.len() + self.not_filters.len(),
        );
        for filter in &self.filters {
            parts.push(filter.to_expr(ts_config)?);
        }
        for raw in &self.or_groups {
            parts.push(or_parse::parse_or(raw, ts_config)?);
        }
        for not in &self.not_filters {
            parts.push(match not {
                NotFilter::Known(filter) => filter.to_negated_expr(ts_config)?,
                NotFilter::Fallback(filter) => Expr::not(filter.to_expr(ts_config)?),
            });
        }
        Ok(Expr::And(parts))
    }

    /// Compile into `params`, returning the predicate SQL (empty when there are no filters).
    pub(crate) fn build_into(&self, params: &mut ParamList, ts_config: &str) -> RestResult<String> {
        Ok(self.to_expr(ts_config)?.build(params))
    }

    /// Compile with placeholders starting at `$start_index`.
    pub fn build_where(&self, start_index: usize, ts_config: &str) -> RestResult<WhereClause> {
        let mut params = ParamList::starting_at(start_index);
        let sql = self.build_into(&mut params, ts_config)?;
        let next_index = params.next_index();
        Ok(WhereClause {
            sql,
            params: params.into_vec(),
            next_index,
        })
    }
}
