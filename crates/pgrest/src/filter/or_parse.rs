//! Parser for the compact PostgREST filter grammar used by `or()` and `filter()`.
//!
//! ```text
//! expr   := item ("," item)*
//! item   := ["not."] ("and" | "or") "(" expr ")"
//!         | column "." ["not."] op "." value
//! value  := "(" list ")"        -- in
//!         | "{" list "}"        -- cs / cd / ov array
//!         | json | "quoted" | bare
//! ```
//!
//! Commas inside parentheses, braces and double quotes do not split items.

use super::expr::Expr;
use super::{Filter, FilterOp};
use crate::error::{RestError, RestResult};
use crate::select::split_top_level;
use serde_json::Value;

/// Parse an `or()` expression into an OR group.
pub(crate) fn parse_or(raw: &str, ts_config: &str) -> RestResult<Expr> {
    Ok(Expr::Or(parse_list(raw, ts_config)?))
}

fn parse_list(raw: &str, ts_config: &str) -> RestResult<Vec<Expr>> {
    let items = split_top_level(raw);
    if items.is_empty() {
        return Err(RestError::validation(format!(
            "empty logic tree in filter expression '{raw}'"
        )));
    }
    items
        .into_iter()
        .map(|item| parse_item(item, ts_config))
        .collect()
}

fn parse_item(item: &str, ts_config: &str) -> RestResult<Expr> {
    let (negated, body) = match item.strip_prefix("not.") {
        Some(rest) if rest.starts_with("and(") || rest.starts_with("or(") => (true, rest),
        _ => (false, item),
    };

    let group = if let Some(inner) = group_body(body, "and(") {
        Some(Expr::And(parse_list(inner, ts_config)?))
    } else if let Some(inner) = group_body(body, "or(") {
        Some(Expr::Or(parse_list(inner, ts_config)?))
    } else {
        None
    };
    if let Some(group) = group {
        return Ok(if negated { Expr::not(group) } else { group });
    }

    let (filter, negated) = parse_clause(item)?;
    if negated {
        filter.to_negated_expr(ts_config)
    } else {
        filter.to_expr(ts_config)
    }
}

fn group_body<'a>(s: &'a str, open: &str) -> Option<&'a str> {
    s.strip_prefix(open)?.strip_suffix(')')
}

/// Parse `column.[not.]op.value`.
pub(crate) fn parse_clause(clause: &str) -> RestResult<(Filter, bool)> {
    let malformed = || {
        RestError::validation(format!(
            "malformed filter '{clause}', expected 'column.operator.value'"
        ))
    };
    let (column, rest) = clause.split_once('.').ok_or_else(malformed)?;
    let (negated, rest) = match rest.strip_prefix("not.") {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let (op_name, raw_value) = rest.split_once('.').ok_or_else(malformed)?;
    let op = FilterOp::parse(op_name).ok_or_else(|| {
        RestError::validation(format!("unknown operator '{op_name}' in filter '{clause}'"))
    })?;
    let value = parse_operand(&op, raw_value)?;
    Ok((
        Filter {
            column: column.trim().to_string(),
            op,
            value,
        },
        negated,
    ))
}

/// Convert a grammar-encoded operand into a JSON value for `op`.
pub(crate) fn parse_operand(op: &FilterOp, raw: &str) -> RestResult<Value> {
    let raw = raw.trim();
    match op {
        FilterOp::In => {
            let inner = raw
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(|| {
                    RestError::validation(format!("'in' expects a list like (a,b), got '{raw}'"))
                })?;
            Ok(Value::Array(
                split_top_level(inner)
                    .into_iter()
                    .map(|v| Value::String(unquote(v)))
                    .collect(),
            ))
        }
        FilterOp::Contains | FilterOp::ContainedBy | FilterOp::Overlaps => {
            if raw.starts_with('[') || raw.starts_with("{\"") {
                if let Ok(value) = serde_json::from_str::<Value>(raw) {
                    return Ok(value);
                }
            }
            if let Some(inner) = raw
                .strip_prefix('{')
                .and_then(|r| r.strip_suffix('}'))
                .or_else(|| raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')))
            {
                return Ok(Value::Array(
                    split_top_level(inner)
                        .into_iter()
                        .map(|v| Value::String(unquote(v)))
                        .collect(),
                ));
            }
            Ok(Value::String(unquote(raw)))
        }
        FilterOp::Like | FilterOp::Ilike => Ok(Value::String(unquote(raw).replace('*', "%"))),
        _ => Ok(Value::String(unquote(raw))),
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    match s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => s.to_string(),
    }
}
