//! Predicate tree for WHERE clauses.
//!
//! `Expr::build()` generates SQL with `$n` placeholders computed at build time from the
//! shared [`ParamList`], so numbering is continuous no matter how the tree is nested.
//! Column names stored in the tree are already validated and quoted.

use super::param::ParamList;
use crate::value::SqlValue;

/// Expression node for building WHERE clauses.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// AND group: all conditions must be true.
    And(Vec<Expr>),

    /// OR group: at least one condition must be true.
    Or(Vec<Expr>),

    /// NOT: negate the inner expression.
    Not(Box<Expr>),

    /// `column op $n[::cast]`
    Compare {
        column: String,
        op: &'static str,
        value: SqlValue,
        cast: Option<&'static str>,
    },

    /// `column IS [NOT] NULL|TRUE|FALSE|UNKNOWN`
    Is {
        column: String,
        keyword: &'static str,
        negated: bool,
    },

    /// `column [NOT] IN ($1, $2, ...)`
    InList {
        column: String,
        values: Vec<SqlValue>,
        negated: bool,
    },

    /// `column @@ function($n::regconfig, $m)`
    TextSearch {
        column: String,
        function: &'static str,
        config: String,
        query: SqlValue,
    },

    /// Always true (empty NOT IN).
    True,

    /// Always false (empty IN, empty overlap / contained-by).
    False,
}

impl Expr {
    /// Create a NOT expression.
    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    /// Create a plain comparison.
    pub fn compare(column: impl Into<String>, op: &'static str, value: SqlValue) -> Self {
        Expr::Compare {
            column: column.into(),
            op,
            value,
            cast: None,
        }
    }

    /// Create an IN condition. Empty lists never match.
    pub fn in_list(column: impl Into<String>, values: Vec<SqlValue>) -> Self {
        if values.is_empty() {
            return Expr::False;
        }
        Expr::InList {
            column: column.into(),
            values,
            negated: false,
        }
    }

    /// Create a NOT IN condition. Empty lists always match.
    pub fn not_in(column: impl Into<String>, values: Vec<SqlValue>) -> Self {
        if values.is_empty() {
            return Expr::True;
        }
        Expr::InList {
            column: column.into(),
            values,
            negated: true,
        }
    }

    /// Check if this expression is empty (contains no conditions).
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().all(|e| e.is_empty()),
            Expr::Not(inner) => inner.is_empty(),
            _ => false,
        }
    }

    /// Build the SQL fragment, pushing parameters into `params`.
    pub fn build(&self, params: &mut ParamList) -> String {
        match self {
            Expr::And(exprs) => build_group(exprs, " AND ", params),
            Expr::Or(exprs) => build_group(exprs, " OR ", params),
            Expr::Not(inner) => {
                let sql = inner.build(params);
                if sql.is_empty() {
                    String::new()
                } else {
                    format!("NOT ({sql})")
                }
            }
            Expr::Compare {
                column,
                op,
                value,
                cast,
            } => {
                let idx = params.push(value.clone());
                match cast {
                    Some(cast) => format!("{column} {op} ${idx}::{cast}"),
                    None => format!("{column} {op} ${idx}"),
                }
            }
            Expr::Is {
                column,
                keyword,
                negated,
            } => {
                if *negated {
                    format!("{column} IS NOT {keyword}")
                } else {
                    format!("{column} IS {keyword}")
                }
            }
            Expr::InList {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return if *negated { "TRUE" } else { "FALSE" }.to_string();
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| format!("${}", params.push(v.clone())))
                    .collect();
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{column} {op} ({})", placeholders.join(", "))
            }
            Expr::TextSearch {
                column,
                function,
                config,
                query,
            } => {
                let cfg = params.push(SqlValue::new(config.as_str()));
                let q = params.push(query.clone());
                format!("{column} @@ {function}(${cfg}::regconfig, ${q})")
            }
            Expr::True => "TRUE".to_string(),
            Expr::False => "FALSE".to_string(),
        }
    }
}

fn build_group(exprs: &[Expr], sep: &str, params: &mut ParamList) -> String {
    let parts: Vec<String> = exprs
        .iter()
        .filter(|e| !e.is_empty())
        .map(|e| {
            let sql = e.build(params);
            // Nested groups of either kind keep their own parentheses.
            if matches!(e, Expr::And(_) | Expr::Or(_)) && !sql.is_empty() {
                format!("({sql})")
            } else {
                sql
            }
        })
        .filter(|s| !s.is_empty())
        .collect();
    parts.join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> String {
        format!("\"{name}\"")
    }

    #[test]
    fn nested_and_or() {
        let expr = Expr::And(vec![
            Expr::compare(col("status"), "=", SqlValue::new("active")),
            Expr::Or(vec![
                Expr::compare(col("role"), "=", SqlValue::new("admin")),
                Expr::compare(col("role"), "=", SqlValue::new("owner")),
            ]),
        ]);
        let mut params = ParamList::new();
        assert_eq!(
            expr.build(&mut params),
            r#""status" = $1 AND ("role" = $2 OR "role" = $3)"#
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn empty_lists_short_circuit() {
        let mut params = ParamList::new();
        assert_eq!(Expr::in_list(col("id"), vec![]).build(&mut params), "FALSE");
        assert_eq!(Expr::not_in(col("id"), vec![]).build(&mut params), "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn in_list_numbers_each_value() {
        let mut params = ParamList::starting_at(4);
        let sql = Expr::in_list(col("id"), vec![SqlValue::new(1), SqlValue::new(2)])
            .build(&mut params);
        assert_eq!(sql, r#""id" IN ($4, $5)"#);
    }

    #[test]
    fn casts_and_text_search() {
        let mut params = ParamList::new();
        let contains = Expr::Compare {
            column: col("meta"),
            op: "@>",
            value: SqlValue::new(serde_json::json!({"a": 1})),
            cast: Some("jsonb"),
        };
        assert_eq!(contains.build(&mut params), r#""meta" @> $1::jsonb"#);

        let fts = Expr::TextSearch {
            column: col("body"),
            function: "websearch_to_tsquery",
            config: "english".into(),
            query: SqlValue::new("cat -dog"),
        };
        assert_eq!(
            fts.build(&mut params),
            r#""body" @@ websearch_to_tsquery($2::regconfig, $3)"#
        );
    }

    #[test]
    fn not_wraps_and_empty_groups_vanish() {
        let mut params = ParamList::new();
        let expr = Expr::not(Expr::Is {
            column: col("deleted_at"),
            keyword: "NULL",
            negated: false,
        });
        assert_eq!(expr.build(&mut params), r#"NOT ("deleted_at" IS NULL)"#);
        assert_eq!(Expr::And(vec![Expr::Or(vec![])]).build(&mut params), "");
    }
}
