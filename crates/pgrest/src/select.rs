//! Select-expression parsing.
//!
//! A select expression is a comma-separated list of plain columns and relationship
//! references:
//!
//! ```text
//! *, title, author:profiles!posts_author_id_fkey(id, username), comments!inner(*)
//! ```
//!
//! Relationship bodies are kept verbatim in [`JoinRef::columns`] and only parsed when the
//! join resolver descends into them.

use crate::error::{RestError, RestResult};
use crate::ident::Ident;
use std::sync::OnceLock;

/// One relationship reference: `[alias:]table[!hint...](columns)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRef {
    /// Key the related data is attached under. Defaults to `table`.
    pub alias: String,
    pub table: String,
    /// Constraint-name hint (`!posts_author_id_fkey`).
    pub constraint: Option<String>,
    /// `!inner`: drop parent rows without a match.
    pub inner: bool,
    /// Unparsed select expression for the related table.
    pub columns: String,
}

/// A classified top-level token of a select expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectItem {
    Column(String),
    Join(JoinRef),
}

/// Parse result for one select expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSelect {
    /// Plain columns joined with `", "`. Empty when the expression only has joins.
    pub main_columns: String,
    pub joins: Vec<JoinRef>,
}

impl ParsedSelect {
    /// Plain column tokens, in order.
    pub fn column_tokens(&self) -> Vec<&str> {
        split_top_level(&self.main_columns)
    }
}

/// Parse a select expression. Pure: the same input always yields the same result.
pub fn parse_select(select: &str) -> ParsedSelect {
    let trimmed = select.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return ParsedSelect {
            main_columns: "*".to_string(),
            joins: Vec::new(),
        };
    }

    let mut columns = Vec::new();
    let mut joins = Vec::new();
    for item in parse_items(trimmed) {
        match item {
            SelectItem::Column(c) => columns.push(c),
            SelectItem::Join(j) => joins.push(j),
        }
    }
    ParsedSelect {
        main_columns: columns.join(", "),
        joins,
    }
}

/// Classify every top-level token. Malformed relationship syntax becomes a plain column.
pub fn parse_items(select: &str) -> Vec<SelectItem> {
    split_top_level(select)
        .into_iter()
        .map(|token| match parse_join(token) {
            Some(join) => SelectItem::Join(join),
            None => SelectItem::Column(token.to_string()),
        })
        .collect()
}

/// Split on commas outside `()`, `{}`, `[]` and double quotes. Tokens are trimmed and
/// empty tokens dropped.
pub fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth: i32 = 0;
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '(' | '{' | '[' if !in_quotes => depth += 1,
            ')' | '}' | ']' if !in_quotes => depth -= 1,
            ',' if depth == 0 && !in_quotes => {
                push_token(&mut out, &s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push_token(&mut out, &s[start..]);
    out
}

fn push_token<'a>(out: &mut Vec<&'a str>, token: &'a str) {
    let token = token.trim();
    if !token.is_empty() {
        out.push(token);
    }
}

fn join_prefix_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[\w:!]+$").expect("invalid built-in join regex"))
}

fn word_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\w+$").expect("invalid built-in word regex"))
}

fn parse_join(token: &str) -> Option<JoinRef> {
    let open = token.find('(')?;
    if !token.ends_with(')') || !closes_at_end(&token[open..]) {
        return None;
    }
    let prefix = &token[..open];
    if !join_prefix_re().is_match(prefix) {
        return None;
    }

    let (alias, rest) = match prefix.split_once(':') {
        Some((alias, rest)) => (Some(alias), rest),
        None => (None, prefix),
    };
    let mut parts = rest.split('!');
    let table = parts.next()?;
    let alias = alias.unwrap_or(table);
    if !word_re().is_match(table) || !word_re().is_match(alias) {
        return None;
    }

    let mut constraint = None;
    let mut inner = false;
    for suffix in parts.filter(|s| !s.is_empty()) {
        if suffix == "inner" {
            inner = true;
        } else {
            constraint = Some(suffix.to_string());
        }
    }

    let body = token[open + 1..token.len() - 1].trim();
    Some(JoinRef {
        alias: alias.to_string(),
        table: table.to_string(),
        constraint,
        inner,
        columns: if body.is_empty() {
            "*".to_string()
        } else {
            body.to_string()
        },
    })
}

/// `group` starts with `(`; true iff that paren closes exactly at the last char.
fn closes_at_end(group: &str) -> bool {
    let mut depth = 0i32;
    for (i, ch) in group.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == group.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// A plain column rendered for a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnSql {
    pub sql: String,
    /// Key the column appears under in result rows; `None` for `*`.
    pub output: Option<String>,
    /// The output holds the column's stored value under its own name (no rename, no cast).
    pub raw: bool,
}

fn cast_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\w+(\[\])?$").expect("invalid built-in cast regex"))
}

/// Render one plain column token: `*`, `name`, `alias:name`, `name::type`.
pub(crate) fn column_sql(token: &str) -> RestResult<ColumnSql> {
    if token == "*" {
        return Ok(ColumnSql {
            sql: "*".to_string(),
            output: None,
            raw: true,
        });
    }

    let (alias, rest) = match token.split_once(':') {
        Some((alias, rest)) if !rest.starts_with(':') => (Some(alias.trim()), rest.trim()),
        _ => (None, token),
    };
    let (name, cast) = match rest.split_once("::") {
        Some((name, cast)) => (name.trim(), Some(cast.trim())),
        None => (rest, None),
    };

    let ident = Ident::parse(name)
        .map_err(|e| RestError::validation(format!("invalid column '{token}' in select: {e}")))?;
    let mut sql = ident.to_sql();
    if let Some(cast) = cast {
        if !cast_re().is_match(cast) {
            return Err(RestError::validation(format!(
                "invalid cast '{cast}' in select"
            )));
        }
        sql.push_str("::");
        sql.push_str(cast);
    }

    let output = match alias {
        Some(alias) => {
            if !word_re().is_match(alias) {
                return Err(RestError::validation(format!(
                    "invalid column alias '{alias}' in select"
                )));
            }
            alias.to_string()
        }
        None => ident.name().to_string(),
    };
    if alias.is_some() || cast.is_some() || ident.parts.len() > 1 {
        sql.push_str(" AS ");
        Ident {
            parts: vec![output.clone()],
        }
        .write_sql(&mut sql);
    }

    let raw = cast.is_none() && output == ident.name();
    Ok(ColumnSql {
        sql,
        output: Some(output),
        raw,
    })
}
