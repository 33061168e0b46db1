//! Safe SQL identifier handling.
//!
//! Every table and column name that reaches generated SQL goes through [`Ident`].
//!
//! - Unquoted parts are validated against: `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts allow any characters except NUL
//! - Rendering always double-quotes each part and escapes `"` as `""`, so names are
//!   case-preserving and reserved words (`order`, `user`) are safe to use
//!
//! # Example
//! ```ignore
//! use pgrest::Ident;
//!
//! let t = Ident::parse("public.users")?;
//! assert_eq!(t.to_sql(), r#""public"."users""#);
//! # Ok::<(), pgrest::RestError>(())
//! ```

use crate::error::{RestError, RestResult};

/// A SQL identifier (column, table, or schema name), possibly dotted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<String>,
}

impl Ident {
    /// Parse an identifier string, supporting dotted and quoted forms.
    ///
    /// - Dotted: `schema.table.column`
    /// - Quoted: `"CamelCase"."UserTable"`
    /// - Mixed: `public."UserTable".id`
    pub fn parse(s: &str) -> RestResult<Self> {
        if s.is_empty() {
            return Err(RestError::validation("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(RestError::validation(
                "Identifier cannot contain NUL character",
            ));
        }

        let mut parts = Vec::new();
        let mut rest = s;
        loop {
            let (part, tail) = match rest.strip_prefix('"') {
                Some(quoted) => quoted_part(quoted, s)?,
                None => bare_part(rest, s)?,
            };
            parts.push(part);

            match tail.strip_prefix('.') {
                Some("") => {
                    return Err(RestError::validation(format!(
                        "Trailing '.' in identifier '{s}'"
                    )));
                }
                Some(next) => rest = next,
                None if tail.is_empty() => break,
                None => {
                    return Err(RestError::validation(format!(
                        "Expected '.' after identifier part in '{s}'"
                    )));
                }
            }
        }

        Ok(Self { parts })
    }

    /// Last part of the identifier (the bare column or table name).
    pub fn name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::with_capacity(self.parts.iter().map(|p| p.len() + 3).sum());
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push('"');
            for ch in part.chars() {
                if ch == '"' {
                    out.push('"');
                }
                out.push(ch);
            }
            out.push('"');
        }
    }
}

/// Read one `"..."` part (opening quote already consumed). `""` is an escaped quote.
fn quoted_part<'a>(input: &'a str, whole: &str) -> RestResult<(String, &'a str)> {
    let mut name = String::new();
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '"' {
            name.push(c);
            continue;
        }
        if matches!(chars.peek(), Some((_, '"'))) {
            chars.next();
            name.push('"');
            continue;
        }
        if name.is_empty() {
            return Err(RestError::validation("Empty quoted identifier"));
        }
        return Ok((name, &input[i + 1..]));
    }
    Err(RestError::validation(format!(
        "Unclosed quoted identifier in '{whole}'"
    )))
}

/// Read one unquoted part up to the next `.`.
fn bare_part<'a>(input: &'a str, whole: &str) -> RestResult<(String, &'a str)> {
    let end = input.find('.').unwrap_or(input.len());
    let name = &input[..end];
    let mut chars = name.chars();
    match chars.next() {
        None => {
            return Err(RestError::validation(format!(
                "Empty identifier segment in '{whole}'"
            )));
        }
        Some(first) if !(first == '_' || first.is_ascii_alphabetic()) => {
            return Err(RestError::validation(format!(
                "Invalid character '{first}' in identifier '{whole}'"
            )));
        }
        Some(_) => {}
    }
    if let Some(bad) = chars.find(|c| !(*c == '_' || *c == '$' || c.is_ascii_alphanumeric())) {
        return Err(RestError::validation(format!(
            "Invalid character '{bad}' in identifier '{whole}'"
        )));
    }
    Ok((name.to_string(), &input[end..]))
}

/// Validate and quote a single identifier.
pub fn quote_ident(name: &str) -> RestResult<String> {
    Ident::parse(name).map(|i| i.to_sql())
}

/// Build a comma-separated list of quoted column names.
pub fn column_list<S: AsRef<str>>(columns: &[S]) -> RestResult<String> {
    let mut out = String::new();
    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        Ident::parse(col.as_ref())?.write_sql(&mut out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_simple() {
        let ident = Ident::parse("users").unwrap();
        assert_eq!(ident.to_sql(), r#""users""#);
    }

    #[test]
    fn ident_dotted() {
        let ident = Ident::parse("public.users").unwrap();
        assert_eq!(ident.to_sql(), r#""public"."users""#);
        assert_eq!(ident.name(), "users");
    }

    #[test]
    fn ident_quoted_with_escape() {
        let ident = Ident::parse(r#""has""quote""#).unwrap();
        assert_eq!(ident.parts, vec![r#"has"quote"#.to_string()]);
        assert_eq!(ident.to_sql(), r#""has""quote""#);
    }

    #[test]
    fn ident_reserved_word_is_quoted() {
        assert_eq!(quote_ident("order").unwrap(), r#""order""#);
    }

    #[test]
    fn ident_rejects_injection() {
        assert!(Ident::parse("id; DROP TABLE users").is_err());
        assert!(Ident::parse("name--").is_err());
        assert!(Ident::parse("1table").is_err());
        assert!(Ident::parse("").is_err());
        assert!(Ident::parse("schema..table").is_err());
        assert!(Ident::parse("schema.").is_err());
        assert!(Ident::parse(r#""unclosed"#).is_err());
    }

    #[test]
    fn column_list_quotes_each() {
        assert_eq!(
            column_list(&["id", "user_name"]).unwrap(),
            r#""id", "user_name""#
        );
        assert!(column_list(&["id", "bad name"]).is_err());
    }
}
