//! Statement parameters.
//!
//! Every bound value is a [`serde_json::Value`] wrapped in [`SqlValue`]. Parameters are sent
//! in Postgres text format and the server infers their types from context, so a single
//! representation works for integer, text, uuid, timestamp, array and jsonb columns alike.

use bytes::BytesMut;
use serde_json::Value;
use std::error::Error;
use tokio_postgres::types::{Format, IsNull, Kind, ToSql, Type};

/// A JSON value bound as a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlValue(pub Value);

impl SqlValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn null() -> Self {
        Self(Value::Null)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Whether the value is bound with an explicit `::jsonb` cast in INSERT/UPDATE payloads.
    pub fn is_json_shaped(&self) -> bool {
        is_json_shaped(&self.0)
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// JSON objects are stored as `jsonb`; arrays, scalars and null are bound as-is.
pub fn is_json_shaped(value: &Value) -> bool {
    value.is_object()
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if self.0.is_null() {
            return Ok(IsNull::Yes);
        }
        if *ty == Type::JSON || *ty == Type::JSONB {
            out.extend_from_slice(&serde_json::to_vec(&self.0)?);
        } else if matches!(ty.kind(), Kind::Array(_)) {
            match &self.0 {
                Value::String(literal) => out.extend_from_slice(literal.as_bytes()),
                other => {
                    let mut literal = String::new();
                    write_array_literal(other, &mut literal);
                    out.extend_from_slice(literal.as_bytes());
                }
            }
        } else {
            out.extend_from_slice(scalar_text(&self.0).as_bytes());
        }
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    tokio_postgres::types::to_sql_checked!();
}

/// Text form of a scalar parameter. Objects and arrays fall back to JSON text.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a JSON array as a Postgres array literal, e.g. `{"a","b c",NULL}`.
pub(crate) fn write_array_literal(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('{');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                match item {
                    Value::Null => out.push_str("NULL"),
                    Value::Array(_) => write_array_literal(item, out),
                    Value::Bool(_) | Value::Number(_) => out.push_str(&scalar_text(item)),
                    Value::String(s) => push_quoted_element(s, out),
                    Value::Object(_) => push_quoted_element(&item.to_string(), out),
                }
            }
            out.push('}');
        }
        Value::Null => out.push_str("NULL"),
        other => {
            out.push('{');
            push_quoted_element(&scalar_text(other), out);
            out.push('}');
        }
    }
}

fn push_quoted_element(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: Value, ty: &Type) -> Option<String> {
        let mut buf = BytesMut::new();
        match SqlValue(value).to_sql(ty, &mut buf).unwrap() {
            IsNull::Yes => None,
            IsNull::No => Some(String::from_utf8(buf.to_vec()).unwrap()),
        }
    }

    #[test]
    fn scalars_encode_as_text() {
        assert_eq!(encode(json!(42), &Type::INT4).as_deref(), Some("42"));
        assert_eq!(encode(json!(true), &Type::BOOL).as_deref(), Some("true"));
        assert_eq!(encode(json!("abc"), &Type::TEXT).as_deref(), Some("abc"));
        assert_eq!(encode(Value::Null, &Type::TEXT), None);
    }

    #[test]
    fn jsonb_target_gets_json_text() {
        assert_eq!(
            encode(json!({"a": 1}), &Type::JSONB).as_deref(),
            Some(r#"{"a":1}"#)
        );
        assert_eq!(encode(json!("x"), &Type::JSONB).as_deref(), Some(r#""x""#));
    }

    #[test]
    fn array_target_gets_array_literal() {
        assert_eq!(
            encode(json!(["a", "b \"c\"", null]), &Type::TEXT_ARRAY).as_deref(),
            Some(r#"{"a","b \"c\"",NULL}"#)
        );
        assert_eq!(
            encode(json!([1, 2]), &Type::INT4_ARRAY).as_deref(),
            Some("{1,2}")
        );
        assert_eq!(
            encode(json!("{x,y}"), &Type::TEXT_ARRAY).as_deref(),
            Some("{x,y}")
        );
    }

    #[test]
    fn only_objects_are_json_shaped() {
        assert!(is_json_shaped(&json!({"a": 1})));
        assert!(!is_json_shaped(&json!([1])));
        assert!(!is_json_shaped(&Value::Null));
        assert!(!is_json_shaped(&json!("2024-01-01T00:00:00Z")));
    }
}
