//! Dynamic row decoding.
//!
//! Rows are decoded into [`JsonRow`], an insertion-ordered column → value map, so the
//! query builder, join resolver and result reshaping can stay shape-agnostic.

use crate::error::{RestError, RestResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Number, Value};
use std::error::Error;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

/// A decoded row: column name → JSON value, in select-list order.
pub type JsonRow = Map<String, Value>;

/// Decode every column of a row.
pub fn decode_row(row: &Row) -> RestResult<JsonRow> {
    let mut out = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_())
            .map_err(|e| RestError::decode(column.name(), e.to_string()))?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

type DecodeResult = Result<Value, Box<dyn Error + Sync + Send>>;

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>, tokio_postgres::Error> {
    row.try_get::<_, Option<T>>(idx)
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> DecodeResult {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::from),
        Type::OID => get::<u32>(row, idx)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| float_value(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(float_value),
        Type::NUMERIC => get::<Decimal>(row, idx)?.map(decimal_value),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::CHAR => {
            get::<String>(row, idx)?.map(Value::String)
        }
        Type::UUID => get::<Uuid>(row, idx)?.map(|v| Value::String(v.to_string())),
        Type::JSON | Type::JSONB => get::<Value>(row, idx)?,
        Type::DATE => get::<NaiveDate>(row, idx)?.map(|v| Value::String(v.to_string())),
        Type::TIME => get::<NaiveTime>(row, idx)?.map(|v| Value::String(v.to_string())),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(|v| Value::String(v.to_rfc3339())),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(|bytes| Value::String(hex_bytea(&bytes))),
        Type::VOID => None,
        Type::BOOL_ARRAY => array(get::<Vec<Option<bool>>>(row, idx)?, Value::Bool),
        Type::INT2_ARRAY => array(get::<Vec<Option<i16>>>(row, idx)?, Value::from),
        Type::INT4_ARRAY => array(get::<Vec<Option<i32>>>(row, idx)?, Value::from),
        Type::INT8_ARRAY => array(get::<Vec<Option<i64>>>(row, idx)?, Value::from),
        Type::FLOAT8_ARRAY => array(get::<Vec<Option<f64>>>(row, idx)?, float_value),
        Type::NUMERIC_ARRAY => array(get::<Vec<Option<Decimal>>>(row, idx)?, decimal_value),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY | Type::NAME_ARRAY => {
            array(get::<Vec<Option<String>>>(row, idx)?, Value::String)
        }
        Type::UUID_ARRAY => array(get::<Vec<Option<Uuid>>>(row, idx)?, |v| {
            Value::String(v.to_string())
        }),
        Type::JSON_ARRAY | Type::JSONB_ARRAY => array(get::<Vec<Option<Value>>>(row, idx)?, |v| v),
        Type::TIMESTAMPTZ_ARRAY => array(get::<Vec<Option<DateTime<Utc>>>>(row, idx)?, |v| {
            Value::String(v.to_rfc3339())
        }),
        _ => match ty.kind() {
            Kind::Enum(_) | Kind::Domain(_) => {
                get::<LossyText>(row, idx)?.map(|t| Value::String(t.0))
            }
            Kind::Array(inner) if matches!(inner.kind(), Kind::Enum(_)) => {
                array(get::<Vec<Option<LossyText>>>(row, idx)?, |t| Value::String(t.0))
            }
            _ => {
                tracing::warn!(
                    target: "pgrest.row",
                    column = row.columns()[idx].name(),
                    pg_type = %ty,
                    "unsupported column type, decoding as text"
                );
                get::<LossyText>(row, idx)?.map(|t| Value::String(t.0))
            }
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

fn array<T>(items: Option<Vec<Option<T>>>, f: impl Fn(T) -> Value) -> Option<Value> {
    items.map(|items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| item.map(&f).unwrap_or(Value::Null))
                .collect(),
        )
    })
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

/// Integral decimals become JSON integers, others floats; values that do not fit stay strings.
fn decimal_value(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Value::from(i);
        }
    }
    d.to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(d.to_string()))
}

fn hex_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Reads the raw wire bytes as UTF-8. Exact for enums and domains over text.
struct LossyText(String);

impl<'a> FromSql<'a> for LossyText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(LossyText(String::from_utf8_lossy(raw).into_owned()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn decimals_prefer_integers() {
        assert_eq!(decimal_value(Decimal::from_str("42").unwrap()), Value::from(42));
        assert_eq!(
            decimal_value(Decimal::from_str("1.5").unwrap()),
            serde_json::json!(1.5)
        );
    }

    #[test]
    fn non_finite_floats_become_strings() {
        assert_eq!(float_value(f64::NAN), Value::String("NaN".into()));
        assert_eq!(float_value(2.0), serde_json::json!(2.0));
    }

    #[test]
    fn bytea_hex_format() {
        assert_eq!(hex_bytea(&[0xde, 0xad, 0x01]), "\\xdead01");
    }

    #[test]
    fn arrays_keep_nulls() {
        let v = array(Some(vec![Some(1i32), None]), Value::from);
        assert_eq!(v, Some(serde_json::json!([1, null])));
    }
}
