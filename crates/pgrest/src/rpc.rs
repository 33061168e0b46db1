//! Stored-function calls.

use crate::builder::Statement;
use crate::error::{RestError, RestResult};
use crate::filter::param::ParamList;
use crate::ident::{Ident, quote_ident};
use crate::row::JsonRow;
use crate::value::{SqlValue, is_json_shaped};
use serde_json::Value;

/// `SELECT * FROM "fn"("a" => $1, ...)` with named arguments in key order.
pub(crate) fn rpc_statement(function: &str, args: &JsonRow) -> RestResult<Statement> {
    let function = Ident::parse(function)
        .map_err(|e| RestError::validation(format!("invalid function name '{function}': {e}")))?
        .to_sql();
    let mut params = ParamList::new();
    let mut named = Vec::with_capacity(args.len());
    for (name, value) in args {
        let idx = params.push(SqlValue(value.clone()));
        let cast = if is_json_shaped(value) { "::jsonb" } else { "" };
        named.push(format!("{} => ${idx}{cast}", quote_ident(name)?));
    }
    Ok(Statement {
        sql: format!("SELECT * FROM {function}({})", named.join(", ")),
        params: params.into_vec(),
    })
}

/// Arguments must serialize to an object (or null / unit for none).
pub(crate) fn rpc_args(args: Value) -> RestResult<JsonRow> {
    match args {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(JsonRow::new()),
        other => Err(RestError::validation(format!(
            "function arguments must be a JSON object, got {other}"
        ))),
    }
}

/// Shape function output: a single-column result becomes a scalar (one row) or an array of
/// scalars; anything else is an array of objects.
pub(crate) fn unwrap_rows(rows: Vec<JsonRow>) -> Value {
    let single_column = !rows.is_empty() && rows.iter().all(|r| r.len() == 1);
    if !single_column {
        return Value::Array(rows.into_iter().map(Value::Object).collect());
    }
    let mut scalars: Vec<Value> = rows
        .into_iter()
        .filter_map(|row| row.into_iter().next().map(|(_, v)| v))
        .collect();
    if scalars.len() == 1 {
        scalars.remove(0)
    } else {
        Value::Array(scalars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::row;
    use serde_json::json;

    #[test]
    fn named_arguments() {
        let args = rpc_args(json!({"player_id": 7, "filters": {"genre": "rpg"}})).unwrap();
        let stmt = rpc_statement("top_games", &args).unwrap();
        assert_eq!(
            stmt.sql,
            r#"SELECT * FROM "top_games"("player_id" => $1, "filters" => $2::jsonb)"#
        );
        assert_eq!(stmt.params.len(), 2);

        let none = rpc_statement("api.refresh", &rpc_args(Value::Null).unwrap()).unwrap();
        assert_eq!(none.sql, r#"SELECT * FROM "api"."refresh"()"#);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(rpc_args(json!([1, 2])).is_err());
        assert!(rpc_statement("drop table x;--", &JsonRow::new()).is_err());
    }

    #[test]
    fn unwraps_single_column_results() {
        assert_eq!(unwrap_rows(vec![row(json!({"add": 5}))]), json!(5));
        assert_eq!(
            unwrap_rows(vec![row(json!({"n": 1})), row(json!({"n": 2}))]),
            json!([1, 2])
        );
        assert_eq!(unwrap_rows(vec![row(json!({"reset": null}))]), Value::Null);
        assert_eq!(unwrap_rows(Vec::new()), json!([]));
        assert_eq!(
            unwrap_rows(vec![row(json!({"id": 1, "title": "Hades"}))]),
            json!([{"id": 1, "title": "Hades"}])
        );
    }
}
