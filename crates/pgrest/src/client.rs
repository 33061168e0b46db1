//! The entry point: a client bound to one executor.
//!
//! ```ignore
//! use pgrest::{ClientConfig, RestClient};
//!
//! let client = RestClient::connect(&std::env::var("DATABASE_URL")?)?;
//! let games = client.from("games").select("id, title").eq("genre", "rpg").execute().await;
//! let total = client.rpc("count_games", serde_json::json!({"genre": "rpg"})).await;
//! client.shutdown();
//! ```

use crate::builder::QueryBuilder;
use crate::config::ClientConfig;
use crate::error::RestError;
use crate::executor::{Executor, Runner};
use crate::log::{SqlLogger, StatementKind};
use crate::result::QueryResult;
use crate::row::JsonRow;
use crate::rpc::{rpc_args, rpc_statement, unwrap_rows};
use crate::schema::SchemaCache;
use crate::value::SqlValue;
use serde::Serialize;
use serde_json::Value;

/// Query client over an [`Executor`].
///
/// Cheap to share by reference; every call to [`from`](Self::from) creates an independent
/// builder. The foreign-key schema cache lives as long as the client.
pub struct RestClient<E> {
    exec: E,
    schema: SchemaCache,
    config: ClientConfig,
    logger: SqlLogger,
}

impl<E> RestClient<E> {
    /// Create a client with default configuration.
    pub fn new(exec: E) -> Self {
        Self::with_config(exec, ClientConfig::default())
    }

    pub fn with_config(exec: E, config: ClientConfig) -> Self {
        Self {
            exec,
            schema: SchemaCache::new(),
            logger: SqlLogger::from_config(&config),
            config,
        }
    }

    /// Start a query against `table` (optionally schema-qualified).
    pub fn from(&self, table: &str) -> QueryBuilder<'_, E> {
        QueryBuilder::new(self, table)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying executor.
    pub fn executor(&self) -> &E {
        &self.exec
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schema
    }

    /// Forget the cached foreign-key graph, e.g. after a migration.
    pub fn invalidate_schema_cache(&self) {
        self.schema.invalidate();
    }

    pub fn into_inner(self) -> E {
        self.exec
    }
}

impl<E: Executor> RestClient<E> {
    pub(crate) fn runner(&self) -> Runner<'_, E> {
        Runner::new(&self.exec, &self.config, &self.logger)
    }

    /// Call a stored function with named arguments.
    ///
    /// A single-column result is unwrapped: one row yields the scalar, several rows an
    /// array of scalars. Other results are arrays of objects.
    pub async fn rpc(&self, function: &str, args: impl Serialize) -> QueryResult<Value> {
        let stmt = match serde_json::to_value(args)
            .map_err(RestError::from)
            .and_then(rpc_args)
            .and_then(|args| rpc_statement(function, &args))
        {
            Ok(stmt) => stmt,
            Err(e) => return QueryResult::err(e),
        };
        match self
            .runner()
            .rows(StatementKind::Rpc, &stmt.sql, &stmt.params)
            .await
        {
            Ok(rows) => QueryResult::ok(unwrap_rows(rows)),
            Err(e) => QueryResult::err(e),
        }
    }

    /// Run caller-written SQL with positional parameters (`$1`, `$2`, ...).
    ///
    /// The SQL is passed through untouched; parameters are always bound, never inlined.
    pub async fn raw(&self, sql: &str, params: &[Value]) -> QueryResult<Vec<JsonRow>> {
        let params: Vec<SqlValue> = params.iter().cloned().map(SqlValue).collect();
        match self.runner().rows(StatementKind::Raw, sql, &params).await {
            Ok(rows) => QueryResult::ok(rows),
            Err(e) => QueryResult::err(e),
        }
    }

    /// Run one or more parameterless statements (DDL, scripts).
    pub async fn raw_batch(&self, sql: &str) -> QueryResult<()> {
        match self.runner().batch(sql).await {
            Ok(()) => QueryResult::ok(()),
            Err(e) => QueryResult::err(e),
        }
    }

    /// Release the executor's resources. For a pool this closes it.
    pub fn shutdown(&self) {
        tracing::debug!(target: "pgrest.sql", "shutting down client");
        self.exec.close();
    }
}

#[cfg(feature = "pool")]
impl RestClient<deadpool_postgres::Pool> {
    /// Create a pooled client for `database_url`. Connections are opened lazily.
    pub fn connect(database_url: &str) -> crate::error::RestResult<Self> {
        Ok(Self::new(crate::pool::create_pool(database_url)?))
    }

    pub fn connect_with_config(
        database_url: &str,
        config: ClientConfig,
    ) -> crate::error::RestResult<Self> {
        Ok(Self::with_config(crate::pool::create_pool(database_url)?, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExecutor;
    use serde_json::json;

    #[tokio::test]
    async fn rpc_binds_named_arguments() {
        let exec = MockExecutor::new().with_response("\"add_numbers\"", vec![json!({"add_numbers": 5})]);
        let client = RestClient::new(exec);
        let result = client.rpc("add_numbers", json!({"a": 2, "b": 3})).await;
        assert_eq!(result.data, Some(json!(5)));
        assert!(result.error.is_none());

        let calls = client.executor().calls();
        assert_eq!(
            calls[0].sql,
            r#"SELECT * FROM "add_numbers"("a" => $1, "b" => $2)"#
        );
        assert_eq!(calls[0].params, vec![json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn rpc_errors_land_in_the_envelope() {
        let client = RestClient::new(MockExecutor::new().failing("broken"));
        let result = client.rpc("broken", ()).await;
        assert!(result.data.is_none());
        assert_eq!(result.error.unwrap().code.as_deref(), Some("XX000"));

        let result = client.rpc("ok", json!(["positional"])).await;
        assert_eq!(
            result.error.unwrap().code.as_deref(),
            Some(crate::error::VALIDATION_CODE)
        );
    }

    #[tokio::test]
    async fn raw_passes_sql_through() {
        let exec = MockExecutor::new().with_response("now()", vec![json!({"ts": "2024-01-01"})]);
        let client = RestClient::new(exec);
        let result = client.raw("SELECT now() AS ts WHERE $1", &[json!(true)]).await;
        assert_eq!(result.data.unwrap().len(), 1);
        assert_eq!(client.executor().statements(), vec!["SELECT now() AS ts WHERE $1"]);

        assert!(client.raw_batch("CREATE TABLE t (id int)").await.is_ok());
    }

    #[tokio::test]
    async fn invalidate_clears_cache() {
        let client = RestClient::new(MockExecutor::new());
        client
            .schema_cache()
            .get(client.runner())
            .await
            .unwrap();
        assert!(client.schema_cache().is_populated());
        client.invalidate_schema_cache();
        assert!(!client.schema_cache().is_populated());
    }
}
