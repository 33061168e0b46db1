//! The statement execution seam.
//!
//! Everything above this module only ever needs one primitive: run a parameterized statement
//! and get decoded rows back. [`Executor`] is implemented for plain connections,
//! transactions and (with the `pool` feature) deadpool pools and pooled clients.

use crate::config::ClientConfig;
use crate::error::{RestError, RestResult};
use crate::log::{SqlLogger, StatementKind};
use crate::row::{JsonRow, decode_row};
use crate::value::SqlValue;
use std::future::Future;
use std::time::Instant;
use tokio_postgres::types::ToSql;

/// Runs parameterized statements.
///
/// Pass a transaction anywhere an executor is expected to group several builder calls
/// into one unit of work; this crate never opens transactions itself.
pub trait Executor: Send + Sync {
    /// Execute a query and return all rows, decoded.
    fn query_rows(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = RestResult<Vec<JsonRow>>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = RestResult<u64>> + Send;

    /// Execute one or more statements without parameters (simple query protocol).
    fn batch_execute(&self, sql: &str) -> impl Future<Output = RestResult<()>> + Send;

    /// Release the underlying resources. The default does nothing.
    fn close(&self) {}
}

fn param_refs(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl Executor for tokio_postgres::Client {
    async fn query_rows(&self, sql: &str, params: &[SqlValue]) -> RestResult<Vec<JsonRow>> {
        let rows = tokio_postgres::Client::query(self, sql, &param_refs(params))
            .await
            .map_err(RestError::from_db_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> RestResult<u64> {
        tokio_postgres::Client::execute(self, sql, &param_refs(params))
            .await
            .map_err(RestError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> RestResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(RestError::from_db_error)
    }
}

impl Executor for tokio_postgres::Transaction<'_> {
    async fn query_rows(&self, sql: &str, params: &[SqlValue]) -> RestResult<Vec<JsonRow>> {
        let rows = tokio_postgres::Transaction::query(self, sql, &param_refs(params))
            .await
            .map_err(RestError::from_db_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> RestResult<u64> {
        tokio_postgres::Transaction::execute(self, sql, &param_refs(params))
            .await
            .map_err(RestError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> RestResult<()> {
        tokio_postgres::Transaction::batch_execute(self, sql)
            .await
            .map_err(RestError::from_db_error)
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Client {
    async fn query_rows(&self, sql: &str, params: &[SqlValue]) -> RestResult<Vec<JsonRow>> {
        // Delegate to the deref target (ClientWrapper -> tokio_postgres::Client).
        Executor::query_rows(&***self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> RestResult<u64> {
        Executor::execute(&***self, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> RestResult<()> {
        Executor::batch_execute(&***self, sql).await
    }
}

/// Acquires a pooled connection per statement and returns it right after.
#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Pool {
    async fn query_rows(&self, sql: &str, params: &[SqlValue]) -> RestResult<Vec<JsonRow>> {
        let client = self.get().await?;
        Executor::query_rows(&**client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> RestResult<u64> {
        let client = self.get().await?;
        Executor::execute(&**client, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> RestResult<()> {
        let client = self.get().await?;
        Executor::batch_execute(&**client, sql).await
    }

    fn close(&self) {
        deadpool_postgres::Pool::close(self);
    }
}

/// Executes statements on behalf of a builder: logs, times out and times them.
pub(crate) struct Runner<'a, E> {
    exec: &'a E,
    config: &'a ClientConfig,
    logger: &'a SqlLogger,
}

impl<E> Clone for Runner<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Runner<'_, E> {}

impl<'a, E: Executor> Runner<'a, E> {
    pub(crate) fn new(exec: &'a E, config: &'a ClientConfig, logger: &'a SqlLogger) -> Self {
        Self {
            exec,
            config,
            logger,
        }
    }

    pub(crate) fn config(&self) -> &'a ClientConfig {
        self.config
    }

    pub(crate) async fn rows(
        &self,
        kind: StatementKind,
        sql: &str,
        params: &[SqlValue],
    ) -> RestResult<Vec<JsonRow>> {
        self.logger.before(kind, sql, params.len());
        let start = Instant::now();
        let rows = self.with_timeout(self.exec.query_rows(sql, params)).await?;
        self.logger.after(kind, start.elapsed(), rows.len());
        Ok(rows)
    }

    pub(crate) async fn execute(
        &self,
        kind: StatementKind,
        sql: &str,
        params: &[SqlValue],
    ) -> RestResult<u64> {
        self.logger.before(kind, sql, params.len());
        let start = Instant::now();
        let affected = self.with_timeout(self.exec.execute(sql, params)).await?;
        self.logger.after(kind, start.elapsed(), affected as usize);
        Ok(affected)
    }

    pub(crate) async fn batch(&self, sql: &str) -> RestResult<()> {
        self.logger.before(StatementKind::Raw, sql, 0);
        self.with_timeout(self.exec.batch_execute(sql)).await
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = RestResult<T>>) -> RestResult<T> {
        match self.config.query_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| RestError::Timeout(limit))?,
            None => fut.await,
        }
    }
}
