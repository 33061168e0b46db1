//! `tracing` events for executed statements.

use crate::config::ClientConfig;
use std::time::Duration;
use tracing::Level;

/// What a statement is for, recorded on every SQL event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Count,
    Insert,
    Upsert,
    Update,
    Delete,
    /// Batched relationship lookup issued by the join resolver.
    Relation,
    /// Foreign-key introspection for the schema cache.
    Schema,
    Rpc,
    Raw,
}

/// Emits the SQL that will actually be executed, before it runs.
#[derive(Debug, Clone)]
pub(crate) struct SqlLogger {
    enabled: bool,
    level: Level,
    max_sql_length: Option<usize>,
}

impl Default for SqlLogger {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl SqlLogger {
    pub(crate) fn from_config(config: &ClientConfig) -> Self {
        Self {
            enabled: config.log_sql,
            level: config.sql_log_level,
            max_sql_length: config.max_sql_log_length,
        }
    }

    fn truncate_sql<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)).into(),
            _ => sql.into(),
        }
    }

    pub(crate) fn before(&self, kind: StatementKind, sql: &str, param_count: usize) {
        if !self.enabled {
            return;
        }

        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate_sql(sql);
        emit_at_level!(
            self.level,
            target: "pgrest.sql",
            kind = ?kind,
            param_count,
            sql = %sql,
        );
    }

    pub(crate) fn after(&self, kind: StatementKind, elapsed: Duration, rows: usize) {
        if self.enabled {
            tracing::trace!(
                target: "pgrest.sql",
                kind = ?kind,
                elapsed_ms = elapsed.as_millis() as u64,
                rows,
                "statement finished"
            );
        }
    }
}

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_sql_bytes("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_sql_bytes("héllo", 2), "h");
    }

    #[test]
    fn long_sql_is_truncated() {
        let logger = SqlLogger::from_config(&ClientConfig::new().max_sql_log_length(6));
        assert_eq!(logger.truncate_sql("SELECT * FROM t"), "SELECT...");
        let logger = SqlLogger::from_config(&ClientConfig::new().no_truncate());
        assert_eq!(logger.truncate_sql("SELECT * FROM t"), "SELECT * FROM t");
    }
}
