use std::time::Duration;
use tracing::Level;

/// Configuration for [`RestClient`](crate::RestClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Schemas whose foreign keys are loaded into the schema cache.
    pub schemas: Vec<String>,
    /// Per-statement timeout.
    pub query_timeout: Option<Duration>,
    /// Text search configuration used when `text_search` is given none.
    pub text_search_config: String,
    /// Maximum number of keys per batched `IN (...)` relationship query.
    pub join_batch_size: usize,
    /// Whether to fall back to `{alias}_id -> id` when no foreign key matches.
    pub fk_name_fallback: bool,
    /// Below this planner estimate, `Count::Estimated` runs an exact count instead.
    pub estimated_count_threshold: i64,
    /// Whether to emit every statement as a `tracing` event.
    pub log_sql: bool,
    /// Tracing level for statement events.
    pub sql_log_level: Level,
    /// Truncate logged SQL (in bytes). `None` means no truncation.
    pub max_sql_log_length: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            schemas: vec!["public".to_string()],
            query_timeout: None,
            text_search_config: "english".to_string(),
            join_batch_size: 1000,
            fk_name_fallback: true,
            estimated_count_threshold: 1000,
            log_sql: true,
            sql_log_level: Level::DEBUG,
            max_sql_log_length: Some(200),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list of introspected schemas.
    pub fn schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    /// Set query timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.query_timeout = Some(duration);
        self
    }

    /// Set the default text search configuration (e.g. `simple`, `german`).
    pub fn text_search_config(mut self, config: impl Into<String>) -> Self {
        self.text_search_config = config.into();
        self
    }

    /// Set the batch size for relationship lookups. Zero is treated as one.
    pub fn join_batch_size(mut self, size: usize) -> Self {
        self.join_batch_size = size.max(1);
        self
    }

    /// Disable the `{alias}_id` naming fallback; unresolvable joins then yield null / `[]`.
    pub fn no_fk_name_fallback(mut self) -> Self {
        self.fk_name_fallback = false;
        self
    }

    /// Set the planner-estimate threshold for `Count::Estimated`.
    pub fn estimated_count_threshold(mut self, threshold: i64) -> Self {
        self.estimated_count_threshold = threshold;
        self
    }

    /// Disable SQL logging.
    pub fn no_log_sql(mut self) -> Self {
        self.log_sql = false;
        self
    }

    /// Override the tracing level of statement events.
    pub fn sql_log_level(mut self, level: Level) -> Self {
        self.sql_log_level = level;
        self
    }

    /// Set maximum SQL length to log.
    pub fn max_sql_log_length(mut self, len: usize) -> Self {
        self.max_sql_log_length = Some(len);
        self
    }

    /// Disable SQL truncation in logs.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_log_length = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.schemas, vec!["public".to_string()]);
        assert_eq!(cfg.text_search_config, "english");
        assert_eq!(cfg.join_batch_size, 1000);
        assert!(cfg.fk_name_fallback);
        assert!(cfg.query_timeout.is_none());
    }

    #[test]
    fn builder_chain() {
        let cfg = ClientConfig::new()
            .schemas(["app", "public"])
            .timeout(Duration::from_secs(3))
            .join_batch_size(0)
            .no_fk_name_fallback();
        assert_eq!(cfg.schemas, vec!["app".to_string(), "public".to_string()]);
        assert_eq!(cfg.query_timeout, Some(Duration::from_secs(3)));
        assert_eq!(cfg.join_batch_size, 1);
        assert!(!cfg.fk_name_fallback);
    }
}
