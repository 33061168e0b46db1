//! Error types for pgrest

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pgrest operations
pub type RestResult<T> = Result<T, RestError>;

/// Error code for "JSON object requested, multiple (or no) rows returned".
pub const CARDINALITY_CODE: &str = "PGRST116";
/// Error code for malformed input (identifiers, filter grammar, payloads).
pub const VALIDATION_CODE: &str = "PGRST100";
/// Error code for a failed foreign-key schema cache load.
pub const SCHEMA_CACHE_CODE: &str = "PGRST002";
/// Error code for connection and pool failures.
pub const CONNECTION_CODE: &str = "PGRST000";
/// SQLSTATE `query_canceled`, reused for client-side statement timeouts.
pub const TIMEOUT_CODE: &str = "57014";

/// Error types for query building and execution
#[derive(Debug, Error)]
pub enum RestError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error reported by the database server
    #[error("{message}")]
    Database {
        message: String,
        code: String,
        details: Option<String>,
        hint: Option<String>,
    },

    /// Driver-level error without a server error payload
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// `single()` / `maybe_single()` row count mismatch
    #[error("JSON object requested, multiple (or no) rows returned")]
    Cardinality { rows: usize },

    /// Foreign-key schema cache could not be loaded
    #[error("Could not load the foreign key schema cache: {0}")]
    SchemaCache(String),

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Invalid identifier, filter expression, or payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Statement timeout
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),
}

impl RestError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a cardinality error
    pub fn is_cardinality(&self) -> bool {
        matches!(self, Self::Cardinality { .. })
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Convert a tokio_postgres error, keeping the server's SQLSTATE, detail and hint.
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            return Self::Database {
                message: db_err.message().to_string(),
                code: db_err.code().code().to_string(),
                details: db_err.detail().map(str::to_string),
                hint: db_err.hint().map(str::to_string),
            };
        }
        if err.is_closed() {
            return Self::Connection(err.to_string());
        }
        Self::Query(err)
    }

    /// Error code exposed in [`QueryError::code`].
    pub fn code(&self) -> &str {
        match self {
            Self::Database { code, .. } => code,
            Self::Cardinality { .. } => CARDINALITY_CODE,
            Self::SchemaCache(_) => SCHEMA_CACHE_CODE,
            Self::Validation(_) | Self::Serialization(_) => VALIDATION_CODE,
            Self::Timeout(_) => TIMEOUT_CODE,
            #[cfg(feature = "pool")]
            Self::Pool(_) => CONNECTION_CODE,
            Self::Connection(_) | Self::Query(_) | Self::Decode { .. } => CONNECTION_CODE,
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for RestError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(e) => Self::from_db_error(e),
            other => Self::Pool(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error payload of a [`QueryResult`](crate::QueryResult).
///
/// Mirrors the PostgREST error body: `{message, code, details, hint}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryError {
    pub message: String,
    pub code: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
            hint: None,
        }
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<RestError> for QueryError {
    fn from(err: RestError) -> Self {
        let code = Some(err.code().to_string());
        let text = err.to_string();
        match err {
            RestError::Database {
                message,
                details,
                hint,
                ..
            } => Self {
                message,
                code,
                details,
                hint,
            },
            RestError::Cardinality { rows } => Self {
                message: text,
                code,
                details: Some(format!("The result contains {rows} rows")),
                hint: None,
            },
            _ => Self {
                message: text,
                code,
                details: None,
                hint: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_maps_to_pgrst116() {
        let err: QueryError = RestError::Cardinality { rows: 2 }.into();
        assert_eq!(err.code.as_deref(), Some("PGRST116"));
        assert_eq!(err.details.as_deref(), Some("The result contains 2 rows"));
    }

    #[test]
    fn database_error_keeps_native_fields() {
        let err: QueryError = RestError::Database {
            message: "duplicate key value violates unique constraint \"users_pkey\"".into(),
            code: "23505".into(),
            details: Some("Key (id)=(1) already exists.".into()),
            hint: None,
        }
        .into();
        assert_eq!(err.code.as_deref(), Some("23505"));
        assert_eq!(err.details.as_deref(), Some("Key (id)=(1) already exists."));
        assert!(err.message.starts_with("duplicate key"));
    }

    #[test]
    fn validation_and_schema_codes() {
        assert_eq!(RestError::validation("bad").code(), VALIDATION_CODE);
        assert_eq!(RestError::SchemaCache("down".into()).code(), SCHEMA_CACHE_CODE);
        assert_eq!(
            RestError::Timeout(std::time::Duration::from_secs(1)).code(),
            TIMEOUT_CODE
        );
    }
}
