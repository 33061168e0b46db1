//! The `{data, error, count}` result envelope returned by every terminal call.

use crate::error::{QueryError, RestError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Outcome of a query.
///
/// Exactly one of `data` / `error` describes the outcome, except in head mode where both
/// `data` and `error` are `None` and only `count` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult<T> {
    pub data: Option<T>,
    pub error: Option<QueryError>,
    pub count: Option<i64>,
}

impl<T> QueryResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            count: None,
        }
    }

    /// A successful result carrying no data (head mode, mutation without `select`).
    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
            count: None,
        }
    }

    pub fn err(error: impl Into<QueryError>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
            count: None,
        }
    }

    pub fn with_count(mut self, count: Option<i64>) -> Self {
        self.count = count;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> Result<Option<T>, QueryError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
        QueryResult {
            data: self.data.map(f),
            error: self.error,
            count: self.count,
        }
    }
}

impl<T: Serialize> QueryResult<T> {
    /// Deserialize `data` into a caller-defined type.
    ///
    /// ```ignore
    /// #[derive(Deserialize)]
    /// struct Game { id: i64, title: String }
    ///
    /// let games: QueryResult<Vec<Game>> = client.from("games").select("id, title").execute().await.decode();
    /// ```
    pub fn decode<D: DeserializeOwned>(self) -> QueryResult<D> {
        let count = self.count;
        let result = match (self.error, self.data) {
            (Some(error), _) => QueryResult::err(error),
            (None, None) => QueryResult::empty(),
            (None, Some(data)) => match serde_json::to_value(data).and_then(serde_json::from_value) {
                Ok(decoded) => QueryResult::ok(decoded),
                Err(e) => QueryResult::err(RestError::from(e)),
            },
        };
        result.with_count(count)
    }
}

impl<T> From<RestError> for QueryResult<T> {
    fn from(err: RestError) -> Self {
        Self::err(err)
    }
}
