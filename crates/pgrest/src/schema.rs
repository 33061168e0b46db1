//! Foreign-key schema cache.
//!
//! The foreign-key graph is loaded once from `information_schema` and shared by every
//! builder created from the same [`RestClient`](crate::RestClient). Population is
//! single-flight: callers arriving while a load runs wait for its outcome, success or
//! failure, instead of issuing their own query. A failed load leaves the cache empty so the
//! next call retries.

use crate::error::{RestError, RestResult};
use crate::executor::{Executor, Runner};
use crate::log::StatementKind;
use crate::row::JsonRow;
use crate::value::SqlValue;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;

/// One foreign-key column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkInfo {
    pub constraint_name: String,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

impl FkInfo {
    fn from_row(row: &JsonRow) -> RestResult<Self> {
        let text = |name: &str| -> RestResult<String> {
            match row.get(name) {
                Some(Value::String(s)) => Ok(s.clone()),
                other => Err(RestError::decode(
                    name,
                    format!("expected text, got {other:?}"),
                )),
            }
        };
        Ok(Self {
            constraint_name: text("constraint_name")?,
            from_table: text("from_table")?,
            from_column: text("from_column")?,
            to_table: text("to_table")?,
            to_column: text("to_column")?,
        })
    }
}

pub(crate) const FOREIGN_KEYS_SQL: &str = r#"
SELECT
  tc.constraint_name::text AS constraint_name,
  kcu.table_name::text AS from_table,
  kcu.column_name::text AS from_column,
  ccu.table_name::text AS to_table,
  ccu.column_name::text AS to_column
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name
 AND tc.table_schema = kcu.table_schema
JOIN information_schema.constraint_column_usage ccu
  ON ccu.constraint_name = tc.constraint_name
 AND ccu.constraint_schema = tc.table_schema
WHERE tc.constraint_type = 'FOREIGN KEY'
  AND tc.table_schema::text = ANY($1::text[])
ORDER BY kcu.table_name, tc.constraint_name, kcu.ordinal_position
"#;

/// Outcome of one load, published to every caller waiting on it. `None` while running.
type LoadOutcome = Option<Result<Arc<[FkInfo]>, String>>;

enum Role {
    Ready(Arc<[FkInfo]>),
    Leader(watch::Sender<LoadOutcome>),
    Waiter(watch::Receiver<LoadOutcome>),
}

/// Lazily populated, invalidatable cache of the foreign-key graph.
#[derive(Debug, Default)]
pub struct SchemaCache {
    cached: RwLock<Option<Arc<[FkInfo]>>>,
    /// The load in flight, if any.
    inflight: Mutex<Option<watch::Receiver<LoadOutcome>>>,
    generation: AtomicU64,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached foreign keys, if populated. Never waits for an in-flight load.
    pub fn snapshot(&self) -> Option<Arc<[FkInfo]>> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_populated(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Drop the cached graph; the next [`get`](Self::get) reloads it.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!(target: "pgrest.schema", "foreign key cache invalidated");
    }

    /// Return the foreign keys, loading them on first use.
    pub(crate) async fn get<E: Executor>(&self, runner: Runner<'_, E>) -> RestResult<Arc<[FkInfo]>> {
        if let Some(fks) = self.snapshot() {
            return Ok(fks);
        }

        loop {
            match self.join_or_lead() {
                Role::Ready(fks) => return Ok(fks),
                Role::Waiter(mut rx) => {
                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(seen) => (*seen).clone(),
                        // The leading caller was dropped mid-load; take over.
                        Err(_) => continue,
                    };
                    if let Some(result) = outcome {
                        return result.map_err(RestError::SchemaCache);
                    }
                }
                Role::Leader(tx) => {
                    let generation = self.generation.load(Ordering::SeqCst);
                    let result = self.load(runner).await;
                    self.publish(generation, &result);
                    tx.send_replace(Some(result.clone()));
                    return result.map_err(RestError::SchemaCache);
                }
            }
        }
    }

    /// Return the cached value, join the load in flight, or start a new one.
    fn join_or_lead(&self) -> Role {
        let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(fks) = self.snapshot() {
            return Role::Ready(fks);
        }
        // A receiver whose sender is gone belongs to an abandoned load.
        if let Some(rx) = slot.as_ref().filter(|rx| rx.has_changed().is_ok()) {
            return Role::Waiter(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        *slot = Some(rx);
        Role::Leader(tx)
    }

    /// Store a successful load and close the in-flight slot, so the next caller after a
    /// failure starts a fresh load.
    fn publish(&self, generation: u64, result: &Result<Arc<[FkInfo]>, String>) {
        let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(fks) => {
                tracing::debug!(target: "pgrest.schema", count = fks.len(), "foreign key cache populated");
                if self.generation.load(Ordering::SeqCst) == generation {
                    *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(fks.clone());
                }
            }
            Err(e) => {
                tracing::warn!(target: "pgrest.schema", error = %e, "foreign key cache load failed");
            }
        }
        *slot = None;
    }

    async fn load<E: Executor>(&self, runner: Runner<'_, E>) -> Result<Arc<[FkInfo]>, String> {
        let schemas = Value::Array(
            runner
                .config()
                .schemas
                .iter()
                .map(|s| Value::String(s.clone()))
                .collect(),
        );
        let rows = runner
            .rows(StatementKind::Schema, FOREIGN_KEYS_SQL, &[SqlValue(schemas)])
            .await
            .map_err(|e| e.to_string())?;
        let fks = rows
            .iter()
            .map(FkInfo::from_row)
            .collect::<RestResult<Vec<_>>>()
            .map_err(|e| e.to_string())?;
        Ok(fks.into())
    }
}
