//! # pgrest
//!
//! A PostgREST-style fluent query builder that talks to Postgres directly.
//!
//! ## Features
//!
//! - **Select expressions**: `"*, author:profiles!posts_author_id_fkey(id, username)"`
//! - **Relationships**: resolved from the foreign-key graph with one batched query per reference
//! - **Filters**: `eq`, `in_`, `contains`, `text_search`, `or("a.eq.1,and(b.gt.2,c.is.null)")`, ...
//! - **Mutations**: insert, upsert, update and delete with optional returned rows
//! - **Result envelope**: every call returns `{data, error, count}`; nothing panics across the API
//! - **Executor seam**: plain connections, transactions and deadpool pools
//!
//! ```ignore
//! use pgrest::{OrderOptions, RestClient, SelectOptions, Count};
//!
//! let client = RestClient::connect(&database_url)?;
//!
//! let page = client
//!     .from("posts")
//!     .select_with("id, title, author:profiles(username), comments(body)", SelectOptions::count(Count::Exact))
//!     .eq("published", true)
//!     .order("created_at", OrderOptions::desc())
//!     .range(0, 19)
//!     .execute()
//!     .await;
//!
//! let post = client
//!     .from("posts")
//!     .insert(serde_json::json!({"title": "Hello", "author_id": 1}))
//!     .select("id")
//!     .single()
//!     .await;
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod ident;
pub mod join;
pub mod log;
pub mod result;
pub mod row;
mod rpc;
pub mod schema;
pub mod select;
pub mod value;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{
    Count, OrderOptions, QueryBuilder, SelectOptions, Statement, UpsertOptions,
};
pub use client::RestClient;
pub use config::ClientConfig;
pub use error::{QueryError, RestError, RestResult};
pub use executor::Executor;
pub use filter::{Filter, FilterOp, FilterSet, IsValue, TextSearchOptions, TextSearchType, WhereClause};
pub use ident::{Ident, quote_ident};
pub use join::{Direction, FkPlan, resolve_fk};
pub use log::StatementKind;
pub use result::QueryResult;
pub use row::JsonRow;
pub use schema::{FkInfo, SchemaCache};
pub use select::{JoinRef, ParsedSelect, SelectItem, parse_select};
pub use value::SqlValue;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
