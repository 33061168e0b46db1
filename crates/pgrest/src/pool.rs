//! deadpool helpers for building the executor behind [`RestClient`](crate::RestClient).
//!
//! A `Pool` implements [`Executor`](crate::Executor) by checking out one connection per
//! statement, so concurrent join lookups spread across connections.

use crate::error::{RestError, RestResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolBuilder, RecyclingMethod};
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::{NoTls, Socket};

const DEFAULT_MAX_SIZE: usize = 16;

/// Plain-TCP pool with 16 connections. Nothing connects until the first statement.
///
/// ```ignore
/// let client = pgrest::RestClient::new(pgrest::create_pool("postgres://localhost/app")?);
/// ```
pub fn create_pool(database_url: &str) -> RestResult<Pool> {
    create_pool_with_config(database_url, DEFAULT_MAX_SIZE)
}

/// Plain-TCP pool with a custom max size.
pub fn create_pool_with_config(database_url: &str, max_size: usize) -> RestResult<Pool> {
    create_pool_with_manager_config(database_url, NoTls, fast_recycling(), |builder| {
        builder.max_size(max_size)
    })
}

/// Pool over any TLS connector, with full control over the manager and pool builder.
pub fn create_pool_with_manager_config<T>(
    database_url: &str,
    tls: T,
    manager_config: ManagerConfig,
    configure_pool: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> RestResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let pg_config = database_url
        .parse::<tokio_postgres::Config>()
        .map_err(|e| RestError::Connection(format!("invalid database url: {e}")))?;

    let manager = Manager::from_config(pg_config, tls, manager_config);
    configure_pool(Pool::builder(manager))
        .build()
        .map_err(|e| RestError::Pool(e.to_string()))
}

fn fast_recycling() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}
