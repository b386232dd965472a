use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};

use crate::errors::{AppError, AppResult};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Build the r2d2 pool. `connection_timeout` bounds every checkout, so a
/// saturated pool surfaces as a transient error instead of hanging a handler.
pub fn create_pool(database_url: &str, max_size: u32, connection_timeout: Duration) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size)
        .min_idle(Some(2))
        .connection_timeout(connection_timeout)
        .test_on_check_out(true)
        .build(manager)?;

    tracing::info!(max_size, "database connection pool created");
    Ok(pool)
}

/// Check out a connection, mapping pool exhaustion to `ServiceUnavailable`.
pub fn checkout(pool: &DbPool) -> AppResult<DbConnection> {
    pool.get().map_err(|e| {
        tracing::error!(error = %e, "failed to get db connection");
        AppError::unavailable("database connection error")
    })
}
