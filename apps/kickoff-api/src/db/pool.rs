use diesel_async::pooled_connection::deadpool::{BuildError, Pool, PoolError};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Debug, thiserror::Error)]
pub enum PoolSetupError {
    #[error("failed to build connection pool: {0}")]
    Build(#[from] BuildError),
    #[error("database unreachable: {0}")]
    Unreachable(#[from] PoolError),
}

/// Create a Diesel async connection pool and check out one connection so an
/// unreachable database fails at startup instead of on the first join.
pub async fn connect(database_url: &str) -> Result<DbPool, PoolSetupError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager).max_size(20).build()?;

    drop(pool.get().await?);

    tracing::info!("database pool created");

    Ok(pool)
}
