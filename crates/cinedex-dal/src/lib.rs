pub mod error;
pub mod filters;
pub mod movie;

use std::time::Duration;

pub use error::Error;
pub use filters::{Filters, Metadata, SortDirection, SortField, SortKey};
pub use movie::{Movie, MovieRepository, MovieRepositoryImpl, Runtime};
pub use sqlx::Error as SqlxError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

use crate::error::Result;

pub type ChosenDB = sqlx::Sqlite;
pub type ChosenRow = sqlx::sqlite::SqliteRow;
pub type Pool = sqlx::Pool<ChosenDB>;

/// Deadline applied to every repository round trip unless overridden.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout: Option<Duration>,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 25,
            min_connections: 0,
            idle_timeout: Some(Duration::from_secs(15 * 60)),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

pub async fn new_pool(database_url: &str) -> Result<Pool, Error> {
    new_pool_with(database_url, &PoolConfig::default()).await
}

pub async fn new_pool_with(database_url: &str, config: &PoolConfig) -> Result<Pool, Error> {
    let options = database_url
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .idle_timeout(config.idle_timeout)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await?;

    // make sure the database actually answers before handing the pool out
    match tokio::time::timeout(
        config.acquire_timeout,
        sqlx::query("SELECT 1").execute(&pool),
    )
    .await
    {
        Ok(res) => {
            res?;
        }
        Err(_) => return Err(Error::DeadlineExceeded(config.acquire_timeout)),
    }
    debug!("Database pool for {database_url} ready");
    Ok(pool)
}

pub async fn migrate(pool: &Pool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
