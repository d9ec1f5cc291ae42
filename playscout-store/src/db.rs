//! Connection pool construction.
//!
//! WAL journal mode, foreign keys on, embedded migrations, a post-connect
//! health check — the same recipe regardless of whether `database_url`
//! points at a file or `:memory:`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(1800)),
            idle_timeout: Some(Duration::from_secs(600)),
            statement_cache_capacity: 100,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: None,
            idle_timeout: None,
            statement_cache_capacity: 100,
        }
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "creating sqlite pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(StoreError::Database)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        .pragma("cache_size", "-64000")
        .pragma("mmap_size", "268435456")
        .statement_cache_capacity(config.statement_cache_capacity);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "failed to create sqlite pool");
            StoreError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "migration failed");
            StoreError::Migration(e.to_string())
        })?;
    debug!("migrations applied");
    Ok(())
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(StoreError::Database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_in_memory_pool() {
        create_pool(DatabaseConfig::in_memory()).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_keys_enabled() {
        let pool = create_test_pool().await.unwrap();
        let (enabled,): (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn migrations_create_expected_tables() {
        let pool = create_test_pool().await.unwrap();
        for table in ["tracks", "streams", "plays", "recognitions"] {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(count, 1, "expected table {table} to exist");
        }
    }
}
