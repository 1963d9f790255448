//! Database connection and store selection for SMARTRASH

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, StorageBackend};
use crate::store::{MemoryStore, PgStore, Store};

/// Database connection error
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String),

    #[error("Failed to run migrations: {0}")]
    MigrationError(String),
}

/// Create a database connection pool
pub async fn create_pool(database_url: &str, config: &Config) -> Result<PgPool, DbError> {
    tracing::info!("Connecting to database at {}", config.database_url_masked());

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

    tracing::info!("Database connection pool created successfully");
    Ok(pool)
}

/// Run the embedded migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DbError::MigrationError(e.to_string()))?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Build the configured store, migrating PostgreSQL first
pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>, DbError> {
    match (config.storage, config.database_url.as_deref()) {
        (StorageBackend::Memory, _) => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        (StorageBackend::Postgres, Some(url)) => {
            let pool = create_pool(url, config).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        (StorageBackend::Postgres, None) => Err(DbError::ConnectionError(
            "DATABASE_URL is not set".to_string(),
        )),
    }
}
