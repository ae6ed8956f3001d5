use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, Transaction};
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::sqlite::models::{ChunkRecord, IndexStatistics, IndexedFile};
use crate::database::sqlite::queries::{ChunkQueries, FileQueries};
use crate::embeddings::chunking::FileType;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// SQLite manifest of indexed files and their chunk ledger
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let base_dir = config.get_base_dir();
        std::fs::create_dir_all(base_dir).with_context(|| {
            format!("Failed to create config directory: {}", base_dir.display())
        })?;

        Self::new(config.database_path(), config.storage.max_connections).await
    }

    /// Start a transaction for an atomic per-file replace
    #[inline]
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    // File manifest operations
    #[inline]
    pub async fn get_file(&self, file_path: &str) -> Result<Option<IndexedFile>> {
        FileQueries::get(&self.pool, file_path).await
    }

    #[inline]
    pub async fn list_files(&self) -> Result<Vec<IndexedFile>> {
        FileQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn clear(&self) -> Result<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        FileQueries::delete_all(&mut conn).await
    }

    #[inline]
    pub async fn get_statistics(&self) -> Result<IndexStatistics> {
        FileQueries::get_statistics(&self.pool).await
    }

    #[inline]
    pub async fn count_by_file_type(&self) -> Result<Vec<(FileType, i64)>> {
        FileQueries::count_by_file_type(&self.pool).await
    }

    // Chunk ledger operations
    #[inline]
    pub async fn get_chunks_for_file(&self, file_path: &str) -> Result<Vec<ChunkRecord>> {
        ChunkQueries::list_by_file(&self.pool, file_path).await
    }

    #[inline]
    pub async fn chunk_counts(&self) -> Result<Vec<(String, i64)>> {
        ChunkQueries::count_by_file(&self.pool).await
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}
