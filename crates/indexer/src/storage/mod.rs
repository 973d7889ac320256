//! Storage layer for the indexing pipeline.
//!
//! This module provides database operations for:
//! - Headers (canonical chain metadata, keyed by block number + node fingerprint)
//! - Transactions and logs attached to headers
//! - Raw contract storage diffs (append-only, deduplicated)
//! - The checked-header ledger (per-transformer check counts)

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod checked_headers;
pub mod diffs;
pub mod headers;
pub mod logs;
pub mod types;

pub use types::*;

/// Database storage for the pipeline.
///
/// Provides async access to SQLite with connection pooling. Every write path
/// is an upsert over the table's uniqueness tuple, so all operations are safe
/// under concurrent retry.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let max_conn = max_connections.unwrap_or(5);
        let min_conn = min_connections.unwrap_or(1);

        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_conn)
            .min_connections(min_conn)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Create a new storage instance at a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Run database migrations.
    ///
    /// Call once during initialization to bring the schema up to date.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    /// Aggregate row counts for status reporting.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let header_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM headers")
            .fetch_one(&self.pool)
            .await?;
        let log_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await?;
        let transaction_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?;
        let diff_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storage_diffs")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            header_count: header_count as u64,
            log_count: log_count as u64,
            transaction_count: transaction_count as u64,
            diff_count: diff_count as u64,
        })
    }
}
