//! Database connection and schema management.
//!
//! This module provides SQLite connectivity for the artist/album/upload store:
//! - Connection pool management
//! - WAL mode for concurrent reads while the crawler writes
//! - Foreign key enforcement (albums reference artists, uploads reference albums)
//! - Automatic migration execution
//!
//! # Example
//!
//! ```no_run
//! use catalog_relay::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("catalog-relay.db")).await?;
//! // Hand db to a Store...
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// Default maximum number of connections in the pool.
/// Kept low for SQLite since it uses file-level locking.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in milliseconds.
/// Connections will wait this long before returning SQLITE_BUSY.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Pool tuning knobs, normally taken from the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Database connection wrapper with connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `db_path` with default options.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        Self::with_options(db_path, DatabaseOptions::default()).await
    }

    /// Opens the database at `db_path` using explicit pool options.
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Enable WAL mode and foreign keys
    /// 3. Run any pending migrations
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn with_options(db_path: &Path, options: DatabaseOptions) -> Result<Self, DbError> {
        let connect = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(u64::from(options.busy_timeout_ms)));

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(max_connections = options.max_connections, "database ready");

        Ok(Self { pool })
    }

    /// Creates an in-memory database for testing.
    ///
    /// A single connection is used so every query sees the same memory
    /// database. WAL is not enabled since it provides no benefit here.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let connect = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checks if WAL mode is enabled.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the query fails.
    #[instrument(skip(self))]
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0.eq_ignore_ascii_case("wal"))
    }

    /// Gracefully closes all connections in the pool.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_new_in_memory_succeeds() {
        let db = Database::new_in_memory().await;
        assert!(db.is_ok(), "Failed to create in-memory database");
    }

    #[tokio::test]
    async fn test_database_album_requires_existing_artist() {
        let db = Database::new_in_memory().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO album (id, artist_id, title, image_url, digital_release_date, release_date, record_type, tracks, upc)
             VALUES (1, 999, 'Orphan', 'https://img', '2020-01-01', '2020-01-01', 'album', '[]', '0')",
        )
        .execute(db.pool())
        .await;

        assert!(
            result.is_err(),
            "Album insert must fail when the artist does not exist"
        );
    }

    #[tokio::test]
    async fn test_database_rejects_unknown_album_status() {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO artist (id, name, image_url) VALUES (1, 'A', 'https://img')")
            .execute(db.pool())
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO album (id, artist_id, title, image_url, digital_release_date, release_date, record_type, tracks, upc, status)
             VALUES (1, 1, 'T', 'https://img', '2020-01-01', '2020-01-01', 'album', '[]', '0', 'archived')",
        )
        .execute(db.pool())
        .await;

        assert!(
            result.is_err(),
            "Unknown status should be rejected by CHECK constraint"
        );
    }

    #[tokio::test]
    async fn test_database_with_tempfile_enables_wal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await.unwrap();
        assert!(db.is_wal_enabled().await.unwrap());
        db.close().await;
    }

    #[tokio::test]
    async fn test_database_options_default_values() {
        let options = DatabaseOptions::default();
        assert_eq!(options.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(options.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
    }
}
