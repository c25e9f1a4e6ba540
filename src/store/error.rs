//! Error types for store operations.

use std::fmt;

use thiserror::Error;

use super::models::AlbumStatus;

/// Structured classification for database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Unique constraint failure.
    UniqueViolation,
    /// Other constraint failure (foreign-key/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Expected row was not found.
    RowNotFound,
    /// Filesystem or transport IO failure.
    Io,
    /// Unclassified database failure.
    Other,
}

impl DbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::UniqueViolation => "unique_violation",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> DbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return DbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation() {
        return DbErrorKind::UniqueViolation;
    }

    if database_error.is_foreign_key_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return DbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked") || message.contains("database is busy") {
        return DbErrorKind::BusyOrLocked;
    }

    DbErrorKind::Other
}

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for failure handling.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// No artist with the given id.
    #[error("artist not found: id {0}\n  Suggestion: Run a crawl first or check the artist id")]
    ArtistNotFound(i64),

    /// No album with the given id.
    #[error("album not found: id {0}\n  Suggestion: Run a crawl first or check the album id")]
    AlbumNotFound(i64),

    /// No upload with the given id.
    #[error("upload not found: id {0}")]
    UploadNotFound(i64),

    /// The requested status change is not part of the album lifecycle.
    #[error(
        "album {id} cannot move from '{from}' to '{to}'\n  Suggestion: Allowed moves are added -> reviewed -> downloaded -> uploaded, or any active state -> disabled"
    )]
    InvalidTransition {
        /// Album id.
        id: i64,
        /// Status at the time of the request.
        from: AlbumStatus,
        /// Requested status.
        to: AlbumStatus,
    },

    /// An upload with this infohash is already recorded.
    #[error(
        "an upload with infohash {0} already exists\n  Suggestion: Retry the existing upload instead of generating a new torrent"
    )]
    DuplicateInfohash(String),

    /// A stored row could not be decoded into its domain type.
    #[error("corrupt {table} record {id}: {reason}")]
    CorruptRecord {
        /// Table name.
        table: &'static str,
        /// Row id.
        id: i64,
        /// What failed to decode.
        reason: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true when this error is a database busy/locked condition.
    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        self.database_kind() == Some(DbErrorKind::BusyOrLocked)
    }

    /// Returns true when this error is a unique-constraint violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.database_kind() == Some(DbErrorKind::UniqueViolation)
    }
}
