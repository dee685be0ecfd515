//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        Self::Database(sqlx::Error::Io(e))
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Map a unique-key violation on insert to `AlreadyExists`.
pub(crate) fn map_insert_error(err: sqlx::Error, key: &str) -> MetadataError {
    match err {
        // Match SQLite's message as well as the extended result code.
        sqlx::Error::Database(db_err)
            if db_err.is_unique_violation()
                || db_err.message().contains("UNIQUE constraint failed") =>
        {
            MetadataError::AlreadyExists(key.to_string())
        }
        other => MetadataError::Database(other),
    }
}
