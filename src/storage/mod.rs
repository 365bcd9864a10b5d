//! Destination store.
//!
//! The relational destination is a single SQLite file. Writes go through
//! [`SqliteDestination`] (full replace inside one transaction); the
//! dashboard side reads through [`ReadStore`], which opens the file
//! read-only.

use std::path::{Path, PathBuf};

pub mod read;
pub mod schema;
pub mod sqlite;

pub use read::{QueryResult, ReadStore};
pub use sqlite::SqliteDestination;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Schema definition not found: {0}")]
    SchemaNotFound(PathBuf),

    #[error("Database not found: {0}")]
    DatabaseNotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Query build error: {0}")]
    QueryBuild(#[from] sea_query::error::Error),
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
