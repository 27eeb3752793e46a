//! Persistent database errors.

use thiserror::Error;

use super::constants::{SQLITE_BUSY, SQLITE_LOCKED};

/// Errors that can occur when interacting with the database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An error occurred when interacting with the SQLite database.
    #[error("sqlite: {0}")]
    Driver(#[from] sqlx::Error),

    /// A stored value could not be converted back into its domain type.
    #[error("conversion: {0}")]
    MismatchedTypes(String),
}

impl StorageError {
    /// Whether retrying the same operation later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Driver(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => true,
            Self::Driver(sqlx::Error::Database(e)) => e
                .code()
                .is_some_and(|code| code == SQLITE_BUSY || code == SQLITE_LOCKED),
            _ => false,
        }
    }
}
