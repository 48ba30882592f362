//! Error types for the cache store.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the cache store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened or attached.
    #[error("failed to open cache database")]
    Open {
        /// Database file that failed to open.
        path: PathBuf,
        /// Source database error.
        source: sqlx::Error,
    },
    /// A pooled connection could not be acquired.
    #[error("failed to acquire database connection")]
    Acquire {
        /// Source database error.
        source: sqlx::Error,
    },
    /// A database operation failed.
    #[error("database operation failed")]
    Query {
        /// Operation identifier.
        operation: &'static str,
        /// Source database error.
        source: sqlx::Error,
    },
}

impl StoreError {
    pub(crate) fn query(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Query { operation, source }
    }
}
