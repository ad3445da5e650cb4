//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors from the durable key-value store.
///
/// Any of these leaves the store as it was before the failed call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened or created.
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// A transaction could not be started.
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// A table could not be opened.
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Reading or writing pages failed.
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    /// A write transaction could not be made durable.
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// A stored value could not be encoded or decoded.
    #[error("Value codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A stored key had the wrong length.
    #[error("Corrupt key of {len} bytes")]
    CorruptKey {
        /// Length found.
        len: usize,
    },

    /// Filesystem error while preparing the store directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
