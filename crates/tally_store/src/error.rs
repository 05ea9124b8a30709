//! Error types for store operations.

use crate::model::{Collection, RowId, UserId};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted state could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted state is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the store lock.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// A referenced row does not exist.
    #[error("{collection} row {id} not found")]
    RowNotFound {
        /// Collection the row was looked up in.
        collection: Collection,
        /// The missing row id.
        id: RowId,
    },

    /// A referenced row belongs to a different user.
    #[error("{collection} row {id} belongs to user {owner}, not {requested}")]
    TenantMismatch {
        /// Collection of the offending row.
        collection: Collection,
        /// The offending row id.
        id: RowId,
        /// Owner of the row.
        owner: UserId,
        /// User the operation was scoped to.
        requested: UserId,
    },

    /// A write was rejected by the store.
    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates a write failure error.
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed(message.into())
    }
}
