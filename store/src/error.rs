//! Unified error handling for the store crate.

use crate::storage::TransactionId;
use crate::strategy::ApplyError;

/// Errors surfaced by record-store implementations and the hook layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("unknown transaction: {0}")]
    UnknownTransaction(TransactionId),

    #[error("transaction is still in use")]
    TransactionBusy,

    #[error("engine error: {0}")]
    Engine(#[from] stitch_engine::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Batch(Box<ApplyError>),
}

impl From<ApplyError> for StoreError {
    fn from(err: ApplyError) -> Self {
        StoreError::Batch(Box::new(err))
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::NotFound("item-1".into());
        assert_eq!(err.to_string(), "record not found: item-1");

        let err = StoreError::UnknownTransaction(7);
        assert_eq!(err.to_string(), "unknown transaction: 7");

        let err = StoreError::Backend("boom".into());
        assert_eq!(err.to_string(), "backend error: boom");
    }
}
