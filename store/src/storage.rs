//! Raw storage surface for the Direct execution strategy.
//!
//! Writes through this trait bypass the record-store API entirely: no
//! validation, no lifecycle hooks, no reconciliation re-entry. The link
//! housekeeping write uses the same surface when available, which removes
//! one full pass through the hook pipeline.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Identifier of a storage transaction scoped to one batch.
pub type TransactionId = u64;

/// Storage backend reachable below the record-store API.
///
/// Transactional capability is declared by the backend and selected at
/// configuration time; callers must not probe for it per call.
#[async_trait]
pub trait DirectStorage: Send + Sync {
    /// Whether `begin`/`commit`/`rollback` are meaningful for this backend.
    fn supports_transactions(&self) -> bool;

    /// Open a transaction scoped to one batch.
    async fn begin(&self) -> Result<TransactionId>;

    /// Commit a transaction, applying every write staged under it.
    async fn commit(&self, txn: TransactionId) -> Result<()>;

    /// Roll a transaction back, discarding every write staged under it.
    async fn rollback(&self, txn: TransactionId) -> Result<()>;

    /// Insert a record without firing hooks. Returns the stored document.
    async fn create_raw(
        &self,
        collection: &str,
        data: Value,
        txn: Option<TransactionId>,
    ) -> Result<Value>;

    /// Merge fields into a record without firing hooks. Returns the
    /// updated document.
    async fn update_raw(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        txn: Option<TransactionId>,
    ) -> Result<Value>;

    /// Remove a record without firing hooks.
    async fn delete_raw(&self, collection: &str, id: &str, txn: Option<TransactionId>)
        -> Result<()>;
}
