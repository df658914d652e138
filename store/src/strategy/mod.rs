//! Execution strategies for applying a diff.
//!
//! A strategy takes the create/update/delete sets computed by the engine
//! and lands them against storage. The ordering rule is shared: deletes
//! and updates are launched concurrently and joined first (deletions may
//! free uniqueness slots new records legitimately want to reuse), creates
//! go out only after that join. The returned list is re-sorted by `order`
//! so callers observe the proposed sequence regardless of completion
//! order.

pub mod api;
pub mod direct;

pub use api::ApiStrategy;
pub use direct::DirectStrategy;

use crate::error::StoreError;
use async_trait::async_trait;
use std::fmt;
use stitch_engine::{ChildRecord, DiffResult, OperationContext, OrderIndex, RecordId};

/// Kind of a single child operation inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChildOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildOp::Create => write!(f, "create"),
            ChildOp::Update => write!(f, "update"),
            ChildOp::Delete => write!(f, "delete"),
        }
    }
}

/// A single failed child operation.
#[derive(Debug)]
pub struct OperationFailure {
    /// What the operation was
    pub op: ChildOp,
    /// Identifier of the targeted record, if it had one
    pub id: Option<RecordId>,
    /// Position the record was headed for
    pub order: Option<OrderIndex>,
    /// The underlying store error
    pub error: StoreError,
}

/// Outcome of a best-effort batch in which some operations failed.
///
/// `completed` is still a coherent, order-sorted list; callers recover it
/// so a partial failure never fails the parent write.
#[derive(Debug)]
pub struct PartialFailure {
    /// Records that landed, sorted by order
    pub completed: Vec<ChildRecord>,
    /// Operations that were caught, logged, and excluded
    pub failed: Vec<OperationFailure>,
}

/// Errors surfaced by an execution strategy.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{} child operations failed", .0.failed.len())]
    Partial(PartialFailure),

    #[error("child batch aborted and rolled back: {source}")]
    TransactionAborted {
        #[source]
        source: StoreError,
    },
}

/// Applies a diff against storage for one parent record.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Apply the diff and return the resulting records in proposed order.
    async fn apply(
        &self,
        diff: DiffResult,
        parent: &RecordId,
        ctx: &OperationContext,
    ) -> std::result::Result<Vec<ChildRecord>, ApplyError>;
}

pub(crate) fn sort_by_order(records: &mut [ChildRecord]) {
    records.sort_by_key(|record| record.order);
}
