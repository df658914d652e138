//! Direct strategy against raw storage.
//!
//! Bypasses the record-store API: no validation, no downstream hooks.
//! When constructed transactional (and the backend supports it), the
//! whole batch lands in one transaction; any failure rolls everything
//! back and surfaces a single error. Non-transactional runs are
//! best-effort, like the API strategy.

use super::{sort_by_order, ApplyError, ChildOp, ExecutionStrategy, OperationFailure, PartialFailure};
use crate::storage::{DirectStorage, TransactionId};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use stitch_engine::{ChildRecord, DiffResult, OperationContext, RecordId, RelationSchema};

/// Applies a diff straight against a [`DirectStorage`] backend.
pub struct DirectStrategy<S> {
    storage: Arc<S>,
    relation: Arc<RelationSchema>,
    transactional: bool,
}

struct BatchOutcome {
    completed: Vec<ChildRecord>,
    failed: Vec<OperationFailure>,
}

impl<S: DirectStorage> DirectStrategy<S> {
    /// Create a strategy bound to one backend and relation.
    ///
    /// `transactional` selects all-or-nothing batches; it is ignored when
    /// the backend declares no transaction support.
    pub fn new(storage: Arc<S>, relation: Arc<RelationSchema>, transactional: bool) -> Self {
        Self {
            storage,
            relation,
            transactional,
        }
    }

    async fn run_batch(
        &self,
        diff: DiffResult,
        parent: &RecordId,
        txn: Option<TransactionId>,
    ) -> BatchOutcome {
        let DiffResult {
            to_create,
            to_update,
            to_delete,
            unchanged,
            ..
        } = diff;

        let child = self.relation.child_collection.as_str();
        let mut completed: Vec<ChildRecord> = unchanged;
        let mut failed: Vec<OperationFailure> = Vec::new();

        // Same class ordering as the API strategy: deletes and updates
        // joined first, creates afterwards.
        let delete_futs = to_delete.iter().map(|record| async move {
            let result = self.storage.delete_raw(child, &record.id, txn).await;
            (record, result)
        });
        let update_futs = to_update.iter().map(|write| async move {
            let data = self
                .relation
                .write_payload(&write.payload, write.order, parent);
            let result = self.storage.update_raw(child, &write.id, data, txn).await;
            (write, result)
        });
        let (delete_results, update_results) =
            futures::join!(join_all(delete_futs), join_all(update_futs));

        for (record, result) in delete_results {
            if let Err(error) = result {
                tracing::warn!(id = %record.id, %error, "raw child delete failed");
                failed.push(OperationFailure {
                    op: ChildOp::Delete,
                    id: Some(record.id.clone()),
                    order: None,
                    error,
                });
            }
        }

        for (write, result) in update_results {
            match result.and_then(|doc| Ok(self.relation.child_from_doc(&doc)?)) {
                Ok(mut record) => {
                    record.order = write.order;
                    completed.push(record);
                }
                Err(error) => {
                    tracing::warn!(id = %write.id, %error, "raw child update failed");
                    failed.push(OperationFailure {
                        op: ChildOp::Update,
                        id: Some(write.id.clone()),
                        order: Some(write.order),
                        error,
                    });
                }
            }
        }

        let create_futs = to_create.iter().map(|create| async move {
            let data = self
                .relation
                .write_payload(&create.payload, create.order, parent);
            let result = self.storage.create_raw(child, data, txn).await;
            (create, result)
        });
        for (create, result) in join_all(create_futs).await {
            match result.and_then(|doc| Ok(self.relation.child_from_doc(&doc)?)) {
                Ok(mut record) => {
                    record.order = create.order;
                    completed.push(record);
                }
                Err(error) => {
                    tracing::warn!(order = create.order, %error, "raw child create failed");
                    failed.push(OperationFailure {
                        op: ChildOp::Create,
                        id: None,
                        order: Some(create.order),
                        error,
                    });
                }
            }
        }

        sort_by_order(&mut completed);
        BatchOutcome { completed, failed }
    }
}

#[async_trait]
impl<S: DirectStorage + 'static> ExecutionStrategy for DirectStrategy<S> {
    async fn apply(
        &self,
        diff: DiffResult,
        parent: &RecordId,
        _ctx: &OperationContext,
    ) -> std::result::Result<Vec<ChildRecord>, ApplyError> {
        if self.transactional && self.storage.supports_transactions() {
            let txn = self
                .storage
                .begin()
                .await
                .map_err(|source| ApplyError::TransactionAborted { source })?;

            let mut outcome = self.run_batch(diff, parent, Some(txn)).await;
            if outcome.failed.is_empty() {
                self.storage
                    .commit(txn)
                    .await
                    .map_err(|source| ApplyError::TransactionAborted { source })?;
                return Ok(outcome.completed);
            }

            if let Err(error) = self.storage.rollback(txn).await {
                tracing::error!(%error, "rollback failed after aborted child batch");
            }
            let source = outcome.failed.swap_remove(0).error;
            return Err(ApplyError::TransactionAborted { source });
        }

        let outcome = self.run_batch(diff, parent, None).await;
        if outcome.failed.is_empty() {
            Ok(outcome.completed)
        } else {
            Err(ApplyError::Partial(PartialFailure {
                completed: outcome.completed,
                failed: outcome.failed,
            }))
        }
    }
}
