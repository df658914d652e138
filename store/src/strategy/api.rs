//! Best-effort strategy over the full record-store API.
//!
//! Every sub-operation goes through [`RecordStore`], so validation and any
//! hooks registered on the child collection run normally. Failures are
//! isolated: each one is caught, logged, and excluded from the result.

use super::{sort_by_order, ApplyError, ChildOp, ExecutionStrategy, OperationFailure, PartialFailure};
use crate::store::{RecordStore, Target};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use stitch_engine::{ChildRecord, DiffResult, OperationContext, RecordId, RelationSchema};

/// Applies a diff through the record-store API, best-effort.
pub struct ApiStrategy<S> {
    store: Arc<S>,
    relation: Arc<RelationSchema>,
}

impl<S: RecordStore> ApiStrategy<S> {
    /// Create a strategy bound to one store and relation.
    pub fn new(store: Arc<S>, relation: Arc<RelationSchema>) -> Self {
        Self { store, relation }
    }
}

#[async_trait]
impl<S: RecordStore + 'static> ExecutionStrategy for ApiStrategy<S> {
    async fn apply(
        &self,
        diff: DiffResult,
        parent: &RecordId,
        ctx: &OperationContext,
    ) -> std::result::Result<Vec<ChildRecord>, ApplyError> {
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

        // Deletes and updates launch together; creates wait for the join
        // so freed uniqueness slots are available to them.
        let delete_futs = to_delete.iter().map(|record| async move {
            let result = self
                .store
                .delete(child, &Target::Id(record.id.clone()), ctx)
                .await;
            (record, result)
        });
        let update_futs = to_update.iter().map(|write| async move {
            let data = self
                .relation
                .write_payload(&write.payload, write.order, parent);
            let result = self
                .store
                .update(child, &Target::Id(write.id.clone()), data, ctx)
                .await;
            (write, result)
        });
        let (delete_results, update_results) =
            futures::join!(join_all(delete_futs), join_all(update_futs));

        for (record, result) in delete_results {
            if let Err(error) = result {
                tracing::warn!(id = %record.id, %error, "child delete failed; excluded from batch");
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
                    tracing::warn!(id = %write.id, %error, "child update failed; excluded from batch");
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
            let result = self.store.create(child, data, ctx).await;
            (create, result)
        });
        for (create, result) in join_all(create_futs).await {
            match result.and_then(|doc| Ok(self.relation.child_from_doc(&doc)?)) {
                Ok(mut record) => {
                    record.order = create.order;
                    completed.push(record);
                }
                Err(error) => {
                    tracing::warn!(order = create.order, %error, "child create failed; excluded from batch");
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

        if failed.is_empty() {
            Ok(completed)
        } else {
            Err(ApplyError::Partial(PartialFailure { completed, failed }))
        }
    }
}
