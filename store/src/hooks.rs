//! Hook orchestration for one parent/child relation.
//!
//! Wires the diff engine, the reentrancy guard, and an execution strategy
//! into a record store's write lifecycle:
//!
//! 1. `before_write` pops the denormalized array out of the incoming
//!    payload, snapshots it into the context, and stamps the phase
//! 2. the store persists the parent write
//! 3. `after_write` checks the guard, fetches the persisted children,
//!    computes the diff, and applies it through the strategy
//! 4. one housekeeping write persists the surviving child ids into the
//!    parent's link field; its own pass through the chain is suppressed
//!
//! When a [`DirectStorage`] backend is configured, the housekeeping write
//! goes straight to storage and never re-enters the hook pipeline at all.

use crate::error::Result;
use crate::locks::ParentLocks;
use crate::storage::DirectStorage;
use crate::store::{Filter, LifecycleHooks, RecordStore, Sort, Target};
use crate::strategy::{ApplyError, ExecutionStrategy};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use stitch_engine::{
    compute_diff, id_from_value, ChildRecord, OperationContext, ProposedItem, RelationSchema,
    WriteKind, ORDER_FIELD,
};

/// Lifecycle hooks reconciling one relation's child records.
pub struct RelationHooks {
    relation: Arc<RelationSchema>,
    store: Arc<dyn RecordStore>,
    strategy: Arc<dyn ExecutionStrategy>,
    direct: Option<Arc<dyn DirectStorage>>,
    locks: ParentLocks,
}

impl RelationHooks {
    /// Wire a relation to a store and an execution strategy.
    pub fn new(
        relation: Arc<RelationSchema>,
        store: Arc<dyn RecordStore>,
        strategy: Arc<dyn ExecutionStrategy>,
    ) -> Self {
        Self {
            relation,
            store,
            strategy,
            direct: None,
            locks: ParentLocks::new(),
        }
    }

    /// Route the housekeeping link write through raw storage, so it never
    /// re-enters the hook pipeline.
    pub fn with_direct_link_writes(mut self, storage: Arc<dyn DirectStorage>) -> Self {
        self.direct = Some(storage);
        self
    }

    async fn fetch_children(&self, parent: &str) -> Result<Vec<ChildRecord>> {
        let docs = self
            .store
            .find(
                &self.relation.child_collection,
                &Filter::eq(self.relation.reverse_field.clone(), parent),
                &Sort::asc(ORDER_FIELD),
            )
            .await?;
        docs.iter()
            .map(|doc| Ok(self.relation.child_from_doc(doc)?))
            .collect()
    }

    /// Persist the surviving child ids into the parent's link field.
    async fn persist_link(
        &self,
        parent: &str,
        records: &[ChildRecord],
        kind: WriteKind,
        ctx: &OperationContext,
    ) -> Result<Value> {
        let ids: Vec<Value> = records
            .iter()
            .map(|record| Value::String(record.id.clone()))
            .collect();
        let mut data = serde_json::Map::new();
        data.insert(self.relation.link_field.clone(), Value::Array(ids));
        let data = Value::Object(data);

        match &self.direct {
            Some(storage) => {
                storage
                    .update_raw(&self.relation.parent_collection, parent, data, None)
                    .await
            }
            None => {
                let child_ctx = ctx.housekeeping_child(kind);
                self.store
                    .update(
                        &self.relation.parent_collection,
                        &Target::Id(parent.to_string()),
                        data,
                        &child_ctx,
                    )
                    .await
            }
        }
    }
}

fn parse_proposed(value: &Value) -> Option<Vec<ProposedItem>> {
    match value {
        Value::Array(items) => Some(items.iter().map(ProposedItem::from_value).collect()),
        _ => {
            tracing::warn!("denormalized array field is not an array; ignoring");
            None
        }
    }
}

#[async_trait]
impl LifecycleHooks for RelationHooks {
    async fn before_write(
        &self,
        data: Value,
        kind: WriteKind,
        ctx: &OperationContext,
    ) -> Result<Value> {
        // The engine's own housekeeping write; flags propagate untouched.
        if ctx.is_passthrough() {
            return Ok(data);
        }

        let mut data = data;
        let proposed = match &mut data {
            // The array is not a persisted parent column; it is lifted out
            // of the payload and carried on the context.
            Value::Object(map) => map
                .remove(&self.relation.array_field)
                .as_ref()
                .and_then(parse_proposed),
            _ => None,
        };
        ctx.observe_before_write(kind, proposed);
        Ok(data)
    }

    async fn after_write(
        &self,
        doc: Value,
        _previous: Option<&Value>,
        kind: WriteKind,
        ctx: &OperationContext,
    ) -> Result<Value> {
        if !ctx.should_reconcile(kind) {
            return Ok(doc);
        }
        let Some(proposed) = ctx.take_snapshot() else {
            return Ok(doc);
        };
        let Some(parent_id) = doc.get("id").and_then(id_from_value) else {
            tracing::warn!("parent document has no identifier; skipping reconciliation");
            return Ok(doc);
        };

        // Phase flags are request-scoped; concurrent writes to the same
        // parent must not interleave.
        let _guard = self
            .locks
            .acquire(&self.relation.parent_collection, &parent_id)
            .await;

        let original = self.fetch_children(&parent_id).await?;
        let diff = compute_diff(&original, &proposed, self.relation.projection());
        tracing::debug!(
            parent = %parent_id,
            creates = diff.to_create.len(),
            updates = diff.to_update.len(),
            deletes = diff.to_delete.len(),
            unchanged = diff.unchanged.len(),
            "applying child diff"
        );
        ctx.mark_reconciled(kind);

        let records = match self.strategy.apply(diff, &parent_id, ctx).await {
            Ok(records) => records,
            Err(ApplyError::Partial(partial)) => {
                tracing::warn!(
                    parent = %parent_id,
                    failed = partial.failed.len(),
                    "child batch partially failed; returning completed records"
                );
                partial.completed
            }
            Err(err @ ApplyError::TransactionAborted { .. }) => return Err(err.into()),
        };

        let mut result = self.persist_link(&parent_id, &records, kind, ctx).await?;
        ctx.mark_link_finished(kind);

        if let Value::Object(map) = &mut result {
            let docs: Vec<Value> = records
                .iter()
                .map(|record| self.relation.child_to_doc(record))
                .collect();
            map.insert(self.relation.array_field.clone(), Value::Array(docs));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_proposed_from_array() {
        let items = parse_proposed(&json!([
            {"id": "a", "sku": "apple"},
            {"sku": "pear"},
        ]))
        .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id.as_deref(), Some("a"));
        assert_eq!(items[1].id, None);
    }

    #[test]
    fn parse_proposed_rejects_non_arrays() {
        assert!(parse_proposed(&json!({"sku": "apple"})).is_none());
        assert!(parse_proposed(&json!(null)).is_none());
        assert!(parse_proposed(&json!("items")).is_none());
    }
}
