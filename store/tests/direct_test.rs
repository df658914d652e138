//! Tests for the Direct strategy: raw-storage batches, hook-free link
//! writes, and transactional all-or-nothing semantics.

use serde_json::{json, Value};
use std::sync::Arc;
use stitch_engine::{OperationContext, RelationConfig, RelationSchema};
use stitch_store::{
    DirectStorage, DirectStrategy, Filter, MemoryStore, RecordStore, RelationHooks, Sort,
    StoreError, Target, TransactionId,
};

fn sale_relation() -> Arc<RelationSchema> {
    Arc::new(
        RelationConfig::new("sales", "saleItems")
            .link_field("items")
            .reverse_field("sale")
            .build()
            .unwrap(),
    )
}

fn setup_direct(transactional: bool) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let relation = sale_relation();
    let strategy = Arc::new(DirectStrategy::new(
        store.clone(),
        relation.clone(),
        transactional,
    ));
    let hooks = Arc::new(
        RelationHooks::new(relation, store.clone(), strategy)
            .with_direct_link_writes(store.clone()),
    );
    store.register_hooks("sales", hooks);
    store
}

async fn children_of(store: &MemoryStore, parent: &str) -> Vec<Value> {
    store
        .find("saleItems", &Filter::eq("sale", parent), &Sort::asc("order"))
        .await
        .unwrap()
}

#[tokio::test]
async fn direct_create_flow() {
    let store = setup_direct(false);

    let doc = store
        .create(
            "sales",
            json!({
                "itemsArray": [
                    {"sku": "apple", "qty": 2},
                    {"sku": "pear", "qty": 5},
                ],
            }),
            &OperationContext::new(),
        )
        .await
        .unwrap();
    let parent_id = doc["id"].as_str().unwrap();

    let children = children_of(&store, parent_id).await;
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["sku"], "apple");
    assert_eq!(children[0]["order"], 1);
    assert_eq!(children[1]["order"], 2);

    // The link landed through raw storage.
    let parents = store
        .find("sales", &Filter::eq("id", parent_id), &Sort::None)
        .await
        .unwrap();
    let link = parents[0]["items"].as_array().unwrap();
    assert_eq!(link.len(), 2);
}

#[tokio::test]
async fn direct_update_flow() {
    let store = setup_direct(false);

    let doc = store
        .create(
            "sales",
            json!({"itemsArray": [{"sku": "apple"}, {"sku": "pear"}]}),
            &OperationContext::new(),
        )
        .await
        .unwrap();
    let parent_id = doc["id"].as_str().unwrap().to_string();

    let before = children_of(&store, &parent_id).await;
    let pear_id = before[1]["id"].as_str().unwrap().to_string();

    store
        .update(
            "sales",
            &Target::id(&parent_id),
            json!({
                "itemsArray": [
                    {"id": pear_id, "sku": "pear", "note": "kept"},
                    {"sku": "plum"},
                ],
            }),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    let after = children_of(&store, &parent_id).await;
    assert_eq!(after.len(), 2);
    assert_eq!(after[0]["id"], pear_id.as_str());
    assert_eq!(after[0]["note"], "kept");
    assert_eq!(after[0]["order"], 1);
    assert_eq!(after[1]["sku"], "plum");
    assert_eq!(after[1]["order"], 2);
}

#[tokio::test]
async fn transactional_batch_commits_on_success() {
    let store = setup_direct(true);

    let doc = store
        .create(
            "sales",
            json!({"itemsArray": [{"sku": "apple"}, {"sku": "pear"}]}),
            &OperationContext::new(),
        )
        .await
        .unwrap();
    let parent_id = doc["id"].as_str().unwrap().to_string();

    let children = children_of(&store, &parent_id).await;
    assert_eq!(children.len(), 2);

    // Replace the whole list inside one transaction.
    store
        .update(
            "sales",
            &Target::id(&parent_id),
            json!({"itemsArray": [{"sku": "plum"}]}),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    let after = children_of(&store, &parent_id).await;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0]["sku"], "plum");
    assert_eq!(after[0]["order"], 1);
}

// ============================================================================
// Transactional semantics
// ============================================================================

/// Storage that fails any raw create whose payload carries `explode`.
struct TripwireStorage {
    inner: Arc<MemoryStore>,
}

#[async_trait::async_trait]
impl DirectStorage for TripwireStorage {
    fn supports_transactions(&self) -> bool {
        self.inner.supports_transactions()
    }

    async fn begin(&self) -> stitch_store::Result<TransactionId> {
        self.inner.begin().await
    }

    async fn commit(&self, txn: TransactionId) -> stitch_store::Result<()> {
        self.inner.commit(txn).await
    }

    async fn rollback(&self, txn: TransactionId) -> stitch_store::Result<()> {
        self.inner.rollback(txn).await
    }

    async fn create_raw(
        &self,
        collection: &str,
        data: Value,
        txn: Option<TransactionId>,
    ) -> stitch_store::Result<Value> {
        if data.get("explode").and_then(Value::as_bool).unwrap_or(false) {
            return Err(StoreError::Backend("tripwire".into()));
        }
        self.inner.create_raw(collection, data, txn).await
    }

    async fn update_raw(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        txn: Option<TransactionId>,
    ) -> stitch_store::Result<Value> {
        self.inner.update_raw(collection, id, data, txn).await
    }

    async fn delete_raw(
        &self,
        collection: &str,
        id: &str,
        txn: Option<TransactionId>,
    ) -> stitch_store::Result<()> {
        self.inner.delete_raw(collection, id, txn).await
    }
}

fn setup_tripwire(transactional: bool) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let relation = sale_relation();
    let tripwire = Arc::new(TripwireStorage {
        inner: store.clone(),
    });
    let strategy = Arc::new(DirectStrategy::new(tripwire, relation.clone(), transactional));
    let hooks = Arc::new(
        RelationHooks::new(relation, store.clone(), strategy)
            .with_direct_link_writes(store.clone()),
    );
    store.register_hooks("sales", hooks);
    store
}

#[tokio::test]
async fn transactional_batch_rolls_back_entirely() {
    let store = setup_tripwire(true);

    let doc = store
        .create(
            "sales",
            json!({"itemsArray": [{"sku": "seed"}]}),
            &OperationContext::new(),
        )
        .await
        .unwrap();
    let parent_id = doc["id"].as_str().unwrap().to_string();
    let seed_children = children_of(&store, &parent_id).await;
    assert_eq!(seed_children.len(), 1);

    // The batch deletes the seed and creates two records, one of which
    // fails. All-or-nothing: the seed must survive untouched.
    let result = store
        .update(
            "sales",
            &Target::id(&parent_id),
            json!({
                "itemsArray": [
                    {"sku": "good"},
                    {"sku": "bad", "explode": true},
                ],
            }),
            &OperationContext::new(),
        )
        .await;

    assert!(
        matches!(result, Err(StoreError::Batch(_))),
        "transactional failure must surface as a hard error"
    );

    let after = children_of(&store, &parent_id).await;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0]["sku"], "seed");
    assert_eq!(after[0]["id"], seed_children[0]["id"]);
}

#[tokio::test]
async fn non_transactional_direct_stays_best_effort() {
    let store = setup_tripwire(false);

    let doc = store
        .create(
            "sales",
            json!({"itemsArray": [{"sku": "seed"}]}),
            &OperationContext::new(),
        )
        .await
        .unwrap();
    let parent_id = doc["id"].as_str().unwrap().to_string();

    // Same batch, non-transactional: the failing create is excluded, the
    // rest of the batch lands, and the parent write succeeds.
    store
        .update(
            "sales",
            &Target::id(&parent_id),
            json!({
                "itemsArray": [
                    {"sku": "good"},
                    {"sku": "bad", "explode": true},
                ],
            }),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    let after = children_of(&store, &parent_id).await;
    let skus: Vec<&str> = after.iter().map(|c| c["sku"].as_str().unwrap()).collect();
    assert_eq!(skus, vec!["good"]);

    let parents = store
        .find("sales", &Filter::eq("id", parent_id.as_str()), &Sort::None)
        .await
        .unwrap();
    assert_eq!(parents[0]["items"].as_array().unwrap().len(), 1);
}
