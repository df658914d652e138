//! In-memory record store.
//!
//! Implements both halves of the storage contract: the hook-firing
//! [`RecordStore`] API and the hook-free [`DirectStorage`] surface with
//! buffered transactions (writes staged under a transaction apply on
//! commit and vanish on rollback). Backs the test suites and lets
//! embedders run without a database.

use crate::error::{Result, StoreError};
use crate::storage::{DirectStorage, TransactionId};
use crate::store::{Filter, LifecycleHooks, RecordStore, Sort, Target};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use stitch_engine::{OperationContext, WriteKind};

#[derive(Debug, Clone)]
enum StagedWrite {
    Create {
        collection: String,
        id: String,
        doc: Value,
    },
    Update {
        collection: String,
        id: String,
        patch: Map<String, Value>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// In-memory store with per-collection hook dispatch.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    hooks: RwLock<HashMap<String, Vec<Arc<dyn LifecycleHooks>>>>,
    txns: Mutex<HashMap<TransactionId, Vec<StagedWrite>>>,
    next_txn: AtomicU64,
    mutations: Mutex<HashMap<String, u64>>,
}

impl MemoryStore {
    /// Create an empty store. Collections come into existence on first
    /// write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach lifecycle hooks to a collection.
    pub fn register_hooks(&self, collection: impl Into<String>, hooks: Arc<dyn LifecycleHooks>) {
        self.lock_hooks()
            .entry(collection.into())
            .or_default()
            .push(hooks);
    }

    /// Number of writes (create/update/delete) applied to a collection.
    pub fn mutation_count(&self, collection: &str) -> u64 {
        self.lock_mutations().get(collection).copied().unwrap_or(0)
    }

    fn lock_collections(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, BTreeMap<String, Value>>> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_collections(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, BTreeMap<String, Value>>> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_hooks(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Arc<dyn LifecycleHooks>>>> {
        self.hooks.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_txns(&self) -> MutexGuard<'_, HashMap<TransactionId, Vec<StagedWrite>>> {
        self.txns.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_mutations(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.mutations.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn hooks_for(&self, collection: &str) -> Vec<Arc<dyn LifecycleHooks>> {
        self.hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn bump(&self, collection: &str) {
        *self.lock_mutations().entry(collection.to_string()).or_insert(0) += 1;
    }

    fn insert_doc(&self, collection: &str, id: String, doc: Value) {
        self.lock_collections()
            .entry(collection.to_string())
            .or_default()
            .insert(id, doc);
    }

    fn get_doc(&self, collection: &str, id: &str) -> Option<Value> {
        self.read_collections()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    fn remove_doc(&self, collection: &str, id: &str) -> Option<Value> {
        self.lock_collections()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
    }

    fn matching_ids(&self, collection: &str, target: &Target) -> Vec<String> {
        let collections = self.read_collections();
        let Some(docs) = collections.get(collection) else {
            return Vec::new();
        };
        match target {
            Target::Id(id) => {
                if docs.contains_key(id) {
                    vec![id.clone()]
                } else {
                    Vec::new()
                }
            }
            Target::Eq(field, value) => docs
                .iter()
                .filter(|(_, doc)| doc.get(field.as_str()) == Some(value))
                .map(|(id, _)| id.clone())
                .collect(),
        }
    }

    /// Merge a patch into a stored document. Returns (previous, updated).
    fn merge_into(
        &self,
        collection: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<(Value, Value)> {
        let mut collections = self.lock_collections();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let previous = doc.clone();
        if let Value::Object(fields) = doc {
            apply_patch(fields, patch);
        }
        Ok((previous, doc.clone()))
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn apply_patch(fields: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if key == "id" {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }
    fields.insert("updatedAt".to_string(), Value::from(now_millis()));
}

fn as_object(data: Value) -> Result<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Backend("record data must be an object".into())),
    }
}

fn new_doc(data: Value) -> Result<(String, Value)> {
    let mut doc = as_object(data)?;
    let id = uuid::Uuid::new_v4().to_string();
    doc.insert("id".to_string(), Value::String(id.clone()));
    let now = Value::from(now_millis());
    doc.insert("createdAt".to_string(), now.clone());
    doc.insert("updatedAt".to_string(), now);
    Ok((id, Value::Object(doc)))
}

fn target_desc(target: &Target) -> String {
    match target {
        Target::Id(id) => id.clone(),
        Target::Eq(field, value) => format!("{field}={value}"),
    }
}

fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    let (left, right) = (a.get(field), b.get(field));
    match (
        left.and_then(Value::as_i64),
        right.and_then(Value::as_i64),
    ) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => left
            .and_then(Value::as_str)
            .unwrap_or("")
            .cmp(right.and_then(Value::as_str).unwrap_or("")),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find(&self, collection: &str, filter: &Filter, sort: &Sort) -> Result<Vec<Value>> {
        let mut docs: Vec<Value> = {
            let collections = self.read_collections();
            let Some(docs) = collections.get(collection) else {
                return Ok(Vec::new());
            };
            docs.values()
                .filter(|doc| match filter {
                    Filter::All => true,
                    Filter::Eq(field, value) => doc.get(field.as_str()) == Some(value),
                })
                .cloned()
                .collect()
        };

        if let Sort::Asc(field) = sort {
            docs.sort_by(|a, b| compare_field(a, b, field));
        }

        Ok(docs)
    }

    async fn create(
        &self,
        collection: &str,
        data: Value,
        ctx: &OperationContext,
    ) -> Result<Value> {
        let mut data = data;
        for hook in self.hooks_for(collection) {
            data = hook.before_write(data, WriteKind::Create, ctx).await?;
        }

        let (id, doc) = new_doc(data)?;
        self.insert_doc(collection, id, doc.clone());
        self.bump(collection);

        let mut result = doc;
        for hook in self.hooks_for(collection) {
            result = hook.after_write(result, None, WriteKind::Create, ctx).await?;
        }
        Ok(result)
    }

    async fn update(
        &self,
        collection: &str,
        target: &Target,
        data: Value,
        ctx: &OperationContext,
    ) -> Result<Value> {
        let mut data = data;
        for hook in self.hooks_for(collection) {
            data = hook.before_write(data, WriteKind::Update, ctx).await?;
        }
        let patch = as_object(data)?;

        let ids = self.matching_ids(collection, target);
        if ids.is_empty() {
            return Err(StoreError::NotFound(target_desc(target)));
        }

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let (previous, updated) = self.merge_into(collection, &id, &patch)?;
            self.bump(collection);

            let mut doc = updated;
            for hook in self.hooks_for(collection) {
                doc = hook
                    .after_write(doc, Some(&previous), WriteKind::Update, ctx)
                    .await?;
            }
            results.push(doc);
        }
        Ok(results.swap_remove(0))
    }

    async fn delete(
        &self,
        collection: &str,
        target: &Target,
        _ctx: &OperationContext,
    ) -> Result<()> {
        let ids = self.matching_ids(collection, target);
        if ids.is_empty() {
            return Err(StoreError::NotFound(target_desc(target)));
        }
        for id in ids {
            self.remove_doc(collection, &id);
            self.bump(collection);
        }
        Ok(())
    }
}

#[async_trait]
impl DirectStorage for MemoryStore {
    fn supports_transactions(&self) -> bool {
        true
    }

    async fn begin(&self) -> Result<TransactionId> {
        let id = self.next_txn.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.lock_txns().insert(id, Vec::new());
        Ok(id)
    }

    async fn commit(&self, txn: TransactionId) -> Result<()> {
        let staged = self
            .lock_txns()
            .remove(&txn)
            .ok_or(StoreError::UnknownTransaction(txn))?;
        for write in staged {
            match write {
                StagedWrite::Create { collection, id, doc } => {
                    self.insert_doc(&collection, id, doc);
                    self.bump(&collection);
                }
                StagedWrite::Update {
                    collection,
                    id,
                    patch,
                } => {
                    self.merge_into(&collection, &id, &patch)?;
                    self.bump(&collection);
                }
                StagedWrite::Delete { collection, id } => {
                    self.remove_doc(&collection, &id);
                    self.bump(&collection);
                }
            }
        }
        Ok(())
    }

    async fn rollback(&self, txn: TransactionId) -> Result<()> {
        self.lock_txns()
            .remove(&txn)
            .ok_or(StoreError::UnknownTransaction(txn))?;
        Ok(())
    }

    async fn create_raw(
        &self,
        collection: &str,
        data: Value,
        txn: Option<TransactionId>,
    ) -> Result<Value> {
        let (id, doc) = new_doc(data)?;
        match txn {
            Some(txn_id) => {
                let mut txns = self.lock_txns();
                let staged = txns
                    .get_mut(&txn_id)
                    .ok_or(StoreError::UnknownTransaction(txn_id))?;
                staged.push(StagedWrite::Create {
                    collection: collection.to_string(),
                    id,
                    doc: doc.clone(),
                });
            }
            None => {
                self.insert_doc(collection, id, doc.clone());
                self.bump(collection);
            }
        }
        Ok(doc)
    }

    async fn update_raw(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        txn: Option<TransactionId>,
    ) -> Result<Value> {
        let patch = as_object(data)?;
        match txn {
            Some(txn_id) => {
                // Validate now; the merge itself lands on commit. The
                // returned document is an optimistic preview.
                let current = self
                    .get_doc(collection, id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                let mut preview = as_object(current)?;
                apply_patch(&mut preview, &patch);

                let mut txns = self.lock_txns();
                let staged = txns
                    .get_mut(&txn_id)
                    .ok_or(StoreError::UnknownTransaction(txn_id))?;
                staged.push(StagedWrite::Update {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    patch,
                });
                Ok(Value::Object(preview))
            }
            None => {
                let (_, updated) = self.merge_into(collection, id, &patch)?;
                self.bump(collection);
                Ok(updated)
            }
        }
    }

    async fn delete_raw(
        &self,
        collection: &str,
        id: &str,
        txn: Option<TransactionId>,
    ) -> Result<()> {
        match txn {
            Some(txn_id) => {
                if self.get_doc(collection, id).is_none() {
                    return Err(StoreError::NotFound(id.to_string()));
                }
                let mut txns = self.lock_txns();
                let staged = txns
                    .get_mut(&txn_id)
                    .ok_or(StoreError::UnknownTransaction(txn_id))?;
                staged.push(StagedWrite::Delete {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
                Ok(())
            }
            None => {
                self.remove_doc(collection, id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                self.bump(collection);
                Ok(())
            }
        }
    }
}
