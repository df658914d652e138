//! The record-store contract consumed by the reconciliation engine.
//!
//! The surrounding store is a collaborator, not something this crate
//! implements in full: the engine only needs find/create/update/delete
//! plus before/after write hooks fired on every mutation, with a shared
//! [`OperationContext`] passed down the entire hook chain of one request.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stitch_engine::{FieldName, OperationContext, RecordId, WriteKind};

/// Filter for record queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    /// Every record in the collection
    All,
    /// Records whose field equals the given value
    Eq(FieldName, Value),
}

impl Filter {
    /// Equality filter on a single field.
    pub fn eq(field: impl Into<FieldName>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }
}

/// Sort order for record queries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Sort {
    /// Backend iteration order
    #[default]
    None,
    /// Ascending by the given field
    Asc(FieldName),
}

impl Sort {
    /// Ascending sort on a single field.
    pub fn asc(field: impl Into<FieldName>) -> Self {
        Sort::Asc(field.into())
    }
}

/// Target of an update or delete: a concrete id or a one-field filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    Id(RecordId),
    Eq(FieldName, Value),
}

impl Target {
    /// Target a record by id.
    pub fn id(id: impl Into<RecordId>) -> Self {
        Target::Id(id.into())
    }
}

/// The record store the engine reconciles against.
///
/// Implementations fire the registered [`LifecycleHooks`] around every
/// create and update, passing the caller's context through unchanged.
/// Deletes do not carry a payload and dispatch no write hooks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Query records in a collection.
    async fn find(&self, collection: &str, filter: &Filter, sort: &Sort) -> Result<Vec<Value>>;

    /// Create a record, firing the write hook chain.
    async fn create(&self, collection: &str, data: Value, ctx: &OperationContext)
        -> Result<Value>;

    /// Update matching records, firing the write hook chain.
    ///
    /// Returns the first updated document.
    async fn update(
        &self,
        collection: &str,
        target: &Target,
        data: Value,
        ctx: &OperationContext,
    ) -> Result<Value>;

    /// Delete matching records.
    async fn delete(&self, collection: &str, target: &Target, ctx: &OperationContext)
        -> Result<()>;
}

/// Before/after write hooks attached to a collection.
///
/// `before_write` may rewrite the incoming data; `after_write` may rewrite
/// the outgoing document. The same mutable [`OperationContext`] is shared
/// across every hook invocation of one logical request, including nested
/// writes issued from inside a hook.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Runs before the store persists a write.
    async fn before_write(
        &self,
        data: Value,
        kind: WriteKind,
        ctx: &OperationContext,
    ) -> Result<Value>;

    /// Runs after the store persisted a write.
    async fn after_write(
        &self,
        doc: Value,
        previous: Option<&Value>,
        kind: WriteKind,
        ctx: &OperationContext,
    ) -> Result<Value>;
}
