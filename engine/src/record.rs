//! Record types for the denormalized list and its persisted children.

use crate::{OrderIndex, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the engine-managed ordering field on child records.
pub const ORDER_FIELD: &str = "order";

/// A persisted child record belonging to one parent.
///
/// `order` is dense, 1-based, and assigned by the engine; it is never
/// user-supplied. The payload holds the open set of domain fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecord {
    /// Unique identifier for this record
    pub id: RecordId,
    /// Foreign key to the owning parent record
    pub parent: RecordId,
    /// 1-based position in the parent's list
    pub order: OrderIndex,
    /// The domain payload (JSON object)
    pub payload: Value,
}

impl ChildRecord {
    /// Create a new child record.
    pub fn new(
        id: impl Into<RecordId>,
        parent: impl Into<RecordId>,
        order: OrderIndex,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            parent: parent.into(),
            order,
            payload,
        }
    }
}

/// One entry of a proposed list, as submitted by a caller.
///
/// The identifier may be absent (a new item), present and owned by the
/// parent (an update), or stale/foreign (sanitized into a create by the
/// diff engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedItem {
    /// Identifier of the record this item claims to be, if any
    pub id: Option<RecordId>,
    /// The domain payload (JSON object)
    pub payload: Value,
}

impl ProposedItem {
    /// Create a proposed item without an identifier (a new record).
    pub fn new(payload: Value) -> Self {
        Self { id: None, payload }
    }

    /// Create a proposed item claiming an existing identifier.
    pub fn existing(id: impl Into<RecordId>, payload: Value) -> Self {
        Self {
            id: Some(id.into()),
            payload,
        }
    }

    /// Parse a proposed item out of a raw list entry.
    ///
    /// An `id` key is pulled out of the object; the remaining fields become
    /// the payload. Non-object entries are kept as identifier-less payloads.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let id = map.get("id").and_then(id_from_value);
                let payload = Value::Object(
                    map.iter()
                        .filter(|(key, _)| key.as_str() != "id")
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect(),
                );
                Self { id, payload }
            }
            other => Self {
                id: None,
                payload: other.clone(),
            },
        }
    }
}

/// Read an identifier out of a JSON value.
///
/// Identifiers arrive as strings or numbers depending on the backing store.
pub fn id_from_value(value: &Value) -> Option<RecordId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
