//! Relation declarations and field projection.
//!
//! A relation ties a parent collection's editable list to a child
//! collection through a link field (parent side) and a reverse relation
//! field (child side). Declarations are validated once at setup; the
//! projection rules used by the diff engine are resolved here into a
//! static descriptor instead of being recomputed per request.

use crate::record::{id_from_value, ChildRecord, ORDER_FIELD};
use crate::{error::Result, CollectionName, Error, FieldName, OrderIndex, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Fields managed by the surrounding record store, never compared or
/// written by the engine.
pub const SERVER_MANAGED_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// Static set of fields stripped from payloads before comparison and
/// before write-back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionRules {
    ignored: BTreeSet<FieldName>,
}

impl ProjectionRules {
    /// Build projection rules from the server-managed fields plus any
    /// relation-specific exclusions.
    pub fn new(extra: impl IntoIterator<Item = FieldName>) -> Self {
        let mut ignored: BTreeSet<FieldName> = SERVER_MANAGED_FIELDS
            .iter()
            .map(|field| field.to_string())
            .collect();
        ignored.extend(extra);
        Self { ignored }
    }

    /// Check whether a field is excluded from comparison.
    pub fn is_ignored(&self, field: &str) -> bool {
        self.ignored.contains(field)
    }

    /// Strip ignored fields from a payload object.
    ///
    /// Non-object payloads pass through unchanged.
    pub fn project(&self, payload: &Value) -> Value {
        match payload {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(key, _)| !self.ignored.contains(key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for ProjectionRules {
    fn default() -> Self {
        Self::new([])
    }
}

/// Builder for a relation declaration.
#[derive(Debug, Clone)]
pub struct RelationConfig {
    parent_collection: CollectionName,
    child_collection: CollectionName,
    link_field: FieldName,
    reverse_field: FieldName,
    array_field: Option<FieldName>,
    ignored_fields: Vec<FieldName>,
}

impl RelationConfig {
    /// Start a declaration for a parent/child collection pair.
    pub fn new(
        parent_collection: impl Into<CollectionName>,
        child_collection: impl Into<CollectionName>,
    ) -> Self {
        Self {
            parent_collection: parent_collection.into(),
            child_collection: child_collection.into(),
            link_field: String::new(),
            reverse_field: String::new(),
            array_field: None,
            ignored_fields: Vec::new(),
        }
    }

    /// Name of the parent-side field persisting the linked child ids.
    pub fn link_field(mut self, name: impl Into<FieldName>) -> Self {
        self.link_field = name.into();
        self
    }

    /// Name of the child-side field pointing back at the parent.
    pub fn reverse_field(mut self, name: impl Into<FieldName>) -> Self {
        self.reverse_field = name.into();
        self
    }

    /// Name of the denormalized array field on the parent payload.
    ///
    /// Defaults to the link field name with an `Array` suffix.
    pub fn array_field(mut self, name: impl Into<FieldName>) -> Self {
        self.array_field = Some(name.into());
        self
    }

    /// Exclude an additional field from payload comparison.
    pub fn ignore_field(mut self, name: impl Into<FieldName>) -> Self {
        self.ignored_fields.push(name.into());
        self
    }

    /// Validate the declaration and resolve it into a schema.
    pub fn build(self) -> Result<RelationSchema> {
        if self.parent_collection.is_empty() {
            return Err(Error::EmptyDeclaration("parent collection"));
        }
        if self.child_collection.is_empty() {
            return Err(Error::EmptyDeclaration("child collection"));
        }
        if self.link_field.is_empty() {
            return Err(Error::EmptyDeclaration("link field"));
        }
        if self.reverse_field.is_empty() {
            return Err(Error::MissingReverseField(self.child_collection));
        }
        if self.parent_collection == self.child_collection {
            // Child writes would re-enter the parent's own hook chain.
            return Err(Error::SelfReferentialRelation(self.parent_collection));
        }

        for field in &self.ignored_fields {
            if field.as_str() == ORDER_FIELD
                || field.as_str() == self.reverse_field.as_str()
                || field.as_str() == self.link_field.as_str()
            {
                return Err(Error::ProtectedFieldIgnored(field.clone()));
            }
        }

        let array_field = self
            .array_field
            .unwrap_or_else(|| format!("{}Array", self.link_field));
        if array_field == self.link_field {
            return Err(Error::ArrayFieldCollision(array_field));
        }

        let projection = ProjectionRules::new(self.ignored_fields);

        Ok(RelationSchema {
            parent_collection: self.parent_collection,
            child_collection: self.child_collection,
            link_field: self.link_field,
            reverse_field: self.reverse_field,
            array_field,
            projection,
        })
    }
}

/// A validated relation declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSchema {
    /// Collection owning the editable list
    pub parent_collection: CollectionName,
    /// Collection holding the normalized child records
    pub child_collection: CollectionName,
    /// Parent-side field persisting the linked child ids
    pub link_field: FieldName,
    /// Child-side foreign-key field pointing back at the parent
    pub reverse_field: FieldName,
    /// Parent payload field carrying the denormalized list
    pub array_field: FieldName,
    projection: ProjectionRules,
}

impl RelationSchema {
    /// Projection rules resolved for this relation.
    pub fn projection(&self) -> &ProjectionRules {
        &self.projection
    }

    /// Read a stored child document into a [`ChildRecord`].
    ///
    /// The identifier, reverse relation field, and order are lifted out of
    /// the document; the remaining fields become the payload.
    pub fn child_from_doc(&self, doc: &Value) -> Result<ChildRecord> {
        let map = doc
            .as_object()
            .ok_or(Error::MalformedChildDocument("not an object"))?;
        let id = map
            .get("id")
            .and_then(id_from_value)
            .ok_or(Error::MalformedChildDocument("missing identifier"))?;
        let parent = map
            .get(self.reverse_field.as_str())
            .and_then(id_from_value)
            .unwrap_or_default();
        let order = map
            .get(ORDER_FIELD)
            .and_then(Value::as_u64)
            .unwrap_or(0) as OrderIndex;
        let payload = Value::Object(
            map.iter()
                .filter(|(key, _)| {
                    key.as_str() != "id"
                        && key.as_str() != ORDER_FIELD
                        && key.as_str() != self.reverse_field.as_str()
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        );

        Ok(ChildRecord {
            id,
            parent,
            order,
            payload,
        })
    }

    /// Render a [`ChildRecord`] back into document form.
    pub fn child_to_doc(&self, record: &ChildRecord) -> Value {
        let mut map = match &record.payload {
            Value::Object(fields) => fields.clone(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        map.insert("id".to_string(), Value::String(record.id.clone()));
        map.insert(
            self.reverse_field.clone(),
            Value::String(record.parent.clone()),
        );
        map.insert(ORDER_FIELD.to_string(), Value::from(record.order));
        Value::Object(map)
    }

    /// Build the document written for one create or update: the projected
    /// payload plus the engine-managed order and reverse relation fields.
    pub fn write_payload(&self, payload: &Value, order: OrderIndex, parent: &RecordId) -> Value {
        let mut map = match self.projection.project(payload) {
            Value::Object(fields) => fields,
            _ => serde_json::Map::new(),
        };
        map.insert(ORDER_FIELD.to_string(), Value::from(order));
        map.insert(self.reverse_field.clone(), Value::String(parent.clone()));
        Value::Object(map)
    }
}
