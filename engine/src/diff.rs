//! Diff computation between a persisted child list and a proposed list.
//!
//! This is the core of determinism. Given the children currently persisted
//! for one parent and the ordered list a caller proposes, this module
//! produces the minimal create/update/delete sets that reach the proposed
//! state.
//!
//! # Algorithm
//!
//! 1. Sanitize: strip identifiers that do not belong to the parent's
//!    current child set (the item demotes to a create)
//! 2. Project: remove server-managed and relation-ignored fields from both
//!    sides before comparing
//! 3. Classify each proposed item as create, update, or unchanged
//! 4. Any original record missing from the proposed list is deleted
//! 5. Stamp every surviving item's `order` with its 1-based position

use crate::record::{ChildRecord, ProposedItem};
use crate::relation::ProjectionRules;
use crate::{OrderIndex, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A child record to be created (no identifier yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCreate {
    /// 1-based position in the proposed list
    pub order: OrderIndex,
    /// Projected domain payload to persist
    pub payload: Value,
}

/// An existing child record to be rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    /// Identifier of the record to update
    pub id: RecordId,
    /// 1-based position in the proposed list
    pub order: OrderIndex,
    /// Projected domain payload to persist
    pub payload: Value,
}

/// Result of diffing a proposed list against the persisted children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// Items without a (surviving) identifier
    pub to_create: Vec<PendingCreate>,
    /// Items whose projected fields or position changed
    pub to_update: Vec<PendingWrite>,
    /// Persisted records absent from the proposed list
    pub to_delete: Vec<ChildRecord>,
    /// Persisted records the proposed list leaves untouched
    pub unchanged: Vec<ChildRecord>,
    /// Identifiers stripped during sanitization (stale or duplicated)
    pub sanitized: Vec<RecordId>,
}

impl DiffResult {
    /// Check whether the diff requires no writes at all.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Number of records that survive the diff.
    pub fn surviving(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.unchanged.len()
    }
}

/// Compute the create/update/delete sets that turn `original` into
/// `proposed`.
///
/// Deterministic and idempotent: diffing a list against itself yields an
/// empty diff with everything in `unchanged`.
///
/// Identifiers that do not appear in `original` are stripped and the item
/// demotes to a create; the record behind a stale identifier is never
/// touched. When the same identifier appears more than once in `proposed`,
/// the last occurrence wins and earlier occurrences demote to creates.
pub fn compute_diff(
    original: &[ChildRecord],
    proposed: &[ProposedItem],
    rules: &ProjectionRules,
) -> DiffResult {
    let by_id: HashMap<&str, &ChildRecord> = original
        .iter()
        .map(|record| (record.id.as_str(), record))
        .collect();

    // Last occurrence of each known identifier is canonical.
    let mut last_occurrence: HashMap<&str, usize> = HashMap::new();
    for (index, item) in proposed.iter().enumerate() {
        if let Some(id) = item.id.as_deref() {
            if by_id.contains_key(id) {
                last_occurrence.insert(id, index);
            }
        }
    }

    let mut result = DiffResult::default();
    let mut surviving: HashSet<&str> = HashSet::new();

    for (index, item) in proposed.iter().enumerate() {
        let order = (index + 1) as OrderIndex;

        let mut resolved: Option<&str> = None;
        if let Some(id) = item.id.as_deref() {
            let known = by_id.contains_key(id);
            let canonical = last_occurrence.get(id).copied() == Some(index);
            if known && canonical {
                resolved = Some(id);
            } else {
                // Stale, foreign, or duplicated identifier: demote to a
                // create instead of adopting another parent's record or
                // clobbering a sibling entry.
                tracing::warn!(
                    identifier = id,
                    known,
                    "stripping identifier from proposed item"
                );
                result.sanitized.push(id.to_string());
            }
        }

        match resolved {
            None => result.to_create.push(PendingCreate {
                order,
                payload: rules.project(&item.payload),
            }),
            Some(id) => {
                let existing = by_id[id];
                surviving.insert(id);

                let same_fields =
                    rules.project(&item.payload) == rules.project(&existing.payload);
                if same_fields && existing.order == order {
                    result.unchanged.push(existing.clone());
                } else {
                    result.to_update.push(PendingWrite {
                        id: id.to_string(),
                        order,
                        payload: rules.project(&item.payload),
                    });
                }
            }
        }
    }

    for record in original {
        if !surviving.contains(record.id.as_str()) {
            result.to_delete.push(record.clone());
        }
    }

    result
}
