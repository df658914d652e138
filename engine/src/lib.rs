//! # Stitch Engine
//!
//! The deterministic core of Stitch: it keeps an editable, ordered list
//! representation (the "array" a UI edits) in sync with normalized child
//! records linked to a parent record through a foreign key.
//!
//! This crate has no IO. It computes *what* must change; the companion
//! `stitch-store` crate decides *how* the changes are applied against a
//! record store.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of storage, hooks, or runtime
//! - **Deterministic**: the same inputs always produce the same diff
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Child records and proposed lists
//!
//! A [`ChildRecord`] is one persisted row: identifier, foreign key to its
//! parent, a dense 1-based `order` assigned by the engine, and an open JSON
//! payload. A [`ProposedItem`] is one entry of the list a caller submits;
//! it may carry an identifier (existing record) or not (new record).
//!
//! ### Diffing
//!
//! [`compute_diff`] compares the persisted children of one parent against a
//! proposed list and classifies every item into create/update/delete/
//! unchanged sets. Identifiers that do not belong to the parent are
//! stripped and the item demotes to a create, so one parent's write can
//! never silently adopt another parent's record.
//!
//! ### The reentrancy guard
//!
//! Applying a diff ends with a housekeeping write on the parent record,
//! which re-enters the same hook chain that triggered reconciliation. The
//! [`OperationContext`] phase machine recognizes the engine's own writes
//! and suppresses them, so one logical parent write reconciles exactly
//! once.
//!
//! ## Quick Start
//!
//! ```rust
//! use stitch_engine::{compute_diff, ChildRecord, ProposedItem, RelationConfig};
//! use serde_json::json;
//!
//! let relation = RelationConfig::new("sales", "saleItems")
//!     .link_field("items")
//!     .reverse_field("sale")
//!     .build()
//!     .unwrap();
//!
//! let original = vec![
//!     ChildRecord::new("item-1", "sale-1", 1, json!({"sku": "apple", "qty": 2})),
//!     ChildRecord::new("item-2", "sale-1", 2, json!({"sku": "pear", "qty": 5})),
//! ];
//! let proposed = vec![
//!     ProposedItem::existing("item-2", json!({"sku": "pear", "qty": 7})),
//!     ProposedItem::new(json!({"sku": "plum", "qty": 1})),
//! ];
//!
//! let diff = compute_diff(&original, &proposed, relation.projection());
//! assert_eq!(diff.to_delete.len(), 1);
//! assert_eq!(diff.to_update[0].order, 1);
//! assert_eq!(diff.to_create[0].order, 2);
//! ```

pub mod context;
pub mod diff;
pub mod error;
pub mod record;
pub mod relation;

// Re-export main types at crate root
pub use context::{BeforeOutcome, OperationContext, Phase, WriteKind};
pub use diff::{compute_diff, DiffResult, PendingCreate, PendingWrite};
pub use error::Error;
pub use record::{id_from_value, ChildRecord, ProposedItem, ORDER_FIELD};
pub use relation::{ProjectionRules, RelationConfig, RelationSchema, SERVER_MANAGED_FIELDS};

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionName = String;
pub type FieldName = String;
pub type OrderIndex = u32;
pub type Timestamp = i64;
