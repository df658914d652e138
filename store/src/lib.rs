//! Stitch Store - record-store integration for the Stitch engine.
//!
//! This crate wires the pure diff engine and reentrancy guard from
//! `stitch-engine` into a record store's write lifecycle:
//!
//! - [`RecordStore`] is the contract of the surrounding store: find,
//!   create, update, delete, with before/after write hooks fired on every
//!   mutation and a shared [`stitch_engine::OperationContext`] passed down
//!   the whole chain of one request.
//! - [`RelationHooks`] implements those hooks for one parent/child
//!   relation: it snapshots the proposed list on the way in, diffs it
//!   against the persisted children on the way out, applies the delta
//!   through an [`ExecutionStrategy`], and persists the link field with a
//!   single housekeeping write the guard suppresses.
//! - [`ApiStrategy`] applies a diff through the full record-store API
//!   (downstream hooks run normally, failures are best-effort);
//!   [`DirectStrategy`] writes straight to a [`DirectStorage`] backend,
//!   optionally inside one transaction per batch.
//! - [`MemoryStore`] implements both surfaces in memory and backs the
//!   test suites; [`PgStorage`] is a Postgres-backed [`DirectStorage`].
//!
//! Two top-level writes against the same parent are serialized through
//! [`ParentLocks`]; this is a required invariant of the engine, not an
//! optional hardening.

pub mod error;
pub mod hooks;
pub mod locks;
pub mod memory;
pub mod postgres;
pub mod storage;
pub mod store;
pub mod strategy;

// Re-export main types at crate root
pub use error::{Result, StoreError};
pub use hooks::RelationHooks;
pub use locks::ParentLocks;
pub use memory::MemoryStore;
pub use postgres::PgStorage;
pub use storage::{DirectStorage, TransactionId};
pub use store::{Filter, LifecycleHooks, RecordStore, Sort, Target};
pub use strategy::{
    ApiStrategy, ApplyError, ChildOp, DirectStrategy, ExecutionStrategy, OperationFailure,
    PartialFailure,
};
