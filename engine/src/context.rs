//! Reentrancy guard for the write hook chain.
//!
//! Applying a diff ends with the engine writing the link field back onto
//! the parent record. That write re-enters the same before/after hook
//! chain that triggered reconciliation in the first place; without gating
//! it would recompute and reapply the diff recursively. The
//! [`OperationContext`] tracks the phase of one logical parent write so
//! the chain reconciles exactly once.
//!
//! # Phases
//!
//! 1. Pre-write hook snapshots the proposed list and stamps `Requested`
//! 2. Post-write hook proceeds only while the phase is `Requested` for the
//!    same operation kind, then moves to `Reconciled`
//! 3. The housekeeping link write runs under a child context pre-tagged as
//!    finished, so its own pass through the chain is a no-op
//! 4. The outer context ends at `LinkFinished`
//!
//! The context is a cheap handle; clones share the same state, so every
//! nested hook invocation inside one logical request observes the same
//! flags.

use crate::record::ProposedItem;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// The kind of a parent write passing through the hook chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteKind {
    Create,
    Update,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::Create => write!(f, "create"),
            WriteKind::Update => write!(f, "update"),
        }
    }
}

/// Phase of one logical parent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// No write observed yet
    #[default]
    Idle,
    /// Pre-write hook saw the write and snapshotted the proposed list
    Requested(WriteKind),
    /// The diff has been applied for this write
    Reconciled(WriteKind),
    /// The housekeeping link write has completed
    LinkFinished(WriteKind),
}

/// Outcome of the pre-write hook's pass over the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeforeOutcome {
    /// The proposed list was snapshotted and the phase stamped
    Snapshotted,
    /// The write belongs to the engine itself; flags propagate untouched
    Passthrough,
}

#[derive(Debug, Default)]
struct ContextState {
    phase: Phase,
    skip_create: bool,
    housekeeping: bool,
    snapshot: Option<Vec<ProposedItem>>,
}

/// Shared, request-scoped state for one pass through the hook chain.
///
/// Cloning returns a handle to the same state. The state is mutated in
/// place behind the handle, never replaced, so recursive hook invocations
/// observe every flag set by outer frames.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    inner: Arc<Mutex<ContextState>>,
}

impl OperationContext {
    /// Create a fresh context for a new logical request.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        // A poisoned lock only means a holder panicked; the flags are
        // still coherent for suppression purposes.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check whether the pre-write hook should treat this pass as the
    /// engine's own write and leave the payload untouched.
    pub fn is_passthrough(&self) -> bool {
        let state = self.state();
        state.housekeeping || state.skip_create || matches!(state.phase, Phase::LinkFinished(_))
    }

    /// Record the pre-write hook's observation of an incoming write.
    ///
    /// A pass already carrying finished/housekeeping/skip flags propagates
    /// them unchanged and snapshots nothing. Otherwise the proposed list is
    /// snapshotted and the phase stamped `Requested` for this kind.
    pub fn observe_before_write(
        &self,
        kind: WriteKind,
        proposed: Option<Vec<ProposedItem>>,
    ) -> BeforeOutcome {
        let mut state = self.state();
        if state.housekeeping || state.skip_create || matches!(state.phase, Phase::LinkFinished(_))
        {
            return BeforeOutcome::Passthrough;
        }
        state.snapshot = proposed;
        state.phase = Phase::Requested(kind);
        BeforeOutcome::Snapshotted
    }

    /// Check whether the post-write hook should reconcile for this kind.
    pub fn should_reconcile(&self, kind: WriteKind) -> bool {
        let state = self.state();
        state.phase == Phase::Requested(kind)
            && !state.housekeeping
            && !state.skip_create
            && state.snapshot.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Consume the snapshotted proposed list.
    ///
    /// The snapshot is taken exactly once; later calls return `None`.
    pub fn take_snapshot(&self) -> Option<Vec<ProposedItem>> {
        self.state().snapshot.take()
    }

    /// Record that the diff has been applied for this write.
    pub fn mark_reconciled(&self, kind: WriteKind) {
        self.state().phase = Phase::Reconciled(kind);
    }

    /// Record that the housekeeping link write has completed.
    pub fn mark_link_finished(&self, kind: WriteKind) {
        self.state().phase = Phase::LinkFinished(kind);
    }

    /// Pin this context so no write through it ever reconciles.
    ///
    /// Used by seeding and bulk-import paths that manage child records
    /// themselves.
    pub fn set_skip_create(&self) {
        self.state().skip_create = true;
    }

    /// Derive the context handed to the engine's own link write.
    ///
    /// The child context is pre-tagged as a housekeeping write with the
    /// finished flag already set, so its pass through the hook chain is
    /// recognized and suppressed.
    pub fn housekeeping_child(&self, kind: WriteKind) -> Self {
        let child = Self::new();
        {
            let mut state = child.state();
            state.housekeeping = true;
            state.phase = Phase::LinkFinished(kind);
        }
        child
    }

    /// Whether this context belongs to an engine-issued housekeeping write.
    pub fn is_housekeeping(&self) -> bool {
        self.state().housekeeping
    }

    /// Current phase, for inspection.
    pub fn phase(&self) -> Phase {
        self.state().phase
    }
}
