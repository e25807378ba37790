// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway and lease traits.
//!
//! A lease is an open store transaction holding the exclusive row lock on
//! one task. All writes ride the transaction; nothing is visible (and no
//! change notification fires) until `commit`. Dropping a lease without
//! committing releases the lock and discards the writes.

use async_trait::async_trait;
use indexmap::IndexMap;
use trellis_core::{
    Edge, JsonMap, NewTask, PlanBlueprint, Task, TaskId, TaskPatch, TaskSnapshot,
};

use crate::error::StorageError;

/// Result of an atomic blueprint expansion: the local-id → uuid map, in
/// definition order, plus the created edge count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlueprintCommit {
    pub id_map: IndexMap<String, TaskId>,
    pub edges_created: usize,
}

impl BlueprintCommit {
    /// Blueprint handle: the first new task's uuid.
    pub fn plan_id(&self) -> Option<TaskId> {
        self.id_map.values().next().copied()
    }
}

#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    type Lease: TaskLease;

    /// INSERT a task in `PENDING` at version 1. The store's trigger emits a
    /// `task_created` notification on commit.
    async fn create_task(&self, def: NewTask) -> Result<Task, StorageError>;

    /// Open a transaction and take the exclusive, skip-if-locked row lock.
    ///
    /// Returns `Err(LockMiss)` when another worker holds the row and
    /// `Err(TaskNotFound)` when no such task exists.
    async fn lock_task(&self, id: TaskId) -> Result<Self::Lease, StorageError>;

    /// Unlocked point read.
    async fn get_task(&self, id: TaskId) -> Result<Task, StorageError>;

    /// Outgoing edges of a task, ordered by edge id for determinism.
    async fn outgoing_edges(&self, id: TaskId) -> Result<Vec<Edge>, StorageError>;

    /// Incoming edges of a task, ordered by edge id. The propagation phase
    /// uses these to replay higher-uuid contributions at fan-in.
    async fn incoming_edges(&self, id: TaskId) -> Result<Vec<Edge>, StorageError>;

    /// Full snapshot history, ascending by version.
    async fn task_history(&self, id: TaskId) -> Result<Vec<TaskSnapshot>, StorageError>;

    /// Create a new version whose content equals the snapshot at `version`.
    /// Returns the new (strictly greater) version number.
    async fn rollback_task(&self, id: TaskId, version: i64) -> Result<i64, StorageError>;

    /// Ids of every task not in a terminal status. Used by the bridge's
    /// backfill sweep to restore at-least-once delivery after feed gaps.
    async fn unsettled_task_ids(&self) -> Result<Vec<TaskId>, StorageError>;
}

#[async_trait]
pub trait TaskLease: Send {
    /// The task as of lock acquisition, plus any writes staged on this lease.
    fn task(&self) -> &Task;

    /// Compound compare-and-set update of status/result/input/directives.
    ///
    /// Fails with `VersionConflict` if `expected_version` is stale and
    /// `IllegalTransition` if the patch's status change is not permitted.
    /// Writes a history snapshot with the new version. Returns the new
    /// version.
    async fn update(
        &mut self,
        patch: TaskPatch,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    /// Deep-merge keys into `result` without touching `status` (tool
    /// re-entry). Bumps the version and writes a history row like any other
    /// mutation, so rollback works mid-re-entry.
    async fn merge_context(&mut self, merge: JsonMap) -> Result<i64, StorageError>;

    /// Atomically expand a blueprint into this task's workflow: mint uuids
    /// for local ids, rewrite edge refs, INSERT tasks and edges, apply
    /// bundled updates with their own CAS checks. All-or-nothing within the
    /// lease transaction; new tasks carry this task as `parent_id`.
    async fn apply_blueprint(
        &mut self,
        blueprint: &PlanBlueprint,
    ) -> Result<BlueprintCommit, StorageError>;

    async fn commit(self) -> Result<(), StorageError>;

    /// Discard staged writes and release the lock.
    async fn rollback(self) -> Result<(), StorageError>;
}
