// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory gateway with an emulated change feed.
//!
//! Mirrors the Postgres gateway's semantics exactly — row locking with
//! lock-miss, version CAS, history on every mutation, atomic blueprint
//! expansion, commit-time notifications — so the engine and the workspace
//! specs run the full event loop without a database.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;
use trellis_core::{
    Clock, Edge, EdgeId, JsonMap, NewTask, NodeRef, PlanBlueprint, SystemClock, Task, TaskId,
    TaskPatch, TaskSnapshot, TaskStatus,
};

use crate::error::StorageError;
use crate::gateway::{BlueprintCommit, Gateway, TaskLease};
use crate::notify::ChangeEvent;

#[derive(Default, Debug)]
struct State {
    tasks: HashMap<TaskId, Task>,
    edges: Vec<Edge>,
    history: Vec<TaskSnapshot>,
    locked: HashSet<TaskId>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    feed: broadcast::Sender<ChangeEvent>,
}

#[derive(Clone)]
pub struct MemoryGateway<C: Clock = SystemClock> {
    inner: Arc<Inner>,
    clock: C,
}

impl MemoryGateway<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryGateway<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + 'static> MemoryGateway<C> {
    pub fn with_clock(clock: C) -> Self {
        let (feed, _) = broadcast::channel(256);
        Self { inner: Arc::new(Inner { state: Mutex::new(State::default()), feed }), clock }
    }

    /// Subscribe to the emulated change feed. Events fire on commit only.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.feed.subscribe()
    }

    /// Directly seed an edge row (fixtures; edges are created with their
    /// tasks in production paths).
    pub fn insert_edge(&self, edge: Edge) {
        self.inner.state.lock().edges.push(edge);
    }

    /// Seed a task row without a creation event: a fixture for tasks whose
    /// creation notification was already consumed and which now idle
    /// PENDING waiting on upstream contributions.
    pub fn insert_task(&self, task: Task) {
        self.inner.state.lock().tasks.insert(task.id, task);
    }

    fn created_event(&self, task: &Task) -> ChangeEvent {
        ChangeEvent::TaskCreated {
            task_id: task.id,
            workflow_id: task.workflow_id,
            assignee_id: task.assignee.clone(),
            status: task.status,
            created_at: task.created_at,
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> Gateway for MemoryGateway<C> {
    type Lease = MemoryLease<C>;

    async fn create_task(&self, def: NewTask) -> Result<Task, StorageError> {
        let at = self.clock.utc();
        let task = Task {
            id: TaskId::new(),
            workflow_id: def.workflow_id,
            parent_id: def.parent_id,
            assignee: def.assignee,
            status: TaskStatus::Pending,
            input_data: def.input_data,
            result: None,
            directives: def.directives,
            version: 1,
            created_at: at,
            updated_at: at,
        };
        self.inner.state.lock().tasks.insert(task.id, task.clone());
        let _ = self.inner.feed.send(self.created_event(&task));
        debug!(task_id = %task.id, "task created");
        Ok(task)
    }

    async fn lock_task(&self, id: TaskId) -> Result<MemoryLease<C>, StorageError> {
        let mut state = self.inner.state.lock();
        let task = state.tasks.get(&id).ok_or(StorageError::TaskNotFound(id))?.clone();
        if !state.locked.insert(id) {
            return Err(StorageError::LockMiss(id));
        }
        Ok(MemoryLease {
            inner: Arc::clone(&self.inner),
            clock: self.clock.clone(),
            task,
            locks: vec![id],
            staged: Staged::default(),
            finished: false,
        })
    }

    async fn get_task(&self, id: TaskId) -> Result<Task, StorageError> {
        self.inner
            .state
            .lock()
            .tasks
            .get(&id)
            .cloned()
            .ok_or(StorageError::TaskNotFound(id))
    }

    async fn outgoing_edges(&self, id: TaskId) -> Result<Vec<Edge>, StorageError> {
        let state = self.inner.state.lock();
        let mut edges: Vec<Edge> =
            state.edges.iter().filter(|e| e.source_task_id == id).cloned().collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    async fn incoming_edges(&self, id: TaskId) -> Result<Vec<Edge>, StorageError> {
        let state = self.inner.state.lock();
        let mut edges: Vec<Edge> =
            state.edges.iter().filter(|e| e.target_task_id == id).cloned().collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    async fn task_history(&self, id: TaskId) -> Result<Vec<TaskSnapshot>, StorageError> {
        let state = self.inner.state.lock();
        let mut rows: Vec<TaskSnapshot> =
            state.history.iter().filter(|h| h.task_id == id).cloned().collect();
        rows.sort_by_key(|h| h.version_number);
        Ok(rows)
    }

    async fn rollback_task(&self, id: TaskId, version: i64) -> Result<i64, StorageError> {
        let event;
        let new_version;
        {
            let mut state = self.inner.state.lock();
            if state.locked.contains(&id) {
                return Err(StorageError::LockMiss(id));
            }
            let snapshot = state
                .history
                .iter()
                .find(|h| h.task_id == id && h.version_number == version)
                .map(|h| h.snapshot.clone())
                .ok_or(StorageError::SnapshotNotFound { task_id: id, version })?;
            let current = state.tasks.get_mut(&id).ok_or(StorageError::TaskNotFound(id))?;

            current.status = snapshot.status;
            current.input_data = snapshot.input_data;
            current.result = snapshot.result;
            current.directives = snapshot.directives;
            current.version += 1;
            current.updated_at = self.clock.utc();
            new_version = current.version;

            let row = TaskSnapshot {
                task_id: id,
                version_number: new_version,
                snapshot: current.clone(),
                created_at: current.updated_at,
            };
            event = ChangeEvent::TaskUpdated {
                task_id: id,
                status: current.status,
                updated_at: current.updated_at,
            };
            state.history.push(row);
        }
        let _ = self.inner.feed.send(event);
        Ok(new_version)
    }

    async fn unsettled_task_ids(&self) -> Result<Vec<TaskId>, StorageError> {
        let state = self.inner.state.lock();
        let mut ids: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Default, Debug)]
struct Staged {
    upserts: Vec<Task>,
    edges: Vec<Edge>,
    history: Vec<TaskSnapshot>,
    events: Vec<ChangeEvent>,
}

#[derive(Debug)]
pub struct MemoryLease<C: Clock> {
    inner: Arc<Inner>,
    clock: C,
    task: Task,
    /// Every row this lease holds locked (the leased task plus any tasks a
    /// blueprint's update list touched).
    locks: Vec<TaskId>,
    staged: Staged,
    finished: bool,
}

impl<C: Clock> MemoryLease<C> {
    /// Stage `next` (version already bumped) with its history row and
    /// update notification.
    fn stage_version(&mut self, mut next: Task) -> Task {
        next.updated_at = self.clock.utc();
        self.staged.history.push(TaskSnapshot {
            task_id: next.id,
            version_number: next.version,
            snapshot: next.clone(),
            created_at: next.updated_at,
        });
        self.staged.events.push(ChangeEvent::TaskUpdated {
            task_id: next.id,
            status: next.status,
            updated_at: next.updated_at,
        });
        self.staged.upserts.push(next.clone());
        next
    }

    fn release_locks(&self) {
        let mut state = self.inner.state.lock();
        for id in &self.locks {
            state.locked.remove(id);
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> TaskLease for MemoryLease<C> {
    fn task(&self) -> &Task {
        &self.task
    }

    async fn update(
        &mut self,
        patch: TaskPatch,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        if expected_version != self.task.version {
            return Err(StorageError::VersionConflict {
                task_id: self.task.id,
                expected: expected_version,
                found: self.task.version,
            });
        }
        if let Some(next_status) = patch.status {
            if next_status != self.task.status
                && !self.task.status.can_transition_to(next_status)
            {
                return Err(StorageError::IllegalTransition {
                    task_id: self.task.id,
                    from: self.task.status,
                    to: next_status,
                });
            }
        }

        let mut next = self.task.clone();
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(result) = patch.result {
            next.result = Some(result);
        }
        if let Some(input_data) = patch.input_data {
            next.input_data = input_data;
        }
        if let Some(directives) = patch.directives {
            next.directives = Some(directives);
        }
        next.version += 1;

        self.task = self.stage_version(next);
        Ok(self.task.version)
    }

    async fn merge_context(&mut self, merge: JsonMap) -> Result<i64, StorageError> {
        let mut next = self.task.clone();
        let mut result = next.result.take().unwrap_or_default();
        trellis_expr::deep_merge(&mut result, &merge);
        next.result = Some(result);
        next.version += 1;

        self.task = self.stage_version(next);
        Ok(self.task.version)
    }

    async fn apply_blueprint(
        &mut self,
        blueprint: &PlanBlueprint,
    ) -> Result<BlueprintCommit, StorageError> {
        blueprint.validate()?;

        let workflow_id = self.task.workflow_id;
        let parent_id = self.task.id;
        let at = self.clock.utc();

        let mut id_map: IndexMap<String, TaskId> =
            IndexMap::with_capacity(blueprint.new_tasks.len());
        for def in &blueprint.new_tasks {
            id_map.insert(def.local_id.clone(), TaskId::new());
        }

        // Resolve and verify every edge endpoint before staging anything.
        let mut resolved_edges = Vec::with_capacity(blueprint.new_edges.len());
        {
            let state = self.inner.state.lock();
            for edge in &blueprint.new_edges {
                let endpoint = |node: &NodeRef| -> Result<TaskId, StorageError> {
                    match node {
                        NodeRef::Local(local) => id_map.get(local.as_str()).copied().ok_or_else(
                            || trellis_core::BlueprintError::UnresolvedRef(local.clone()).into(),
                        ),
                        NodeRef::Existing(id) => {
                            let task = state
                                .tasks
                                .get(id)
                                .ok_or(StorageError::BlueprintUnknownTask(*id))?;
                            if task.workflow_id != workflow_id {
                                return Err(StorageError::BlueprintForeignWorkflow(*id));
                            }
                            Ok(*id)
                        }
                    }
                };
                resolved_edges.push((endpoint(&edge.source)?, endpoint(&edge.target)?, edge));
            }
        }

        for def in &blueprint.new_tasks {
            let task = Task {
                id: id_map[def.local_id.as_str()],
                workflow_id,
                parent_id: Some(parent_id),
                assignee: def.assignee.clone(),
                status: TaskStatus::Pending,
                input_data: def.input_data.clone(),
                result: None,
                directives: def.directives.clone(),
                version: 1,
                created_at: at,
                updated_at: at,
            };
            self.staged.events.push(ChangeEvent::TaskCreated {
                task_id: task.id,
                workflow_id,
                assignee_id: task.assignee.clone(),
                status: task.status,
                created_at: at,
            });
            self.staged.upserts.push(task);
        }

        let mut edges_created = 0usize;
        for (source, target, def) in resolved_edges {
            self.staged.edges.push(Edge {
                id: EdgeId::new(),
                workflow_id,
                source_task_id: source,
                target_task_id: target,
                condition: def.condition.clone(),
                data_flow: def.data_flow.clone(),
            });
            edges_created += 1;
        }

        for update in &blueprint.update_tasks {
            let current = {
                let mut state = self.inner.state.lock();
                let current = state
                    .tasks
                    .get(&update.task_id)
                    .cloned()
                    .ok_or(StorageError::BlueprintUnknownTask(update.task_id))?;
                if !state.locked.insert(update.task_id) {
                    return Err(StorageError::LockMiss(update.task_id));
                }
                current
            };
            self.locks.push(update.task_id);

            if current.version != update.expected_version {
                return Err(StorageError::VersionConflict {
                    task_id: update.task_id,
                    expected: update.expected_version,
                    found: current.version,
                });
            }

            let mut next = current;
            if let Some(input_data) = update.input_data.clone() {
                next.input_data = input_data;
            }
            if let Some(directives) = update.directives.clone() {
                next.directives = Some(directives);
            }
            next.version += 1;
            self.stage_version(next);
        }

        Ok(BlueprintCommit { id_map, edges_created })
    }

    async fn commit(mut self) -> Result<(), StorageError> {
        let staged = std::mem::take(&mut self.staged);
        {
            let mut state = self.inner.state.lock();
            for task in staged.upserts {
                state.tasks.insert(task.id, task);
            }
            state.edges.extend(staged.edges);
            state.history.extend(staged.history);
            for id in &self.locks {
                state.locked.remove(id);
            }
        }
        self.finished = true;
        // Emit only after the state is visible, mirroring notify-on-commit.
        for event in staged.events {
            let _ = self.inner.feed.send(event);
        }
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StorageError> {
        self.release_locks();
        self.finished = true;
        Ok(())
    }
}

impl<C: Clock> Drop for MemoryLease<C> {
    fn drop(&mut self) {
        if !self.finished {
            self.release_locks();
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
