// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres gateway (sqlx).
//!
//! All queries are runtime-checked `sqlx::query()` rather than the
//! compile-time macros: the tables are created by migrations this crate does
//! not own and may not exist at compile time.

mod rows;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use trellis_core::{
    Edge, JsonMap, NewTask, NodeRef, PlanBlueprint, Task, TaskId, TaskPatch, TaskSnapshot,
};
use uuid::Uuid;

use crate::error::StorageError;
use crate::gateway::{BlueprintCommit, Gateway, TaskLease};
use rows::{edge_from_row, snapshot_from_row, task_from_row, EDGE_COLUMNS, TASK_COLUMNS};

pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_history(
        tx: &mut Transaction<'static, Postgres>,
        task: &Task,
    ) -> Result<(), StorageError> {
        let snapshot = serde_json::to_value(task)
            .map_err(|e| StorageError::Database(format!("snapshot encode: {e}")))?;
        sqlx::query(
            "INSERT INTO task_history (task_id, version_number, snapshot, created_at) \
             VALUES ($1, $2, $3, now())",
        )
        .bind(task.id.as_uuid())
        .bind(task.version)
        .bind(snapshot)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Persist `next` (already carrying the bumped version) over the locked
    /// row, guarded by the pre-bump version, and write its history row.
    async fn write_version(
        tx: &mut Transaction<'static, Postgres>,
        next: &mut Task,
    ) -> Result<(), StorageError> {
        let guard_version = next.version - 1;
        let row = sqlx::query(
            "UPDATE tasks \
             SET status = $2, input_data = $3, result = $4, directives = $5, \
                 version = $6, updated_at = now() \
             WHERE id = $1 AND version = $7 \
             RETURNING updated_at",
        )
        .bind(next.id.as_uuid())
        .bind(next.status.as_str())
        .bind(Value::Object(next.input_data.clone()))
        .bind(next.result.clone().map(Value::Object))
        .bind(next.directives.clone().map(Value::Object))
        .bind(next.version)
        .bind(guard_version)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else {
            // Unreachable while the row lock is held; the guard is belt and
            // braces against a caller with a stale lease.
            return Err(StorageError::VersionConflict {
                task_id: next.id,
                expected: guard_version,
                found: -1,
            });
        };
        next.updated_at = sqlx::Row::try_get(&row, "updated_at")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Self::insert_history(tx, next).await
    }
}

#[async_trait]
impl Gateway for PgGateway {
    type Lease = PgLease;

    async fn create_task(&self, def: NewTask) -> Result<Task, StorageError> {
        let id = TaskId::new();
        let row = sqlx::query(&format!(
            "INSERT INTO tasks \
             (id, workflow_id, parent_id, assignee, status, input_data, directives, \
              version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, 1, now(), now()) \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(def.workflow_id.as_uuid())
        .bind(def.parent_id.map(|p| p.as_uuid()))
        .bind(&def.assignee)
        .bind(Value::Object(def.input_data))
        .bind(def.directives.map(Value::Object))
        .fetch_one(&self.pool)
        .await?;

        let task = task_from_row(&row)?;
        debug!(task_id = %task.id, workflow_id = %task.workflow_id, "task created");
        Ok(task)
    }

    async fn lock_task(&self, id: TaskId) -> Result<PgLease, StorageError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE SKIP LOCKED"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => Ok(PgLease { tx, task: task_from_row(&row)? }),
            None => {
                tx.rollback().await?;
                // Absent from the locked read: either contended or gone.
                let exists = sqlx::query("SELECT 1 FROM tasks WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;
                if exists.is_some() {
                    Err(StorageError::LockMiss(id))
                } else {
                    Err(StorageError::TaskNotFound(id))
                }
            }
        }
    }

    async fn get_task(&self, id: TaskId) -> Result<Task, StorageError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::TaskNotFound(id))?;
        task_from_row(&row)
    }

    async fn outgoing_edges(&self, id: TaskId) -> Result<Vec<Edge>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE source_task_id = $1 ORDER BY id"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(edge_from_row).collect()
    }

    async fn incoming_edges(&self, id: TaskId) -> Result<Vec<Edge>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE target_task_id = $1 ORDER BY id"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(edge_from_row).collect()
    }

    async fn task_history(&self, id: TaskId) -> Result<Vec<TaskSnapshot>, StorageError> {
        let rows = sqlx::query(
            "SELECT task_id, version_number, snapshot, created_at \
             FROM task_history WHERE task_id = $1 ORDER BY version_number",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn rollback_task(&self, id: TaskId, version: i64) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StorageError::TaskNotFound(id))?;
        let current = task_from_row(&row)?;

        let snap_row = sqlx::query(
            "SELECT task_id, version_number, snapshot, created_at \
             FROM task_history WHERE task_id = $1 AND version_number = $2",
        )
        .bind(id.as_uuid())
        .bind(version)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StorageError::SnapshotNotFound { task_id: id, version })?;
        let snapshot = snapshot_from_row(&snap_row)?.snapshot;

        let mut next = current;
        next.status = snapshot.status;
        next.input_data = snapshot.input_data;
        next.result = snapshot.result;
        next.directives = snapshot.directives;
        next.version += 1;

        Self::write_version(&mut tx, &mut next).await?;
        tx.commit().await?;
        debug!(task_id = %id, restored = version, version = next.version, "task rolled back");
        Ok(next.version)
    }

    async fn unsettled_task_ids(&self) -> Result<Vec<TaskId>, StorageError> {
        let rows = sqlx::query("SELECT id FROM tasks WHERE status IN ('PENDING', 'RUNNING')")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                sqlx::Row::try_get::<Uuid, _>(row, "id")
                    .map(TaskId::from_uuid)
                    .map_err(|e| StorageError::Database(e.to_string()))
            })
            .collect()
    }
}

/// An open transaction holding the row lock on one task.
pub struct PgLease {
    tx: Transaction<'static, Postgres>,
    task: Task,
}

#[async_trait]
impl TaskLease for PgLease {
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

        PgGateway::write_version(&mut self.tx, &mut next).await?;
        debug!(task_id = %next.id, version = next.version, status = %next.status, "task updated");
        self.task = next;
        Ok(self.task.version)
    }

    async fn merge_context(&mut self, merge: JsonMap) -> Result<i64, StorageError> {
        let mut next = self.task.clone();
        let mut result = next.result.take().unwrap_or_default();
        trellis_expr::deep_merge(&mut result, &merge);
        next.result = Some(result);
        next.version += 1;

        PgGateway::write_version(&mut self.tx, &mut next).await?;
        debug!(task_id = %next.id, version = next.version, "task context merged");
        self.task = next;
        Ok(self.task.version)
    }

    async fn apply_blueprint(
        &mut self,
        blueprint: &PlanBlueprint,
    ) -> Result<BlueprintCommit, StorageError> {
        blueprint.validate()?;

        let workflow_id = self.task.workflow_id;
        let parent_id = self.task.id;

        let mut id_map: IndexMap<String, TaskId> =
            IndexMap::with_capacity(blueprint.new_tasks.len());
        for def in &blueprint.new_tasks {
            id_map.insert(def.local_id.clone(), TaskId::new());
        }

        for def in &blueprint.new_tasks {
            let id = id_map[def.local_id.as_str()];
            sqlx::query(
                "INSERT INTO tasks \
                 (id, workflow_id, parent_id, assignee, status, input_data, directives, \
                  version, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, 1, now(), now())",
            )
            .bind(id.as_uuid())
            .bind(workflow_id.as_uuid())
            .bind(parent_id.as_uuid())
            .bind(&def.assignee)
            .bind(Value::Object(def.input_data.clone()))
            .bind(def.directives.clone().map(Value::Object))
            .execute(&mut *self.tx)
            .await?;
        }

        let mut edges_created = 0usize;
        for edge in &blueprint.new_edges {
            let source = self.resolve_ref(&edge.source, &id_map, workflow_id).await?;
            let target = self.resolve_ref(&edge.target, &id_map, workflow_id).await?;
            let condition = edge
                .condition
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| StorageError::Database(format!("condition encode: {e}")))?;
            let data_flow = edge
                .data_flow
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| StorageError::Database(format!("data_flow encode: {e}")))?;

            sqlx::query(
                "INSERT INTO edges \
                 (id, workflow_id, source_task_id, target_task_id, condition, data_flow) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(workflow_id.as_uuid())
            .bind(source.as_uuid())
            .bind(target.as_uuid())
            .bind(condition)
            .bind(data_flow)
            .execute(&mut *self.tx)
            .await?;
            edges_created += 1;
        }

        for update in &blueprint.update_tasks {
            let row = sqlx::query(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE"
            ))
            .bind(update.task_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StorageError::BlueprintUnknownTask(update.task_id))?;
            let current = task_from_row(&row)?;

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
            PgGateway::write_version(&mut self.tx, &mut next).await?;
        }

        debug!(
            task_id = %parent_id,
            tasks = id_map.len(),
            edges = edges_created,
            "blueprint expanded"
        );
        Ok(BlueprintCommit { id_map, edges_created })
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl PgLease {
    /// Map an edge endpoint to a concrete task id, checking that existing
    /// refs live in this workflow.
    async fn resolve_ref(
        &mut self,
        node: &NodeRef,
        id_map: &IndexMap<String, TaskId>,
        workflow_id: trellis_core::WorkflowId,
    ) -> Result<TaskId, StorageError> {
        match node {
            NodeRef::Local(local) => id_map
                .get(local.as_str())
                .copied()
                .ok_or_else(|| trellis_core::BlueprintError::UnresolvedRef(local.clone()).into()),
            NodeRef::Existing(id) => {
                let row = sqlx::query("SELECT workflow_id FROM tasks WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .ok_or(StorageError::BlueprintUnknownTask(*id))?;
                let wf: Uuid = sqlx::Row::try_get(&row, "workflow_id")
                    .map_err(|e| StorageError::Database(e.to_string()))?;
                if wf != workflow_id.as_uuid() {
                    return Err(StorageError::BlueprintForeignWorkflow(*id));
                }
                Ok(*id)
            }
        }
    }
}
