// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row ↔ domain decoding.
//!
//! Runtime-checked `try_get` throughout: the tables are created by
//! externally-owned migrations, so nothing here assumes they exist at
//! compile time, and a malformed row surfaces as `CorruptRow` instead of a
//! panic.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use trellis_core::{
    Condition, DataFlow, Edge, EdgeId, JsonMap, Task, TaskId, TaskSnapshot, TaskStatus,
    WorkflowId,
};
use uuid::Uuid;

use crate::error::StorageError;

pub(crate) const TASK_COLUMNS: &str = "id, workflow_id, parent_id, assignee, status, \
     input_data, result, directives, version, created_at, updated_at";

pub(crate) const EDGE_COLUMNS: &str =
    "id, workflow_id, source_task_id, target_task_id, condition, data_flow";

fn corrupt(task_id: TaskId, detail: impl std::fmt::Display) -> StorageError {
    StorageError::CorruptRow { task_id, detail: detail.to_string() }
}

fn json_map(value: Option<Value>) -> JsonMap {
    match value {
        Some(Value::Object(map)) => map,
        _ => JsonMap::new(),
    }
}

pub(crate) fn task_from_row(row: &PgRow) -> Result<Task, StorageError> {
    let id = TaskId::from_uuid(row.try_get::<Uuid, _>("id").map_err(StorageError::from)?);

    let status_str: String = row.try_get("status").map_err(|e| corrupt(id, e))?;
    let status: TaskStatus = status_str.parse().map_err(|e| corrupt(id, e))?;

    let result: Option<Value> = row.try_get("result").map_err(|e| corrupt(id, e))?;
    let directives: Option<Value> = row.try_get("directives").map_err(|e| corrupt(id, e))?;

    Ok(Task {
        id,
        workflow_id: WorkflowId::from_uuid(
            row.try_get::<Uuid, _>("workflow_id").map_err(|e| corrupt(id, e))?,
        ),
        parent_id: row
            .try_get::<Option<Uuid>, _>("parent_id")
            .map_err(|e| corrupt(id, e))?
            .map(TaskId::from_uuid),
        assignee: row.try_get("assignee").map_err(|e| corrupt(id, e))?,
        status,
        input_data: json_map(row.try_get("input_data").map_err(|e| corrupt(id, e))?),
        result: result.map(|v| json_map(Some(v))),
        directives: directives.map(|v| json_map(Some(v))),
        version: row.try_get("version").map_err(|e| corrupt(id, e))?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(|e| corrupt(id, e))?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(|e| corrupt(id, e))?,
    })
}

pub(crate) fn edge_from_row(row: &PgRow) -> Result<Edge, StorageError> {
    let id = EdgeId::from_uuid(row.try_get::<Uuid, _>("id").map_err(StorageError::from)?);
    let source =
        TaskId::from_uuid(row.try_get::<Uuid, _>("source_task_id").map_err(StorageError::from)?);

    // SQL NULL and a stored JSON null both mean "absent"
    fn opt_json(value: Option<Value>) -> Option<Value> {
        match value {
            None | Some(Value::Null) => None,
            some => some,
        }
    }

    let condition = opt_json(row.try_get("condition").map_err(StorageError::from)?)
        .map(serde_json::from_value::<Condition>)
        .transpose()
        .map_err(|e| corrupt(source, format!("condition: {e}")))?;

    let data_flow = opt_json(row.try_get("data_flow").map_err(StorageError::from)?)
        .map(serde_json::from_value::<DataFlow>)
        .transpose()
        .map_err(|e| corrupt(source, format!("data_flow: {e}")))?;

    Ok(Edge {
        id,
        workflow_id: WorkflowId::from_uuid(
            row.try_get::<Uuid, _>("workflow_id").map_err(StorageError::from)?,
        ),
        source_task_id: source,
        target_task_id: TaskId::from_uuid(
            row.try_get::<Uuid, _>("target_task_id").map_err(StorageError::from)?,
        ),
        condition,
        data_flow,
    })
}

pub(crate) fn snapshot_from_row(row: &PgRow) -> Result<TaskSnapshot, StorageError> {
    let task_id =
        TaskId::from_uuid(row.try_get::<Uuid, _>("task_id").map_err(StorageError::from)?);
    let snapshot_value: Value = row.try_get("snapshot").map_err(|e| corrupt(task_id, e))?;
    let snapshot: Task =
        serde_json::from_value(snapshot_value).map_err(|e| corrupt(task_id, e))?;

    Ok(TaskSnapshot {
        task_id,
        version_number: row.try_get("version_number").map_err(|e| corrupt(task_id, e))?,
        snapshot,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(|e| corrupt(task_id, e))?,
    })
}
