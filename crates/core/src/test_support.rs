// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders and proptest strategies shared across crates' tests.

use crate::edge::{Condition, DataFlow, Edge};
use crate::id::{EdgeId, TaskId, WorkflowId};
use crate::task::{JsonMap, Task, TaskStatus};
use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::Value;

/// Convert a `json!({..})` object into a [`JsonMap`]; anything else is an
/// empty map.
pub fn json_map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

/// Builder for [`Task`] fixtures.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    id: TaskId,
    workflow_id: WorkflowId,
    parent_id: Option<TaskId>,
    assignee: String,
    status: TaskStatus,
    input_data: JsonMap,
    result: Option<JsonMap>,
    directives: Option<JsonMap>,
    version: i64,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self {
            id: TaskId::new(),
            workflow_id: WorkflowId::new(),
            parent_id: None,
            assignee: "Agent:echo".to_string(),
            status: TaskStatus::Pending,
            input_data: JsonMap::new(),
            result: None,
            directives: None,
            version: 1,
        }
    }
}

impl TaskBuilder {
    pub fn id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    pub fn workflow(mut self, id: WorkflowId) -> Self {
        self.workflow_id = id;
        self
    }

    pub fn parent(mut self, id: TaskId) -> Self {
        self.parent_id = Some(id);
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = assignee.into();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn input(mut self, input: Value) -> Self {
        self.input_data = json_map(input);
        self
    }

    pub fn result(mut self, result: Value) -> Self {
        self.result = Some(json_map(result));
        self
    }

    pub fn directives(mut self, directives: Value) -> Self {
        self.directives = Some(json_map(directives));
        self
    }

    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn build(self) -> Task {
        let at = Utc.timestamp_millis_opt(1_000_000).single().unwrap_or_default();
        Task {
            id: self.id,
            workflow_id: self.workflow_id,
            parent_id: self.parent_id,
            assignee: self.assignee,
            status: self.status,
            input_data: self.input_data,
            result: self.result,
            directives: self.directives,
            version: self.version,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Build an edge with an optional condition and data-flow mappings.
pub fn edge_with(
    workflow_id: WorkflowId,
    source: TaskId,
    target: TaskId,
    condition: Option<&str>,
    mappings: &[(&str, &str)],
) -> Edge {
    let data_flow = if mappings.is_empty() {
        None
    } else {
        let mut map = IndexMap::new();
        for (k, v) in mappings {
            map.insert((*k).to_string(), (*v).to_string());
        }
        Some(DataFlow { mappings: map })
    };
    Edge {
        id: EdgeId::new(),
        workflow_id,
        source_task_id: source,
        target_task_id: target,
        condition: condition.map(Condition::builtin),
        data_flow,
    }
}

/// Proptest strategies for domain values.
pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    pub fn task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::Running),
            Just(TaskStatus::Completed),
            Just(TaskStatus::Failed),
            Just(TaskStatus::Cancelled),
        ]
    }

    /// Shallow JSON scalars for payload fuzzing.
    pub fn json_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            // Finite floats only; NaN never round-trips through JSON.
            (-1.0e9f64..1.0e9).prop_map(Value::from),
            "[a-z]{0,12}".prop_map(Value::from),
        ]
    }
}
