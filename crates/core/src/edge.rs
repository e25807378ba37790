// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph edges: conditions and data-flow mappings.

use crate::id::{EdgeId, TaskId, WorkflowId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Boolean expression gating an edge.
///
/// `evaluator` names the expression dialect; only the built-in dialect is
/// recognized and anything else deactivates the edge at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub evaluator: String,
    pub expression: String,
}

impl Condition {
    /// The only dialect the engine evaluates.
    pub const BUILTIN_EVALUATOR: &'static str = "builtin";

    pub fn builtin(expression: impl Into<String>) -> Self {
        Self { evaluator: Self::BUILTIN_EVALUATOR.to_string(), expression: expression.into() }
    }
}

/// Projection of a source task's completion context into a target's input.
///
/// Keys are dot-paths into the target input; values are source expressions
/// over `{result, input}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataFlow {
    #[serde(default)]
    pub mappings: IndexMap<String, String>,
}

/// A directed edge between two tasks of the same workflow. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub workflow_id: WorkflowId,
    pub source_task_id: TaskId,
    pub target_task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_flow: Option<DataFlow>,
}

#[cfg(test)]
#[path = "edge_tests.rs"]
mod tests;
