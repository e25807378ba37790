// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan blueprints: atomically-applied deltas to the workflow graph.

use crate::edge::{Condition, DataFlow};
use crate::id::TaskId;
use crate::task::JsonMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// A task to create, addressed by a blueprint-local string id until the
/// store mints a uuid for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub local_id: String,
    pub assignee: String,
    #[serde(default)]
    pub input_data: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directives: Option<JsonMap>,
}

/// Edge endpoint: a blueprint-local id or an already-persisted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeRef {
    Existing(TaskId),
    Local(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: NodeRef,
    pub target: NodeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_flow: Option<DataFlow>,
}

/// CAS update of an existing task bundled with a blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    pub expected_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directives: Option<JsonMap>,
}

/// An atomically-applied delta to the workflow graph: either every task and
/// edge is persisted with consistent id remapping, or none is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanBlueprint {
    #[serde(default)]
    pub new_tasks: Vec<TaskDefinition>,
    #[serde(default)]
    pub new_edges: Vec<EdgeDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_tasks: Vec<TaskUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlueprintError {
    #[error("duplicate local task id: {0:?}")]
    DuplicateLocalId(String),
    #[error("edge refers to unresolved local id: {0:?}")]
    UnresolvedRef(String),
    #[error("blueprint graph contains a cycle")]
    Cycle,
    #[error("blueprint is empty")]
    Empty,
}

impl PlanBlueprint {
    /// Validate before expansion: local ids are unique, every local edge
    /// endpoint resolves, and the new subgraph is acyclic.
    ///
    /// Re-entry loops are encoded by status flips of a single task, never by
    /// edges, so blueprints must be DAGs at insertion time. Cycle detection
    /// only considers edges between new tasks; an edge touching an existing
    /// task cannot close a cycle within the blueprint.
    pub fn validate(&self) -> Result<(), BlueprintError> {
        if self.new_tasks.is_empty() && self.new_edges.is_empty() && self.update_tasks.is_empty() {
            return Err(BlueprintError::Empty);
        }

        let mut locals: HashSet<&str> = HashSet::with_capacity(self.new_tasks.len());
        for def in &self.new_tasks {
            if !locals.insert(def.local_id.as_str()) {
                return Err(BlueprintError::DuplicateLocalId(def.local_id.clone()));
            }
        }

        for edge in &self.new_edges {
            for node in [&edge.source, &edge.target] {
                if let NodeRef::Local(id) = node {
                    if !locals.contains(id.as_str()) {
                        return Err(BlueprintError::UnresolvedRef(id.clone()));
                    }
                }
            }
        }

        self.check_acyclic()
    }

    /// Kahn's algorithm over the local-id subgraph.
    fn check_acyclic(&self) -> Result<(), BlueprintError> {
        let mut indegree: HashMap<&str, usize> =
            self.new_tasks.iter().map(|t| (t.local_id.as_str(), 0)).collect();
        let mut succs: HashMap<&str, Vec<&str>> = HashMap::new();

        let mut local_edges = 0usize;
        for edge in &self.new_edges {
            if let (NodeRef::Local(src), NodeRef::Local(dst)) = (&edge.source, &edge.target) {
                succs.entry(src.as_str()).or_default().push(dst.as_str());
                if let Some(deg) = indegree.get_mut(dst.as_str()) {
                    *deg += 1;
                }
                local_edges += 1;
            }
        }
        if local_edges == 0 {
            return Ok(());
        }

        let mut queue: VecDeque<&str> =
            indegree.iter().filter(|(_, d)| **d == 0).map(|(n, _)| *n).collect();
        let mut visited = 0usize;
        while let Some(node) = queue.pop_front() {
            visited += 1;
            for succ in succs.get(node).into_iter().flatten() {
                if let Some(deg) = indegree.get_mut(succ) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(succ);
                    }
                }
            }
        }

        if visited == indegree.len() {
            Ok(())
        } else {
            Err(BlueprintError::Cycle)
        }
    }
}

#[cfg(test)]
#[path = "blueprint_tests.rs"]
mod tests;
