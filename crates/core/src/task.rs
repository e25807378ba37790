// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity and state machine.

use crate::id::{TaskId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open JSON payload boundary (`input_data`, `result`, `directives`).
pub type JsonMap = serde_json::Map<String, Value>;

/// Lifecycle status of a task.
///
/// Legal transitions: `Pending -> Running -> {Completed, Failed, Cancelled}`,
/// plus `Running -> Pending` when an agent emits a tool-call intent
/// (re-entry). Failure and cancellation may short-circuit directly from
/// `Pending` (malformed assignee, operator cancel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a transition to `next` is legal.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

crate::simple_display! {
    TaskStatus {
        Pending => "PENDING",
        Running => "RUNNING",
        Completed => "COMPLETED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown task status: {other:?}")),
        }
    }
}

/// Parsed assignee reference: `"Agent:<id>"` or `"Tool:<id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assignee {
    Agent(String),
    Tool(String),
}

impl Assignee {
    pub fn is_agent(&self) -> bool {
        matches!(self, Self::Agent(_))
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Agent(id) | Self::Tool(id) => id,
        }
    }
}

impl std::fmt::Display for Assignee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent(id) => write!(f, "Agent:{id}"),
            Self::Tool(id) => write!(f, "Tool:{id}"),
        }
    }
}

/// Malformed assignee string (persisted as an `UNKNOWN_ASSIGNEE` failure).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown assignee format: {0:?}")]
pub struct AssigneeParseError(pub String);

impl std::str::FromStr for Assignee {
    type Err = AssigneeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("Agent", id)) if !id.is_empty() => Ok(Self::Agent(id.to_string())),
            Some(("Tool", id)) if !id.is_empty() => Ok(Self::Tool(id.to_string())),
            _ => Err(AssigneeParseError(s.to_string())),
        }
    }
}

/// A node of the workflow graph.
///
/// Mutated only by the task processor under the store's row lock; never
/// deleted (terminal states are soft-terminal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub workflow_id: WorkflowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    /// Raw assignee string; parse with [`Task::parse_assignee`]. Kept raw so
    /// a malformed value loads fine and fails the task instead of the row
    /// decode.
    pub assignee: String,
    pub status: TaskStatus,
    pub input_data: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directives: Option<JsonMap>,
    /// Monotonic; bumped by exactly 1 on every persisted mutation.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn parse_assignee(&self) -> Result<Assignee, AssigneeParseError> {
        self.assignee.parse()
    }
}

/// Creation shape for a task row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub workflow_id: WorkflowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub assignee: String,
    #[serde(default)]
    pub input_data: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directives: Option<JsonMap>,
}

/// Compare-and-set update shape. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directives: Option<JsonMap>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    pub fn completed(result: JsonMap) -> Self {
        Self { status: Some(TaskStatus::Completed), result: Some(result), ..Self::default() }
    }

    pub fn failed(result: JsonMap) -> Self {
        Self { status: Some(TaskStatus::Failed), result: Some(result), ..Self::default() }
    }
}

/// One history row: the full task as of `version_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub version_number: i64,
    pub snapshot: Task,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
