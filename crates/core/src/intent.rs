// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative agent intents and the failure taxonomy.

use crate::blueprint::PlanBlueprint;
use crate::task::JsonMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What an agent wants to happen next. Produced by the agent runtime,
/// consumed by the task processor within one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Intent {
    /// Terminal answer; the task completes with `content` as its result.
    #[serde(rename = "final_answer")]
    FinalAnswer { content: JsonMap },

    /// Synchronous tool invocation followed by agent re-entry.
    #[serde(rename = "tool_call")]
    ToolCallRequest { tool_id: String, arguments: JsonMap },

    /// New subgraph to splice into the workflow (planner agents only).
    #[serde(rename = "plan")]
    Plan(PlanBlueprint),
}

/// Outcome of one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum AgentResult {
    #[serde(rename = "success")]
    Success { intent: Intent },
    #[serde(rename = "failure")]
    Failure { details: FailureDetails },
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self { status: ToolStatus::Success, output: Some(output), error_type: None, error_message: None }
    }

    pub fn failure(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Failure,
            output: None,
            error_type: Some(error_type.into()),
            error_message: Some(message.into()),
        }
    }

    /// JSON shape merged into `result.last_tool_result` on re-entry.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Failure classification persisted into `result.failure_details.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    LlmRefusal,
    ToolExecutionFailed,
    ValidationError,
    ResourceUnavailable,
    Timeout,
    AgentExecutionError,
    UnknownAssignee,
    PlannerRoleViolation,
    BlueprintUnresolvedRef,
    BlueprintCycle,
    StoreUnavailable,
}

crate::simple_display! {
    FailureKind {
        LlmRefusal => "LLM_REFUSAL",
        ToolExecutionFailed => "TOOL_EXECUTION_FAILED",
        ValidationError => "VALIDATION_ERROR",
        ResourceUnavailable => "RESOURCE_UNAVAILABLE",
        Timeout => "TIMEOUT",
        AgentExecutionError => "AGENT_EXECUTION_ERROR",
        UnknownAssignee => "UNKNOWN_ASSIGNEE",
        PlannerRoleViolation => "PLANNER_ROLE_VIOLATION",
        BlueprintUnresolvedRef => "BLUEPRINT_UNRESOLVED_REF",
        BlueprintCycle => "BLUEPRINT_CYCLE",
        StoreUnavailable => "STORE_UNAVAILABLE",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetails {
    #[serde(rename = "type")]
    pub kind: FailureKind,
    pub message: String,
}

impl FailureDetails {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Result map for a failed task: `{"failure_details": {type, message}}`.
    ///
    /// Downstream edge conditions route on `result.failure_details.type`.
    pub fn to_result(&self) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert(
            "failure_details".to_string(),
            serde_json::to_value(self).unwrap_or(Value::Null),
        );
        map
    }
}

/// Role of an agent per the external capability registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    Planner,
    Worker,
}

#[cfg(test)]
#[path = "intent_tests.rs"]
mod tests;
