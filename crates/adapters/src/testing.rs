// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fakes for the collaborator traits.
//!
//! Exported behind the `test-support` feature so engine and workspace tests
//! can drive the full loop without live runtimes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use trellis_core::{AgentResult, FailureDetails, FailureKind, JsonMap, TaskId, ToolResult};

use crate::agent::{AgentCall, AgentRuntime};
use crate::tool::ToolRuntime;
use crate::AdapterError;

/// One recorded agent invocation.
#[derive(Debug, Clone)]
pub struct RecordedAgentCall {
    pub task_id: TaskId,
    pub agent_id: String,
    pub input_data: JsonMap,
    pub context: JsonMap,
}

/// Agent runtime that replays scripted results per agent id.
///
/// Each invocation of an agent pops the front of its script; an exhausted
/// or missing script yields a validation failure rather than a panic, which
/// keeps broken tests observable through task state.
#[derive(Clone, Default)]
pub struct FakeAgentRuntime {
    inner: Arc<Mutex<AgentState>>,
}

#[derive(Default)]
struct AgentState {
    scripts: HashMap<String, VecDeque<AgentResult>>,
    calls: Vec<RecordedAgentCall>,
}

impl FakeAgentRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append scripted results for an agent id (the `<id>` in `Agent:<id>`).
    pub fn script(&self, agent_id: impl Into<String>, results: Vec<AgentResult>) {
        self.inner.lock().scripts.entry(agent_id.into()).or_default().extend(results);
    }

    pub fn calls(&self) -> Vec<RecordedAgentCall> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self, agent_id: &str) -> usize {
        self.inner.lock().calls.iter().filter(|c| c.agent_id == agent_id).count()
    }
}

#[async_trait]
impl AgentRuntime for FakeAgentRuntime {
    async fn invoke(&self, call: AgentCall<'_>) -> Result<AgentResult, AdapterError> {
        let mut state = self.inner.lock();
        state.calls.push(RecordedAgentCall {
            task_id: call.task_id,
            agent_id: call.agent_id.to_string(),
            input_data: call.input_data.clone(),
            context: call.context.clone(),
        });
        let result = state
            .scripts
            .get_mut(call.agent_id)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| AgentResult::Failure {
                details: FailureDetails::new(
                    FailureKind::ValidationError,
                    format!("no scripted result for agent {:?}", call.agent_id),
                ),
            });
        Ok(result)
    }
}

/// Tool runtime with canned outputs per tool id.
#[derive(Clone, Default)]
pub struct FakeToolRuntime {
    inner: Arc<Mutex<ToolState>>,
}

#[derive(Default)]
struct ToolState {
    outputs: HashMap<String, ToolResult>,
    calls: Vec<(String, JsonMap)>,
}

impl FakeToolRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(self, tool_id: impl Into<String>, result: ToolResult) -> Self {
        self.inner.lock().outputs.insert(tool_id.into(), result);
        self
    }

    pub fn calls(&self) -> Vec<(String, JsonMap)> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self, tool_id: &str) -> usize {
        self.inner.lock().calls.iter().filter(|(id, _)| id == tool_id).count()
    }
}

#[async_trait]
impl ToolRuntime for FakeToolRuntime {
    async fn invoke(&self, tool_id: &str, arguments: &JsonMap) -> Result<ToolResult, AdapterError> {
        let mut state = self.inner.lock();
        state.calls.push((tool_id.to_string(), arguments.clone()));
        let result = state.outputs.get(tool_id).cloned().unwrap_or_else(|| {
            ToolResult::failure("UNKNOWN_TOOL", format!("no canned output for {tool_id:?}"))
        });
        Ok(result)
    }
}

#[cfg(test)]
#[path = "testing_tests.rs"]
mod tests;
