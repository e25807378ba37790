// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runtime interface.

use crate::AdapterError;
use async_trait::async_trait;
use serde::Serialize;
use trellis_core::{AgentResult, JsonMap, TaskId};

/// One agent invocation. `context` carries the task's accumulated `result`
/// map so a re-entering agent sees earlier tool results.
#[derive(Debug, Clone, Copy)]
pub struct AgentCall<'a> {
    pub task_id: TaskId,
    pub agent_id: &'a str,
    pub input_data: &'a JsonMap,
    pub directives: Option<&'a JsonMap>,
    pub context: &'a JsonMap,
}

/// The LLM-driven reasoner behind `Agent:<id>` assignees.
///
/// Implementations must be side-effect-free with respect to the task store;
/// everything they want done comes back as a declarative [`AgentResult`].
#[async_trait]
pub trait AgentRuntime: Send + Sync + 'static {
    async fn invoke(&self, call: AgentCall<'_>) -> Result<AgentResult, AdapterError>;
}

/// HTTP client for a remote agent runtime service.
///
/// `POST {base}/agents/{id}/invoke` with the call payload; the service
/// answers with an [`AgentResult`] JSON document.
#[derive(Clone)]
pub struct HttpAgentRuntime {
    client: reqwest::Client,
    base: String,
}

#[derive(Serialize)]
struct InvokeBody<'a> {
    task_id: TaskId,
    input_data: &'a JsonMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    directives: Option<&'a JsonMap>,
    context: &'a JsonMap,
}

impl HttpAgentRuntime {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        Self { client, base: base.into() }
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn invoke(&self, call: AgentCall<'_>) -> Result<AgentResult, AdapterError> {
        let url = format!("{}/agents/{}/invoke", self.base.trim_end_matches('/'), call.agent_id);
        let body = InvokeBody {
            task_id: call.task_id,
            input_data: call.input_data,
            directives: call.directives,
            context: call.context,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::AgentRuntime(e.to_string()))?
            .error_for_status()
            .map_err(|e| AdapterError::AgentRuntime(e.to_string()))?;

        response
            .json::<AgentResult>()
            .await
            .map_err(|e| AdapterError::AgentRuntime(format!("malformed agent result: {e}")))
    }
}
