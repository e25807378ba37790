// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool runtime interface.

use crate::AdapterError;
use async_trait::async_trait;
use trellis_core::{JsonMap, ToolResult};

/// Deterministic function invoked by name with typed arguments.
///
/// A tool that fails reports it in the returned [`ToolResult`]; an
/// `Err(AdapterError)` means the runtime itself was unreachable.
#[async_trait]
pub trait ToolRuntime: Send + Sync + 'static {
    async fn invoke(&self, tool_id: &str, arguments: &JsonMap) -> Result<ToolResult, AdapterError>;
}

/// HTTP client for a remote tool runtime service.
///
/// `POST {base}/tools/{id}/invoke` with `{"arguments": ...}`; the service
/// answers with a [`ToolResult`] JSON document.
#[derive(Clone)]
pub struct HttpToolRuntime {
    client: reqwest::Client,
    base: String,
}

impl HttpToolRuntime {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        Self { client, base: base.into() }
    }
}

#[async_trait]
impl ToolRuntime for HttpToolRuntime {
    async fn invoke(&self, tool_id: &str, arguments: &JsonMap) -> Result<ToolResult, AdapterError> {
        let url = format!("{}/tools/{}/invoke", self.base.trim_end_matches('/'), tool_id);
        let body = serde_json::json!({ "arguments": arguments });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::ToolRuntime(e.to_string()))?
            .error_for_status()
            .map_err(|e| AdapterError::ToolRuntime(e.to_string()))?;

        response
            .json::<ToolResult>()
            .await
            .map_err(|e| AdapterError::ToolRuntime(format!("malformed tool result: {e}")))
    }
}
