// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability registry interface.

use async_trait::async_trait;
use std::collections::HashMap;
use trellis_core::AgentRole;

/// Role lookup for agents. Consulted when an agent emits a plan intent:
/// only `Planner` agents may splice new subgraphs in.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync + 'static {
    /// `None` when the agent is unknown to the registry.
    async fn agent_role(&self, agent_id: &str) -> Option<AgentRole>;
}

/// Registry backed by a fixed role map (configuration-driven deployments
/// and tests).
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    roles: HashMap<String, AgentRole>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, agent_id: impl Into<String>, role: AgentRole) -> Self {
        self.roles.insert(agent_id.into(), role);
        self
    }

    pub fn planner(self, agent_id: impl Into<String>) -> Self {
        self.with_role(agent_id, AgentRole::Planner)
    }

    pub fn worker(self, agent_id: impl Into<String>) -> Self {
        self.with_role(agent_id, AgentRole::Worker)
    }
}

#[async_trait]
impl CapabilityRegistry for StaticRegistry {
    async fn agent_role(&self, agent_id: &str) -> Option<AgentRole> {
        self.roles.get(agent_id).copied()
    }
}

/// HTTP client for a remote capability registry.
///
/// `GET {base}/agents/{id}` answering `{"role": "PLANNER" | "WORKER", ...}`.
/// Any transport or decode failure reads as "unknown agent", which callers
/// treat as not-a-planner.
#[derive(Clone)]
pub struct HttpCapabilityRegistry {
    client: reqwest::Client,
    base: String,
}

#[derive(serde::Deserialize)]
struct AgentEntry {
    role: AgentRole,
}

impl HttpCapabilityRegistry {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        Self { client, base: base.into() }
    }
}

#[async_trait]
impl CapabilityRegistry for HttpCapabilityRegistry {
    async fn agent_role(&self, agent_id: &str) -> Option<AgentRole> {
        let url = format!("{}/agents/{}", self.base.trim_end_matches('/'), agent_id);
        let response = self.client.get(&url).send().await.ok()?.error_for_status().ok()?;
        response.json::<AgentEntry>().await.ok().map(|entry| entry.role)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
