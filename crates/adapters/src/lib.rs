// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-adapters: the engine's external collaborators.
//!
//! Agent runtime, tool runtime, capability registry and broker queue are
//! consumed through the traits here and injected into the engine. None of
//! them may touch the task store.

pub mod agent;
pub mod broker;
pub mod registry;
pub mod tool;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use agent::{AgentCall, AgentRuntime, HttpAgentRuntime};
pub use broker::{Broker, MemoryBroker, PgBroker, QueueMessage, DEFAULT_QUEUE};
pub use registry::{CapabilityRegistry, HttpCapabilityRegistry, StaticRegistry};
pub use tool::{HttpToolRuntime, ToolRuntime};

#[cfg(any(test, feature = "test-support"))]
pub use testing::{FakeAgentRuntime, FakeToolRuntime};

/// Errors crossing an adapter boundary.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("agent runtime error: {0}")]
    AgentRuntime(String),

    #[error("tool runtime error: {0}")]
    ToolRuntime(String),

    #[error("malformed queue payload: {0}")]
    Payload(String),
}

impl From<sqlx::Error> for AdapterError {
    fn from(err: sqlx::Error) -> Self {
        Self::Broker(err.to_string())
    }
}
