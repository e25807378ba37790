// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker queue: the blocking-pop FIFO that wakes workers.
//!
//! The broker is advisory — at-least-once, duplicate- and order-tolerant.
//! The store's row lock is the arbiter; a duplicate or stale message just
//! costs one cheap dispatch.

mod memory;
mod pg;

pub use memory::MemoryBroker;
pub use pg::PgBroker;

use crate::AdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trellis_core::TaskId;

pub const DEFAULT_QUEUE: &str = "task_execution_queue";

/// One queue element. On the wire this is either a bare task uuid or a JSON
/// object carrying a `traceparent` for trace propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
}

impl QueueMessage {
    pub fn new(task_id: TaskId) -> Self {
        Self { task_id, traceparent: None }
    }

    pub fn with_traceparent(task_id: TaskId, traceparent: impl Into<String>) -> Self {
        Self { task_id, traceparent: Some(traceparent.into()) }
    }

    pub fn encode(&self) -> String {
        if self.traceparent.is_none() {
            self.task_id.to_string()
        } else {
            serde_json::to_string(self).unwrap_or_else(|_| self.task_id.to_string())
        }
    }

    pub fn decode(payload: &str) -> Result<Self, AdapterError> {
        if let Ok(task_id) = payload.trim().parse::<TaskId>() {
            return Ok(Self::new(task_id));
        }
        serde_json::from_str(payload).map_err(|e| AdapterError::Payload(format!("{payload:?}: {e}")))
    }
}

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    async fn push(&self, msg: &QueueMessage) -> Result<(), AdapterError>;

    /// Blocking pop with a bounded timeout; `Ok(None)` on timeout.
    async fn pop(&self, timeout: Duration) -> Result<Option<QueueMessage>, AdapterError>;
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
