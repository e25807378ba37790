// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.

use std::time::Duration;
use trellis_adapters::DEFAULT_QUEUE;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Dispatcher loops per process.
    pub workers: usize,
    /// Broker queue name.
    pub queue: String,
    /// Per-task deadline for agent/tool invocations.
    pub task_deadline: Duration,
    /// Max attempts for retried store operations.
    pub store_retry_max: u32,
    /// How long shutdown waits for in-flight work before aborting.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue: DEFAULT_QUEUE.to_string(),
            task_deadline: Duration::from_secs(300),
            store_retry_max: 5,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}
