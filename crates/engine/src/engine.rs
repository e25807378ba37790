// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root: wires the gateway, broker and collaborators into a
//! worker pool and owns graceful shutdown.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trellis_adapters::{AgentRuntime, Broker, CapabilityRegistry, ToolRuntime};
use trellis_storage::Gateway;

use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::processor::TaskProcessor;

/// How a run ended, for exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Workers that exited within the grace period.
    pub drained: usize,
    /// Workers aborted after the grace period expired.
    pub aborted: usize,
    /// Workers that died on a panic or cancellation error.
    pub failed: usize,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.aborted == 0 && self.failed == 0
    }
}

pub struct Engine<G, A, T, R, B> {
    processor: Arc<TaskProcessor<G, A, T, R>>,
    broker: Arc<B>,
    config: EngineConfig,
}

impl<G, A, T, R, B> Engine<G, A, T, R, B>
where
    G: Gateway,
    A: AgentRuntime,
    T: ToolRuntime,
    R: CapabilityRegistry,
    B: Broker,
{
    /// All collaborators are injected; the engine owns no global state.
    pub fn new(
        gateway: Arc<G>,
        agents: Arc<A>,
        tools: Arc<T>,
        registry: Arc<R>,
        broker: Arc<B>,
        config: EngineConfig,
    ) -> Self {
        let processor =
            Arc::new(TaskProcessor::new(gateway, agents, tools, registry, &config));
        Self { processor, broker, config }
    }

    /// Start the worker pool and block until `cancel` fires, then drain:
    /// stop accepting pops, wait up to the grace period for in-flight
    /// `process` calls, abort stragglers.
    pub async fn run(&self, cancel: CancellationToken) -> RunSummary {
        let workers = self.config.workers.max(1);
        info!(workers, queue = %self.config.queue, "engine starting");

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let dispatcher =
                Dispatcher::new(Arc::clone(&self.processor), Arc::clone(&self.broker), worker);
            let cancel = cancel.clone();
            pool.spawn(async move { dispatcher.run(cancel).await });
        }

        cancel.cancelled().await;
        info!(grace_secs = self.config.shutdown_grace.as_secs(), "engine draining");

        let mut summary = RunSummary { drained: 0, aborted: 0, failed: 0 };
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        loop {
            let joined = tokio::select! {
                joined = pool.join_next() => joined,
                _ = tokio::time::sleep_until(deadline) => {
                    summary.aborted = pool.len();
                    warn!(aborted = summary.aborted, "grace period expired, aborting workers");
                    pool.abort_all();
                    while pool.join_next().await.is_some() {}
                    break;
                }
            };
            match joined {
                Some(Ok(())) => summary.drained += 1,
                Some(Err(err)) => {
                    warn!(%err, "worker task failed");
                    summary.failed += 1;
                }
                None => break,
            }
        }

        info!(
            drained = summary.drained,
            aborted = summary.aborted,
            failed = summary.failed,
            "engine stopped"
        );
        summary
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
