// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blocking consumer loop over the broker queue.
//!
//! `N` dispatchers compete on the same queue with no intra-engine
//! coordination; the store's row lock is the arbiter. A per-task fault never
//! crashes the worker — recoverable errors wait for redelivery, fatal ones
//! are recorded and the loop continues.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use trellis_adapters::{AgentRuntime, Broker, CapabilityRegistry, QueueMessage, ToolRuntime};
use trellis_storage::Gateway;

use crate::processor::{ProcessOutcome, TaskProcessor};
use crate::retry::backoff_delay;

/// Bounded broker pop so shutdown is observed promptly.
const POP_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Dispatcher<G, A, T, R, B> {
    processor: Arc<TaskProcessor<G, A, T, R>>,
    broker: Arc<B>,
    worker: usize,
}

impl<G, A, T, R, B> Dispatcher<G, A, T, R, B>
where
    G: Gateway,
    A: AgentRuntime,
    T: ToolRuntime,
    R: CapabilityRegistry,
    B: Broker,
{
    pub fn new(processor: Arc<TaskProcessor<G, A, T, R>>, broker: Arc<B>, worker: usize) -> Self {
        Self { processor, broker, worker }
    }

    /// Run until cancelled. The in-flight `process` call is always allowed
    /// to finish; cancellation only interrupts the idle pop.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker = self.worker, "dispatcher started");
        let mut broker_failures = 0u32;

        loop {
            let popped = tokio::select! {
                _ = cancel.cancelled() => break,
                popped = self.broker.pop(POP_TIMEOUT) => popped,
            };

            let msg = match popped {
                Ok(Some(msg)) => {
                    broker_failures = 0;
                    msg
                }
                Ok(None) => continue,
                Err(err) => {
                    broker_failures += 1;
                    warn!(worker = self.worker, %err, "broker pop failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff_delay(broker_failures)) => continue,
                    }
                }
            };

            self.dispatch(msg).await;
        }

        info!(worker = self.worker, "dispatcher stopped");
    }

    async fn dispatch(&self, msg: QueueMessage) {
        let span = info_span!(
            "process",
            task_id = %msg.task_id,
            worker = self.worker,
            traceparent = msg.traceparent.as_deref().unwrap_or(""),
        );

        async {
            match self.processor.process(msg.task_id).await {
                Ok(ProcessOutcome::Advanced) => {}
                Ok(ProcessOutcome::Busy) => {
                    debug!("another worker owns the task, dropped");
                }
                Ok(ProcessOutcome::Dropped) => {
                    debug!("stale or terminal event, dropped");
                }
                Err(err) if err.is_recoverable() => {
                    debug!(%err, "recoverable processing error, awaiting redelivery");
                }
                Err(err) => {
                    // recorded, never crashes the worker
                    error!(%err, "task processing failed");
                }
            }
        }
        .instrument(span)
        .await;
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
