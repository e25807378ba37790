// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification bridge: change feed → broker queue.
//!
//! Listens on the store's `task_created`/`task_updated` channels and
//! republishes task ids onto the broker. At-least-once: a backfill sweep of
//! every unsettled task runs at startup and after any feed gap, and a push
//! that keeps failing past the outage horizon terminates the process for
//! the supervisor to restart — events are never dropped silently.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trellis_adapters::{Broker, QueueMessage};
use trellis_core::TaskId;
use trellis_storage::{
    ChangeEvent, Gateway, StorageError, CHANNEL_TASK_CREATED, CHANNEL_TASK_UPDATED,
};

const RETRY_BASE: Duration = Duration::from_millis(100);
const RETRY_CAP: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The broker stayed unavailable past the configured horizon; the
    /// process must exit rather than drop events.
    #[error("broker unavailable past outage horizon: {0}")]
    OutageHorizon(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("change feed error: {0}")]
    Listener(String),
}

pub struct Bridge<B> {
    broker: Arc<B>,
    outage_horizon: Duration,
}

impl<B: Broker> Bridge<B> {
    pub fn new(broker: Arc<B>, outage_horizon: Duration) -> Self {
        Self { broker, outage_horizon }
    }

    /// Push one task id, retrying with capped exponential backoff. Gives up
    /// only when the outage horizon is exceeded.
    pub async fn forward(&self, task_id: TaskId) -> Result<(), BridgeError> {
        let start = tokio::time::Instant::now();
        let mut attempt = 0u32;
        loop {
            match self.broker.push(&QueueMessage::new(task_id)).await {
                Ok(()) => {
                    debug!(%task_id, "enqueued");
                    return Ok(());
                }
                Err(err) => {
                    if start.elapsed() >= self.outage_horizon {
                        return Err(BridgeError::OutageHorizon(err.to_string()));
                    }
                    let delay = RETRY_BASE
                        .saturating_mul(2u32.saturating_pow(attempt))
                        .min(RETRY_CAP);
                    warn!(%task_id, %err, delay_ms = delay.as_millis() as u64, "push failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Re-enqueue every non-terminal task. Restores at-least-once delivery
    /// across listener downtime; duplicates are the processor's problem and
    /// it is idempotent.
    pub async fn sweep<G: Gateway>(&self, gateway: &G) -> Result<usize, BridgeError> {
        let ids = gateway.unsettled_task_ids().await?;
        for id in &ids {
            self.forward(*id).await?;
        }
        Ok(ids.len())
    }

    /// Blocking bridge loop over a Postgres change feed. Returns `Ok(())`
    /// on cancellation, `Err` on anything that warrants a process exit.
    pub async fn run_pg<G: Gateway>(
        &self,
        pool: &PgPool,
        gateway: &G,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let mut listener = PgListener::connect_with(pool)
            .await
            .map_err(|e| BridgeError::Listener(e.to_string()))?;
        listener
            .listen_all([CHANNEL_TASK_CREATED, CHANNEL_TASK_UPDATED])
            .await
            .map_err(|e| BridgeError::Listener(e.to_string()))?;

        let swept = self.sweep(gateway).await?;
        info!(swept, "startup backfill sweep complete");

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("bridge shutting down");
                    return Ok(());
                }
                received = listener.try_recv() => received,
            };

            match received {
                Ok(Some(notification)) => {
                    match ChangeEvent::decode(notification.channel(), notification.payload()) {
                        Ok(event) if event.should_enqueue() => {
                            self.forward(event.task_id()).await?;
                        }
                        Ok(event) => {
                            debug!(task_id = %event.task_id(), "in-flight update, not enqueued");
                        }
                        Err(err) => {
                            warn!(channel = notification.channel(), %err, "undecodable notification, skipped");
                        }
                    }
                }
                Ok(None) => {
                    // Feed connection dropped; it re-listens on the next
                    // receive and the sweep covers whatever the gap missed.
                    warn!("change feed connection lost, resweeping");
                    let swept = self.sweep(gateway).await?;
                    info!(swept, "post-reconnect sweep complete");
                }
                Err(err) => return Err(BridgeError::Listener(err.to_string())),
            }
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
