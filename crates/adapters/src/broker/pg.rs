// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres-backed broker queue.
//!
//! Stands in for a Redis list: a `task_queue_messages` table drained with a
//! skip-locked atomic pop, so any number of workers can compete on one
//! queue. The bounded blocking pop is implemented by short-interval polling.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::Row;
use std::time::Duration;
use tokio::time::Instant;

use super::{Broker, QueueMessage};
use crate::AdapterError;

/// Polling interval while the queue is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct PgBroker {
    pool: PgPool,
    queue: String,
}

impl PgBroker {
    pub fn new(pool: PgPool, queue: impl Into<String>) -> Self {
        Self { pool, queue: queue.into() }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Atomic claim-and-delete of the oldest message. `None` when empty.
    async fn try_pop(&self) -> Result<Option<QueueMessage>, AdapterError> {
        let row = sqlx::query(
            "DELETE FROM task_queue_messages \
             WHERE id = ( \
                 SELECT id FROM task_queue_messages \
                 WHERE queue = $1 \
                 ORDER BY id \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT 1 \
             ) \
             RETURNING payload",
        )
        .bind(&self.queue)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: String =
                    row.try_get("payload").map_err(|e| AdapterError::Broker(e.to_string()))?;
                QueueMessage::decode(&payload).map(Some)
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Broker for PgBroker {
    async fn push(&self, msg: &QueueMessage) -> Result<(), AdapterError> {
        sqlx::query(
            "INSERT INTO task_queue_messages (queue, payload, enqueued_at) \
             VALUES ($1, $2, now())",
        )
        .bind(&self.queue)
        .bind(msg.encode())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<QueueMessage>, AdapterError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(msg) = self.try_pop().await? {
                return Ok(Some(msg));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
