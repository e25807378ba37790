// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory broker for tests and single-process runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Broker, QueueMessage};
use crate::AdapterError;

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    queue: Mutex<VecDeque<QueueMessage>>,
    wakeup: Notify,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.lock().is_empty()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn push(&self, msg: &QueueMessage) -> Result<(), AdapterError> {
        self.inner.queue.lock().push_back(msg.clone());
        self.inner.wakeup.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<QueueMessage>, AdapterError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(msg) = self.inner.queue.lock().pop_front() {
                return Ok(Some(msg));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // Race between the empty check and notify is covered by the
            // timeout bound.
            tokio::select! {
                _ = self.inner.wakeup.notified() => {}
                _ = tokio::time::sleep(deadline - now) => {}
            }
        }
    }
}
