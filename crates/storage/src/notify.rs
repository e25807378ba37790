// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Change-feed event shapes.
//!
//! The store's triggers NOTIFY these payloads on commit; the notification
//! bridge decodes them and republishes task ids onto the broker queue. The
//! in-memory gateway emits the same events over a broadcast channel so the
//! full event loop runs in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_core::{TaskId, TaskStatus, WorkflowId};

pub const CHANNEL_TASK_CREATED: &str = "task_created";
pub const CHANNEL_TASK_UPDATED: &str = "task_updated";

/// One row-level change, as carried on the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeEvent {
    TaskCreated {
        task_id: TaskId,
        workflow_id: WorkflowId,
        assignee_id: String,
        status: TaskStatus,
        created_at: DateTime<Utc>,
    },
    TaskUpdated {
        task_id: TaskId,
        status: TaskStatus,
        updated_at: DateTime<Utc>,
    },
}

impl ChangeEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            Self::TaskCreated { .. } => CHANNEL_TASK_CREATED,
            Self::TaskUpdated { .. } => CHANNEL_TASK_UPDATED,
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            Self::TaskCreated { task_id, .. } | Self::TaskUpdated { task_id, .. } => *task_id,
        }
    }

    /// Whether the bridge should re-enqueue this change.
    ///
    /// A RUNNING update marks in-flight work owned by some worker; waking
    /// another worker for it would only send the recovery path chasing a
    /// live task. Crashed RUNNING tasks are re-dispatched by the bridge's
    /// backfill sweep instead.
    pub fn should_enqueue(&self) -> bool {
        !matches!(self, Self::TaskUpdated { status: TaskStatus::Running, .. })
    }

    /// Decode a NOTIFY payload from the named channel.
    pub fn decode(channel: &str, payload: &str) -> Result<Self, serde_json::Error> {
        match channel {
            CHANNEL_TASK_CREATED => {
                let event: CreatedPayload = serde_json::from_str(payload)?;
                Ok(Self::TaskCreated {
                    task_id: event.task_id,
                    workflow_id: event.workflow_id,
                    assignee_id: event.assignee_id,
                    status: event.status,
                    created_at: event.created_at,
                })
            }
            _ => {
                let event: UpdatedPayload = serde_json::from_str(payload)?;
                Ok(Self::TaskUpdated {
                    task_id: event.task_id,
                    status: event.status,
                    updated_at: event.updated_at,
                })
            }
        }
    }
}

#[derive(Deserialize)]
struct CreatedPayload {
    task_id: TaskId,
    workflow_id: WorkflowId,
    assignee_id: String,
    status: TaskStatus,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct UpdatedPayload {
    task_id: TaskId,
    status: TaskStatus,
    updated_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
