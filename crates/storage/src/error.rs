// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway error taxonomy.

use trellis_core::{BlueprintError, TaskId, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Another worker holds the row; expected under contention, retried via
    /// the next notification.
    #[error("task {0} is locked by another worker")]
    LockMiss(TaskId),

    /// Optimistic-concurrency loss; expected, retried via re-notification.
    #[error("version conflict on task {task_id}: expected {expected}, found {found}")]
    VersionConflict { task_id: TaskId, expected: i64, found: i64 },

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("no history snapshot for task {task_id} at version {version}")]
    SnapshotNotFound { task_id: TaskId, version: i64 },

    #[error("illegal status transition {from} -> {to} on task {task_id}")]
    IllegalTransition { task_id: TaskId, from: TaskStatus, to: TaskStatus },

    #[error(transparent)]
    Blueprint(#[from] BlueprintError),

    /// Blueprint edge refers to a task row that does not exist.
    #[error("blueprint refers to unknown task {0}")]
    BlueprintUnknownTask(TaskId),

    /// Blueprint edge crosses workflow boundaries.
    #[error("blueprint refers to task {0} of a different workflow")]
    BlueprintForeignWorkflow(TaskId),

    /// Unique-constraint violation (e.g. a blueprint replayed after commit).
    #[error("store rejected duplicate insert: {0}")]
    Conflict(String),

    /// Connection-level failure worth retrying with backoff.
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("store error: {0}")]
    Database(String),

    #[error("corrupt row for task {task_id}: {detail}")]
    CorruptRow { task_id: TaskId, detail: String },
}

impl StorageError {
    /// Expected concurrency outcomes; the caller drops the event and waits
    /// for redelivery.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::LockMiss(_) | Self::VersionConflict { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                // 23505: unique_violation
                if db.code().as_deref() == Some("23505") {
                    Self::Conflict(db.message().to_string())
                } else {
                    Self::Database(err.to_string())
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Transient(err.to_string()),
            _ => Self::Database(err.to_string()),
        }
    }
}
