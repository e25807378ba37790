// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-storage: the persistence gateway.
//!
//! The sole mediator to the relational store. Exposes task/edge CRUD,
//! row-level task locking, compare-and-set updates with history snapshots,
//! and atomic blueprint application. Change notifications are emitted by
//! store-side triggers on commit; the gateway never notifies by hand.

pub mod error;
pub mod gateway;
pub mod notify;
pub mod pg;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use error::StorageError;
pub use gateway::{BlueprintCommit, Gateway, TaskLease};
pub use notify::{ChangeEvent, CHANNEL_TASK_CREATED, CHANNEL_TASK_UPDATED};
pub use pg::PgGateway;

#[cfg(any(test, feature = "memory"))]
pub use memory::{MemoryGateway, MemoryLease};
