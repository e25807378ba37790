// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Trellis daemon library: configuration, telemetry and the notification
//! bridge shared by the `trellisd` and `trellis-bridge` binaries.

pub mod bridge;
pub mod env;
pub mod signals;
pub mod telemetry;

pub use bridge::{Bridge, BridgeError};

/// Errors surfaced by the binaries and mapped to exit codes.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error(transparent)]
    Storage(#[from] trellis_storage::StorageError),

    #[error("broker init error: {0}")]
    Broker(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
