// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing subscriber setup for the binaries.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Filter comes from `TRELLIS_LOG`
/// (default `info`). Idempotent so tests can call it freely.
pub fn init() {
    let filter = EnvFilter::try_from_env("TRELLIS_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
