// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon binaries.
//!
//! Optional values fall back to their documented defaults on absence or a
//! value that fails to parse; only endpoints are hard requirements.

use std::time::Duration;

use crate::DaemonError;

/// Relational store connection string (required).
pub fn store_dsn() -> Result<String, DaemonError> {
    required("STORE_DSN")
}

/// Broker connection string; defaults to the store DSN (the default broker
/// rides the same Postgres).
pub fn broker_dsn() -> Result<String, DaemonError> {
    match std::env::var("BROKER_DSN") {
        Ok(dsn) if !dsn.is_empty() => Ok(dsn),
        _ => store_dsn(),
    }
}

/// Queue name (default `task_execution_queue`).
pub fn task_queue() -> String {
    std::env::var("TASK_QUEUE")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| trellis_adapters::DEFAULT_QUEUE.to_string())
}

/// Dispatcher count per process (default 4).
pub fn workers() -> usize {
    parsed("WORKERS", 4)
}

/// Per-task deadline (default 300 s).
pub fn task_deadline() -> Duration {
    Duration::from_secs(parsed("TASK_DEADLINE_SECONDS", 300))
}

/// Max store-op retries (default 5).
pub fn store_retry_max() -> u32 {
    parsed("STORE_RETRY_MAX", 5)
}

/// Grace period on SIGTERM (default 30 s).
pub fn shutdown_grace() -> Duration {
    Duration::from_secs(parsed("SHUTDOWN_GRACE_SECONDS", 30))
}

/// How long the bridge keeps retrying an unavailable broker before it
/// terminates for the supervisor to restart it (default 60 s).
pub fn bridge_outage_horizon() -> Duration {
    Duration::from_secs(parsed("BRIDGE_OUTAGE_HORIZON_SECONDS", 60))
}

/// Agent runtime service endpoint (required for `trellisd`).
pub fn agent_runtime_url() -> Result<String, DaemonError> {
    required("AGENT_RUNTIME_URL")
}

/// Tool runtime service endpoint (required for `trellisd`).
pub fn tool_runtime_url() -> Result<String, DaemonError> {
    required("TOOL_RUNTIME_URL")
}

/// Capability registry endpoint (required for `trellisd`).
pub fn registry_url() -> Result<String, DaemonError> {
    required("REGISTRY_URL")
}

/// Store connection pool size; a connection per worker plus headroom for
/// propagation and the bridge.
pub fn pool_size(workers: usize) -> u32 {
    (workers as u32).saturating_add(4)
}

fn required(key: &'static str) -> Result<String, DaemonError> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or(DaemonError::MissingEnv(key))
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok()).unwrap_or(default)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
