// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capped exponential backoff for transient store failures.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

const BASE_DELAY: Duration = Duration::from_millis(50);
const MAX_DELAY: Duration = Duration::from_secs(2);

/// Run `op` up to `max_attempts` times, sleeping `50ms * 2^n` (capped at 2s)
/// between attempts. Only errors for which `transient` returns true are
/// retried; anything else surfaces immediately.
pub async fn with_backoff<T, E, F, Fut>(
    what: &str,
    max_attempts: u32,
    transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < max_attempts && transient(&err) => {
                let delay = backoff_delay(attempt);
                warn!(%err, attempt, delay_ms = delay.as_millis() as u64, "{what} failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    BASE_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_DELAY)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
