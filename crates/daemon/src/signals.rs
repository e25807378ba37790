// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shutdown signal wiring shared by the binaries.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// SIGINT/SIGTERM propagate as cooperative cancellation. SIGTERM matters:
/// it is what a supervisor (systemd, Docker, k8s) sends on stop, and both
/// binaries are expected to drain gracefully under it.
pub fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let interrupted = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(err) => {
                    error!(%err, "cannot install SIGTERM handler");
                    interrupted.await;
                    info!("interrupt received, shutting down");
                    cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = interrupted => info!("interrupt received, shutting down"),
                _ = term.recv() => info!("SIGTERM received, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            interrupted.await;
            info!("interrupt received, shutting down");
        }

        cancel.cancel();
    });
}
