// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! trellis-bridge: the notification bridge binary.
//!
//! A separate long-running process. Exit codes: 0 clean shutdown, 1 startup
//! error, 2 unrecoverable loop error (including the broker outage horizon —
//! the supervisor is expected to restart the bridge).

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use trellis_adapters::PgBroker;
use trellis_daemon::signals::spawn_signal_handler;
use trellis_daemon::{env, telemetry, Bridge, DaemonError};
use trellis_storage::PgGateway;

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let startup = match startup().await {
        Ok(parts) => parts,
        Err(err) => {
            error!(%err, "bridge startup failed");
            return ExitCode::from(1);
        }
    };
    let (gateway, bridge) = startup;

    match bridge.run_pg(gateway.pool(), &*gateway, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // deliberate crash: better restarted than silently lossy
            error!(%err, "bridge terminating");
            ExitCode::from(2)
        }
    }
}

async fn startup() -> Result<(Arc<PgGateway>, Bridge<PgBroker>), DaemonError> {
    let gateway = Arc::new(PgGateway::connect(&env::store_dsn()?, 4).await?);
    let broker_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&env::broker_dsn()?)
        .await
        .map_err(|e| DaemonError::Broker(e.to_string()))?;
    let broker = Arc::new(PgBroker::new(broker_pool, env::task_queue()));
    let bridge = Bridge::new(broker, env::bridge_outage_horizon());

    info!(queue = env::task_queue(), "bridge starting");
    Ok((gateway, bridge))
}
