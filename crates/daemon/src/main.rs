// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! trellisd: the engine orchestrator binary.
//!
//! Exit codes: 0 clean shutdown, 1 startup error, 2 unrecoverable loop
//! error.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;
use trellis_adapters::{HttpAgentRuntime, HttpCapabilityRegistry, HttpToolRuntime, PgBroker};
use trellis_daemon::signals::spawn_signal_handler;
use trellis_daemon::{env, telemetry, DaemonError};
use trellis_engine::{Engine, EngineConfig, RunSummary};
use trellis_storage::PgGateway;

#[derive(Parser, Debug)]
#[command(name = "trellisd", about = "Trellis workflow engine worker pool")]
struct Cli {
    /// Dispatcher count (overrides WORKERS)
    #[arg(long)]
    workers: Option<usize>,

    /// Broker queue name (overrides TASK_QUEUE)
    #[arg(long)]
    queue: Option<String>,

    /// Per-task deadline in seconds (overrides TASK_DEADLINE_SECONDS)
    #[arg(long)]
    deadline: Option<u64>,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            workers: self.workers.unwrap_or_else(env::workers),
            queue: self.queue.clone().unwrap_or_else(env::task_queue),
            task_deadline: self
                .deadline
                .map(Duration::from_secs)
                .unwrap_or_else(env::task_deadline),
            store_retry_max: env::store_retry_max(),
            shutdown_grace: env::shutdown_grace(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(summary) if summary.is_clean() => ExitCode::SUCCESS,
        Ok(summary) => {
            error!(aborted = summary.aborted, failed = summary.failed, "engine did not drain");
            ExitCode::from(2)
        }
        Err(err) => {
            error!(%err, "startup failed");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary, DaemonError> {
    let config = cli.engine_config();
    let pool_size = env::pool_size(config.workers);

    let gateway = Arc::new(PgGateway::connect(&env::store_dsn()?, pool_size).await?);
    let broker_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(&env::broker_dsn()?)
        .await
        .map_err(|e| DaemonError::Broker(e.to_string()))?;
    let broker = Arc::new(PgBroker::new(broker_pool, config.queue.clone()));

    let client = reqwest::Client::new();
    let agents = Arc::new(HttpAgentRuntime::new(client.clone(), env::agent_runtime_url()?));
    let tools = Arc::new(HttpToolRuntime::new(client.clone(), env::tool_runtime_url()?));
    let registry = Arc::new(HttpCapabilityRegistry::new(client, env::registry_url()?));

    let engine = Engine::new(gateway, agents, tools, registry, broker, config);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    Ok(engine.run(cancel).await)
}
