// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test platform: the full engine loop over in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trellis_adapters::{
    Broker, FakeAgentRuntime, FakeToolRuntime, MemoryBroker, QueueMessage, StaticRegistry,
};
use trellis_core::test_support::json_map;
use trellis_core::{NewTask, Task, TaskId, TaskStatus, WorkflowId};
use trellis_engine::{Engine, EngineConfig, RunSummary};
use trellis_storage::{Gateway, MemoryGateway};

const WAIT_BUDGET: Duration = Duration::from_secs(5);

pub struct TestPlatform {
    pub gateway: Arc<MemoryGateway>,
    pub broker: Arc<MemoryBroker>,
    pub agents: Arc<FakeAgentRuntime>,
    pub tools: Arc<FakeToolRuntime>,
    pub workflow_id: WorkflowId,
    cancel: CancellationToken,
    engine_task: JoinHandle<RunSummary>,
    pump_task: JoinHandle<()>,
}

impl TestPlatform {
    pub async fn start(registry: StaticRegistry, tools: FakeToolRuntime) -> Self {
        Self::start_with_workers(registry, tools, 2).await
    }

    pub async fn start_with_workers(
        registry: StaticRegistry,
        tools: FakeToolRuntime,
        workers: usize,
    ) -> Self {
        let gateway = Arc::new(MemoryGateway::new());
        let broker = Arc::new(MemoryBroker::new());
        let agents = Arc::new(FakeAgentRuntime::new());
        let tools = Arc::new(tools);
        let cancel = CancellationToken::new();

        // Bridge stand-in: change feed → broker, same enqueue policy as the
        // real bridge (in-flight RUNNING updates stay out of the queue).
        let mut feed = gateway.subscribe();
        let pump_broker = Arc::clone(&broker);
        let pump_cancel = cancel.clone();
        let pump_task = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    received = feed.recv() => received,
                };
                match received {
                    Ok(event) if event.should_enqueue() => {
                        let _ = pump_broker.push(&QueueMessage::new(event.task_id())).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let config = EngineConfig {
            workers,
            shutdown_grace: Duration::from_secs(5),
            ..EngineConfig::default()
        };
        let engine = Engine::new(
            Arc::clone(&gateway),
            Arc::clone(&agents),
            Arc::clone(&tools),
            Arc::new(registry),
            Arc::clone(&broker),
            config,
        );
        let engine_cancel = cancel.clone();
        let engine_task = tokio::spawn(async move { engine.run(engine_cancel).await });

        Self {
            gateway,
            broker,
            agents,
            tools,
            workflow_id: WorkflowId::new(),
            cancel,
            engine_task,
            pump_task,
        }
    }

    /// Create a task in this platform's workflow; the feed pump enqueues it.
    pub async fn create_task(&self, assignee: &str, input: serde_json::Value) -> Task {
        self.gateway
            .create_task(NewTask {
                workflow_id: self.workflow_id,
                parent_id: None,
                assignee: assignee.to_string(),
                input_data: json_map(input),
                directives: None,
            })
            .await
            .expect("create_task")
    }

    pub async fn wait_for(
        &self,
        task_id: TaskId,
        what: &str,
        pred: impl Fn(&Task) -> bool,
    ) -> Task {
        let deadline = tokio::time::Instant::now() + WAIT_BUDGET;
        loop {
            let task = self.gateway.get_task(task_id).await.expect("task exists");
            if pred(&task) {
                return task;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {what} on task {task_id}; \
                     status={} version={}",
                    task.status, task.version,
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_status(&self, task_id: TaskId, status: TaskStatus) -> Task {
        self.wait_for(task_id, status.as_str(), |t| t.status == status).await
    }

    pub async fn wait_terminal(&self, task_id: TaskId) -> Task {
        self.wait_for(task_id, "terminal status", |t| t.status.is_terminal()).await
    }

    /// Let in-flight dispatches settle (queue drained and a breath taken).
    pub async fn quiesce(&self) {
        let deadline = tokio::time::Instant::now() + WAIT_BUDGET;
        while !self.broker.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    pub async fn shutdown(self) -> RunSummary {
        self.cancel.cancel();
        let summary = self.engine_task.await.expect("engine task");
        self.pump_task.await.expect("pump task");
        summary
    }
}
