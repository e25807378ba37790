// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock contention and duplicate delivery: the row lock is the arbiter.

use crate::specs::harness::TestPlatform;
use serde_json::json;
use std::time::Duration;
use trellis_adapters::{Broker, FakeToolRuntime, QueueMessage, StaticRegistry};
use trellis_core::test_support::{json_map, TaskBuilder};
use trellis_core::{AgentResult, Intent, TaskStatus, ToolResult};
use trellis_storage::Gateway;

#[tokio::test]
async fn held_row_lock_silences_competing_dispatches() {
    let platform =
        TestPlatform::start_with_workers(StaticRegistry::new(), FakeToolRuntime::new(), 2).await;
    platform.agents.script(
        "echo",
        vec![AgentResult::Success {
            intent: Intent::FinalAnswer { content: json_map(json!({"done": true})) },
        }],
    );

    // seeded quietly so the lock is ours before any dispatch races us
    let task = TaskBuilder::default()
        .workflow(platform.workflow_id)
        .assignee("Agent:echo")
        .build();
    platform.gateway.insert_task(task.clone());

    // an operator (or a crashed peer) holds the row; dispatches bounce off
    let held = platform.gateway.lock_task(task.id).await.unwrap();
    platform.broker.push(&QueueMessage::new(task.id)).await.unwrap();
    platform.quiesce().await;
    assert_eq!(platform.agents.call_count("echo"), 0);
    assert_eq!(platform.gateway.get_task(task.id).await.unwrap().version, 1);

    // lock released: the next delivery advances it exactly once
    drop(held);
    platform.broker.push(&QueueMessage::new(task.id)).await.unwrap();
    platform.wait_status(task.id, TaskStatus::Completed).await;
    assert_eq!(platform.agents.call_count("echo"), 1);

    platform.shutdown().await;
}

#[tokio::test]
async fn stale_redelivery_never_reinvokes_a_deterministic_tool() {
    let tools =
        FakeToolRuntime::new().with_output("fetch", ToolResult::success(json!({"rows": 3})));
    let platform = TestPlatform::start(StaticRegistry::new(), tools).await;

    let task = platform.create_task("Tool:fetch", json!({})).await;
    platform.wait_status(task.id, TaskStatus::Completed).await;
    assert_eq!(platform.tools.call_count("fetch"), 1);
    let version = platform.gateway.get_task(task.id).await.unwrap().version;

    // replay the dispatcher event three times
    for _ in 0..3 {
        platform.broker.push(&QueueMessage::new(task.id)).await.unwrap();
    }
    platform.quiesce().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(platform.tools.call_count("fetch"), 1);
    assert_eq!(platform.gateway.get_task(task.id).await.unwrap().version, version);

    platform.shutdown().await;
}
