// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Intervention rollback against the history trail.

use crate::specs::harness::TestPlatform;
use serde_json::json;
use trellis_adapters::{FakeToolRuntime, StaticRegistry};
use trellis_core::test_support::json_map;
use trellis_core::{AgentResult, Intent, TaskStatus, ToolResult};
use trellis_storage::Gateway;

#[tokio::test]
async fn rollback_mid_reentry_restores_pre_tool_state() {
    let tools = FakeToolRuntime::new()
        .with_output("lookup", ToolResult::success(json!({"value": 7})));
    let platform = TestPlatform::start(StaticRegistry::new(), tools).await;

    platform.agents.script(
        "worker",
        vec![
            AgentResult::Success {
                intent: Intent::ToolCallRequest {
                    tool_id: "lookup".to_string(),
                    arguments: json_map(json!({})),
                },
            },
            AgentResult::Success {
                intent: Intent::FinalAnswer { content: json_map(json!({"v": 7})) },
            },
        ],
    );

    let task = platform.create_task("Agent:worker", json!({})).await;
    let settled = platform.wait_status(task.id, TaskStatus::Completed).await;
    // let the completion event drain so no worker holds the row
    platform.quiesce().await;

    // the merge_context mutation wrote history, so the pre-tool RUNNING
    // state (version 2) is restorable
    let history = platform.gateway.task_history(task.id).await.unwrap();
    assert!(history.iter().any(|h| {
        h.snapshot.status == TaskStatus::Running
            && h.snapshot.result.as_ref().is_some_and(|r| r.contains_key("last_tool_result"))
    }));

    let restored_version =
        platform.gateway.rollback_task(task.id, 2).await.unwrap();
    assert!(restored_version > settled.version);

    let restored = platform.gateway.get_task(task.id).await.unwrap();
    assert_eq!(restored.status, TaskStatus::Running);
    assert_eq!(restored.result, None);

    // rolling back to the same version again: equal content, new version
    let again_version = platform.gateway.rollback_task(task.id, 2).await.unwrap();
    assert_eq!(again_version, restored_version + 1);
    let again = platform.gateway.get_task(task.id).await.unwrap();
    assert_eq!(again.status, restored.status);
    assert_eq!(again.result, restored.result);
    assert_eq!(again.input_data, restored.input_data);

    platform.shutdown().await;
}
