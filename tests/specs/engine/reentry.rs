// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool re-entry: RUNNING → PENDING self-mutation with accumulated context.

use crate::specs::harness::TestPlatform;
use serde_json::json;
use trellis_adapters::{FakeToolRuntime, StaticRegistry};
use trellis_core::test_support::json_map;
use trellis_core::{AgentResult, Intent, TaskStatus, ToolResult};
use trellis_storage::Gateway;

#[tokio::test]
async fn weather_agent_calls_tool_then_answers() {
    let tools = FakeToolRuntime::new()
        .with_output("search_weather", ToolResult::success(json!({"temperature": 25})));
    let platform = TestPlatform::start(StaticRegistry::new(), tools).await;

    platform.agents.script(
        "weather",
        vec![
            AgentResult::Success {
                intent: Intent::ToolCallRequest {
                    tool_id: "search_weather".to_string(),
                    arguments: json_map(json!({"city": "Beijing"})),
                },
            },
            AgentResult::Success {
                intent: Intent::FinalAnswer {
                    content: json_map(json!({"answer": "It is 25°C in Beijing"})),
                },
            },
        ],
    );

    let task = platform.create_task("Agent:weather", json!({"city": "Beijing"})).await;
    let settled = platform.wait_status(task.id, TaskStatus::Completed).await;

    // the final answer replaces the working context; the tool trace stays
    // reachable through history
    let result = settled.result.unwrap();
    assert_eq!(result["answer"], "It is 25°C in Beijing");
    assert!(!result.contains_key("last_tool_result"));

    // two invocations: the second carried the merged tool context
    let calls = platform.agents.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].context.is_empty());
    assert_eq!(calls[1].context["last_tool_result"]["output"]["temperature"], 25);
    assert_eq!(platform.tools.call_count("search_weather"), 1);

    // history shows the transient RUNNING → PENDING flip before completion
    let history = platform.gateway.task_history(task.id).await.unwrap();
    let statuses: Vec<TaskStatus> = history.iter().map(|h| h.snapshot.status).collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Running,   // first claim
            TaskStatus::Running,   // tool result merged
            TaskStatus::Pending,   // re-entry flip
            TaskStatus::Running,   // second claim
            TaskStatus::Completed, // final answer
        ],
    );

    platform.shutdown().await;
}
