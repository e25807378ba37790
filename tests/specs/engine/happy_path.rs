// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy path: a single agent task answers and completes.

use crate::specs::harness::TestPlatform;
use serde_json::json;
use trellis_adapters::{FakeToolRuntime, StaticRegistry};
use trellis_core::test_support::json_map;
use trellis_core::{AgentResult, Intent, TaskStatus};
use trellis_storage::Gateway;

#[tokio::test]
async fn final_answer_completes_through_the_full_loop() {
    let platform = TestPlatform::start(StaticRegistry::new(), FakeToolRuntime::new()).await;
    platform.agents.script(
        "echo",
        vec![AgentResult::Success {
            intent: Intent::FinalAnswer { content: json_map(json!({"echo": "hi"})) },
        }],
    );

    let task = platform.create_task("Agent:echo", json!({"msg": "hi"})).await;
    let settled = platform.wait_status(task.id, TaskStatus::Completed).await;

    assert_eq!(settled.result, Some(json_map(json!({"echo": "hi"}))));

    // one RUNNING version, one COMPLETED version, each with a history row
    let history = platform.gateway.task_history(task.id).await.unwrap();
    let recorded: Vec<(i64, TaskStatus)> =
        history.iter().map(|h| (h.version_number, h.snapshot.status)).collect();
    assert_eq!(recorded, vec![(2, TaskStatus::Running), (3, TaskStatus::Completed)]);

    assert_eq!(platform.agents.call_count("echo"), 1);
    let summary = platform.shutdown().await;
    assert!(summary.is_clean());
}

#[tokio::test]
async fn agent_failure_is_terminal_and_routable() {
    let platform = TestPlatform::start(StaticRegistry::new(), FakeToolRuntime::new()).await;
    platform.agents.script(
        "flaky",
        vec![AgentResult::Failure {
            details: trellis_core::FailureDetails::new(
                trellis_core::FailureKind::LlmRefusal,
                "cannot comply",
            ),
        }],
    );

    let task = platform.create_task("Agent:flaky", json!({})).await;
    let settled = platform.wait_terminal(task.id).await;

    assert_eq!(settled.status, TaskStatus::Failed);
    let details = &settled.result.unwrap()["failure_details"];
    assert_eq!(details["type"], "LLM_REFUSAL");
    assert_eq!(details["message"], "cannot comply");

    platform.shutdown().await;
}
