// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Condition routing: only the matching branch receives a contribution and
//! wakes up.

use crate::specs::harness::TestPlatform;
use serde_json::json;
use trellis_adapters::{FakeToolRuntime, StaticRegistry};
use trellis_core::test_support::{edge_with, json_map, TaskBuilder};
use trellis_core::{AgentResult, Intent, TaskStatus};
use trellis_storage::Gateway;

#[tokio::test]
async fn low_score_takes_the_low_branch_only() {
    let platform = TestPlatform::start(StaticRegistry::new(), FakeToolRuntime::new()).await;

    // Branch targets idle PENDING; their creation notifications are long
    // consumed, so only an edge contribution can wake them.
    let pass = TaskBuilder::default()
        .workflow(platform.workflow_id)
        .assignee("Agent:pass")
        .build();
    let fail = TaskBuilder::default()
        .workflow(platform.workflow_id)
        .assignee("Agent:fail")
        .build();
    platform.gateway.insert_task(pass.clone());
    platform.gateway.insert_task(fail.clone());

    platform.agents.script(
        "grader",
        vec![AgentResult::Success {
            intent: Intent::FinalAnswer { content: json_map(json!({"score": 40})) },
        }],
    );
    platform.agents.script(
        "fail",
        vec![AgentResult::Success {
            intent: Intent::FinalAnswer { content: json_map(json!({"handled": true})) },
        }],
    );

    let grader = platform.create_task("Agent:grader", json!({})).await;
    platform.gateway.insert_edge(edge_with(
        platform.workflow_id,
        grader.id,
        pass.id,
        Some("result.score >= 60"),
        &[("score", "result.score")],
    ));
    platform.gateway.insert_edge(edge_with(
        platform.workflow_id,
        grader.id,
        fail.id,
        Some("result.score < 60"),
        &[("score", "result.score")],
    ));

    platform.wait_status(grader.id, TaskStatus::Completed).await;

    // the low branch woke up with the projected score and ran
    let settled_fail = platform.wait_status(fail.id, TaskStatus::Completed).await;
    assert_eq!(settled_fail.result, Some(json_map(json!({"handled": true}))));
    let fail_calls: Vec<_> =
        platform.agents.calls().into_iter().filter(|c| c.agent_id == "fail").collect();
    assert_eq!(fail_calls.len(), 1);
    assert_eq!(fail_calls[0].input_data.get("score"), Some(&json!(40)));

    // the high branch never received a contribution and never ran
    platform.quiesce().await;
    let untouched = platform.gateway.get_task(pass.id).await.unwrap();
    assert_eq!(untouched.status, TaskStatus::Pending);
    assert_eq!(untouched.version, 1);
    assert!(!untouched.input_data.contains_key("score"));
    assert_eq!(platform.agents.call_count("pass"), 0);

    platform.shutdown().await;
}

#[tokio::test]
async fn failure_details_route_recovery_branches() {
    let platform = TestPlatform::start(StaticRegistry::new(), FakeToolRuntime::new()).await;

    let cleanup = TaskBuilder::default()
        .workflow(platform.workflow_id)
        .assignee("Agent:cleanup")
        .build();
    platform.gateway.insert_task(cleanup.clone());

    platform.agents.script(
        "brittle",
        vec![AgentResult::Failure {
            details: trellis_core::FailureDetails::new(
                trellis_core::FailureKind::Timeout,
                "deadline exceeded",
            ),
        }],
    );
    platform.agents.script(
        "cleanup",
        vec![AgentResult::Success {
            intent: Intent::FinalAnswer { content: json_map(json!({"cleaned": true})) },
        }],
    );

    let brittle = platform.create_task("Agent:brittle", json!({})).await;
    platform.gateway.insert_edge(edge_with(
        platform.workflow_id,
        brittle.id,
        cleanup.id,
        Some("result.failure_details.type == \"TIMEOUT\""),
        &[("cause", "result.failure_details.message")],
    ));

    let settled = platform.wait_terminal(brittle.id).await;
    assert_eq!(settled.status, TaskStatus::Failed);

    // FAILED is terminal: edges do not fire for it, even with a matching
    // condition — failure routing needs the failure captured in a COMPLETED
    // task's result
    platform.quiesce().await;
    let untouched = platform.gateway.get_task(cleanup.id).await.unwrap();
    assert_eq!(untouched.status, TaskStatus::Pending);
    assert_eq!(untouched.version, 1);

    platform.shutdown().await;
}
