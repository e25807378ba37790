// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blueprint expansion: a planner splices a subgraph in and the spliced
//! tasks run off their creation notifications.

use crate::specs::harness::TestPlatform;
use serde_json::json;
use trellis_adapters::{FakeToolRuntime, StaticRegistry};
use trellis_core::test_support::json_map;
use trellis_core::{
    AgentResult, Condition, DataFlow, EdgeDefinition, Intent, NodeRef, PlanBlueprint,
    TaskDefinition, TaskId, TaskStatus,
};
use trellis_storage::Gateway;

fn research_blueprint() -> PlanBlueprint {
    PlanBlueprint {
        new_tasks: vec![
            TaskDefinition {
                local_id: "research".into(),
                assignee: "Agent:researcher".into(),
                input_data: json_map(json!({"city": "Beijing"})),
                directives: None,
            },
            TaskDefinition {
                local_id: "write".into(),
                assignee: "Agent:writer".into(),
                input_data: json_map(json!({})),
                directives: None,
            },
        ],
        new_edges: vec![EdgeDefinition {
            source: NodeRef::Local("research".into()),
            target: NodeRef::Local("write".into()),
            condition: Some(Condition::builtin("result.success == true")),
            data_flow: Some(DataFlow {
                mappings: [("weather_data".to_string(), "result.data".to_string())]
                    .into_iter()
                    .collect(),
            }),
        }],
        update_tasks: vec![],
    }
}

#[tokio::test]
async fn planner_splices_subgraph_and_it_executes() {
    let platform = TestPlatform::start(
        StaticRegistry::new().planner("planner"),
        FakeToolRuntime::new(),
    )
    .await;

    platform.agents.script(
        "planner",
        vec![AgentResult::Success { intent: Intent::Plan(research_blueprint()) }],
    );
    platform.agents.script(
        "researcher",
        vec![AgentResult::Success {
            intent: Intent::FinalAnswer {
                content: json_map(json!({"success": true, "data": {"temperature": 25}})),
            },
        }],
    );
    platform.agents.script(
        "writer",
        vec![AgentResult::Success {
            intent: Intent::FinalAnswer { content: json_map(json!({"report": "sunny"})) },
        }],
    );

    let planner = platform.create_task("Agent:planner", json!({})).await;
    let settled = platform.wait_status(planner.id, TaskStatus::Completed).await;

    let result = settled.result.unwrap();
    let task_ids = result["task_ids"].as_object().unwrap();
    let research_id: TaskId = task_ids["research"].as_str().unwrap().parse().unwrap();
    let write_id: TaskId = task_ids["write"].as_str().unwrap().parse().unwrap();
    assert_eq!(result["plan_id"], task_ids["research"].clone());

    // the spliced tasks ran to completion off their own notifications
    let research = platform.wait_status(research_id, TaskStatus::Completed).await;
    assert_eq!(research.parent_id, Some(planner.id));
    assert_eq!(research.workflow_id, planner.workflow_id);
    let write = platform.wait_status(write_id, TaskStatus::Completed).await;
    assert_eq!(write.parent_id, Some(planner.id));

    // the edge row landed with its condition and mapping intact
    let edges = platform.gateway.outgoing_edges(research_id).await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target_task_id, write_id);
    assert_eq!(
        edges[0].condition.as_ref().map(|c| c.expression.as_str()),
        Some("result.success == true"),
    );
    assert_eq!(
        edges[0].data_flow.as_ref().and_then(|df| df.mappings.get("weather_data")).map(String::as_str),
        Some("result.data"),
    );

    platform.shutdown().await;
}

#[tokio::test]
async fn worker_role_blueprint_is_rejected_atomically() {
    let platform = TestPlatform::start(
        StaticRegistry::new().worker("impostor"),
        FakeToolRuntime::new(),
    )
    .await;

    platform.agents.script(
        "impostor",
        vec![AgentResult::Success { intent: Intent::Plan(research_blueprint()) }],
    );

    let task = platform.create_task("Agent:impostor", json!({})).await;
    let settled = platform.wait_terminal(task.id).await;

    assert_eq!(settled.status, TaskStatus::Failed);
    let details = &settled.result.unwrap()["failure_details"];
    assert_eq!(details["type"], "PLANNER_ROLE_VIOLATION");

    // no blueprint rows were created
    platform.quiesce().await;
    assert!(platform.gateway.unsettled_task_ids().await.unwrap().is_empty());

    platform.shutdown().await;
}
