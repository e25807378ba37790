// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-task state machine.
//!
//! `process(task_id)` locks the row, routes by status, interprets the
//! assignee's outcome into the next persisted state and releases. Agent and
//! tool invocations happen outside any store transaction; the lock is
//! re-acquired afterwards and a version CAS guards against a racing worker.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};
use trellis_adapters::{
    AdapterError, AgentCall, AgentRuntime, CapabilityRegistry, ToolRuntime,
};
use trellis_core::{
    AgentResult, AgentRole, Assignee, Edge, FailureDetails, FailureKind, Intent, JsonMap,
    PlanBlueprint, Task, TaskId, TaskPatch, TaskStatus, ToolResult, ToolStatus,
};
use trellis_expr::{apply, deep_merge, evaluate, EvalContext};
use trellis_storage::{Gateway, StorageError, TaskLease};

use crate::config::EngineConfig;
use crate::retry::with_backoff;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl ProcessError {
    /// Expected under contention or transient outage; the dispatcher logs
    /// quietly and moves on — redelivery or a later change covers it.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_contention() || e.is_transient(),
            Self::Adapter(AdapterError::Broker(_)) => true,
            Self::Adapter(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// State was written.
    Advanced,
    /// Lock or version lost to another worker; expected.
    Busy,
    /// Terminal status or stale event; nothing to do.
    Dropped,
}

pub struct TaskProcessor<G, A, T, R> {
    gateway: Arc<G>,
    agents: Arc<A>,
    tools: Arc<T>,
    registry: Arc<R>,
    task_deadline: Duration,
    store_retry_max: u32,
}

impl<G, A, T, R> TaskProcessor<G, A, T, R>
where
    G: Gateway,
    A: AgentRuntime,
    T: ToolRuntime,
    R: CapabilityRegistry,
{
    pub fn new(
        gateway: Arc<G>,
        agents: Arc<A>,
        tools: Arc<T>,
        registry: Arc<R>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            gateway,
            agents,
            tools,
            registry,
            task_deadline: config.task_deadline,
            store_retry_max: config.store_retry_max,
        }
    }

    /// Entry point: one dispatch of one task id.
    pub async fn process(&self, task_id: TaskId) -> Result<ProcessOutcome, ProcessError> {
        let lease = match self.lock_with_retry(task_id).await {
            Ok(lease) => lease,
            Err(StorageError::LockMiss(_)) => {
                debug!(%task_id, "lock miss, another worker has it");
                return Ok(ProcessOutcome::Busy);
            }
            Err(StorageError::TaskNotFound(_)) => {
                warn!(%task_id, "notified task does not exist, dropping");
                return Ok(ProcessOutcome::Dropped);
            }
            Err(e) => return Err(e.into()),
        };

        let task = lease.task().clone();
        match task.status {
            TaskStatus::Pending => self.execute(lease, task, false).await,
            // Only possible if a worker died mid-flight; recover as PENDING.
            TaskStatus::Running => {
                warn!(%task_id, version = task.version, "found RUNNING under lock, recovering");
                self.execute(lease, task, true).await
            }
            TaskStatus::Completed => self.propagate(lease, task).await,
            TaskStatus::Failed | TaskStatus::Cancelled => {
                debug!(%task_id, status = %task.status, "terminal task, dropping");
                lease.rollback().await?;
                Ok(ProcessOutcome::Dropped)
            }
        }
    }

    async fn lock_with_retry(&self, task_id: TaskId) -> Result<G::Lease, StorageError> {
        with_backoff("lock_task", self.store_retry_max, StorageError::is_transient, || {
            self.gateway.lock_task(task_id)
        })
        .await
    }

    /// PENDING (or recovered RUNNING) task: run its assignee.
    async fn execute(
        &self,
        mut lease: G::Lease,
        task: Task,
        recovered: bool,
    ) -> Result<ProcessOutcome, ProcessError> {
        let assignee = match task.parse_assignee() {
            Ok(assignee) => assignee,
            Err(err) => {
                let details = FailureDetails::new(FailureKind::UnknownAssignee, err.to_string());
                lease.update(TaskPatch::failed(details.to_result()), task.version).await?;
                lease.commit().await?;
                warn!(task_id = %task.id, %err, "unknown assignee");
                return Ok(ProcessOutcome::Advanced);
            }
        };

        // Mark RUNNING and release the lock; invocations never hold a store
        // transaction. A recovered task is already RUNNING.
        let running_version = if recovered {
            task.version
        } else {
            lease.update(TaskPatch::status(TaskStatus::Running), task.version).await?
        };
        lease.commit().await?;

        match assignee {
            Assignee::Agent(agent_id) => {
                self.run_agent(&task, &agent_id, running_version).await
            }
            Assignee::Tool(tool_id) => self.run_tool(&task, &tool_id, running_version).await,
        }
    }

    /// Invoke the agent, then interpret its intent under a fresh lock with
    /// a version CAS at `running_version`.
    async fn run_agent(
        &self,
        task: &Task,
        agent_id: &str,
        running_version: i64,
    ) -> Result<ProcessOutcome, ProcessError> {
        let context = task.result.clone().unwrap_or_default();
        let call = AgentCall {
            task_id: task.id,
            agent_id,
            input_data: &task.input_data,
            directives: task.directives.as_ref(),
            context: &context,
        };

        let outcome = tokio::time::timeout(self.task_deadline, self.agents.invoke(call)).await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => AgentResult::Failure {
                details: FailureDetails::new(FailureKind::AgentExecutionError, err.to_string()),
            },
            Err(_) => AgentResult::Failure {
                details: FailureDetails::new(
                    FailureKind::Timeout,
                    format!("agent exceeded {}s deadline", self.task_deadline.as_secs()),
                ),
            },
        };

        let Some(mut lease) = self.relock(task.id, running_version).await? else {
            return Ok(ProcessOutcome::Busy);
        };

        match result {
            AgentResult::Failure { details } => {
                lease.update(TaskPatch::failed(details.to_result()), running_version).await?;
                lease.commit().await?;
                debug!(task_id = %task.id, "agent reported failure");
                Ok(ProcessOutcome::Advanced)
            }
            AgentResult::Success { intent: Intent::FinalAnswer { content } } => {
                lease.update(TaskPatch::completed(content), running_version).await?;
                lease.commit().await?;
                debug!(task_id = %task.id, "agent final answer");
                Ok(ProcessOutcome::Advanced)
            }
            AgentResult::Success { intent: Intent::ToolCallRequest { tool_id, arguments } } => {
                self.reenter_with_tool(lease, task.id, &tool_id, &arguments).await
            }
            AgentResult::Success { intent: Intent::Plan(blueprint) } => {
                self.expand_plan(lease, task, agent_id, &blueprint, running_version).await
            }
        }
    }

    /// Agent asked for a tool: invoke synchronously, fold the result into
    /// the task context and flip RUNNING back to PENDING. The update
    /// notification re-enqueues the task and the agent re-enters with the
    /// enriched context.
    async fn reenter_with_tool(
        &self,
        mut lease: G::Lease,
        task_id: TaskId,
        tool_id: &str,
        arguments: &JsonMap,
    ) -> Result<ProcessOutcome, ProcessError> {
        let tool_result = self.invoke_tool(tool_id, arguments).await;

        let mut merge = JsonMap::new();
        merge.insert("last_tool_result".to_string(), tool_result.to_json());
        let merged_version = lease.merge_context(merge).await?;
        lease.update(TaskPatch::status(TaskStatus::Pending), merged_version).await?;
        lease.commit().await?;

        debug!(%task_id, tool_id, "tool result merged, task re-entered");
        Ok(ProcessOutcome::Advanced)
    }

    /// A task assigned directly to a tool; no re-entry.
    async fn run_tool(
        &self,
        task: &Task,
        tool_id: &str,
        running_version: i64,
    ) -> Result<ProcessOutcome, ProcessError> {
        let tool_result = self.invoke_tool(tool_id, &task.input_data).await;

        let Some(mut lease) = self.relock(task.id, running_version).await? else {
            return Ok(ProcessOutcome::Busy);
        };

        match tool_result.status {
            ToolStatus::Success => {
                let result = match tool_result.output {
                    Some(Value::Object(map)) => map,
                    Some(other) => {
                        let mut map = JsonMap::new();
                        map.insert("output".to_string(), other);
                        map
                    }
                    None => JsonMap::new(),
                };
                lease.update(TaskPatch::completed(result), running_version).await?;
            }
            ToolStatus::Failure => {
                let kind = match tool_result.error_type.as_deref() {
                    Some("TIMEOUT") => FailureKind::Timeout,
                    Some("RESOURCE_UNAVAILABLE") => FailureKind::ResourceUnavailable,
                    _ => FailureKind::ToolExecutionFailed,
                };
                let details = FailureDetails::new(
                    kind,
                    tool_result.error_message.clone().unwrap_or_else(|| "tool failed".into()),
                );
                let mut result = details.to_result();
                // keep the full tool taxonomy alongside the failure details
                result.insert("last_tool_result".to_string(), tool_result.to_json());
                lease.update(TaskPatch::failed(result), running_version).await?;
            }
        }
        lease.commit().await?;
        debug!(task_id = %task.id, tool_id, "tool task settled");
        Ok(ProcessOutcome::Advanced)
    }

    /// Tool invocation with the per-task deadline; runtime errors and
    /// deadline expiry fold into a failed [`ToolResult`] so the taxonomy
    /// lands in task state either way.
    async fn invoke_tool(&self, tool_id: &str, arguments: &JsonMap) -> ToolResult {
        match tokio::time::timeout(self.task_deadline, self.tools.invoke(tool_id, arguments)).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => ToolResult::failure("RESOURCE_UNAVAILABLE", err.to_string()),
            Err(_) => ToolResult::failure(
                "TIMEOUT",
                format!("tool exceeded {}s deadline", self.task_deadline.as_secs()),
            ),
        }
    }

    /// Plan intent: role-check, then expand the blueprint in the same
    /// transaction that completes the planner task.
    async fn expand_plan(
        &self,
        mut lease: G::Lease,
        task: &Task,
        agent_id: &str,
        blueprint: &PlanBlueprint,
        running_version: i64,
    ) -> Result<ProcessOutcome, ProcessError> {
        if self.registry.agent_role(agent_id).await != Some(AgentRole::Planner) {
            lease.rollback().await?;
            let details = FailureDetails::new(
                FailureKind::PlannerRoleViolation,
                format!("agent {agent_id:?} is not a PLANNER"),
            );
            return self.fail_fresh(task.id, running_version, details).await;
        }

        match lease.apply_blueprint(blueprint).await {
            Ok(commit) => {
                let mut result = JsonMap::new();
                if let Some(plan_id) = commit.plan_id() {
                    result.insert("plan_id".to_string(), Value::String(plan_id.to_string()));
                }
                result.insert(
                    "task_ids".to_string(),
                    Value::Object(
                        commit
                            .id_map
                            .iter()
                            .map(|(local, id)| (local.clone(), Value::String(id.to_string())))
                            .collect(),
                    ),
                );
                lease.update(TaskPatch::completed(result), running_version).await?;
                lease.commit().await?;
                debug!(task_id = %task.id, tasks = commit.id_map.len(), "blueprint expanded");
                Ok(ProcessOutcome::Advanced)
            }
            Err(err) => {
                // The lease transaction may be poisoned; fail on a fresh one.
                lease.rollback().await?;
                let kind = match &err {
                    StorageError::Blueprint(trellis_core::BlueprintError::Cycle) => {
                        FailureKind::BlueprintCycle
                    }
                    StorageError::Blueprint(_) | StorageError::BlueprintUnknownTask(_) => {
                        FailureKind::BlueprintUnresolvedRef
                    }
                    _ => FailureKind::ValidationError,
                };
                warn!(task_id = %task.id, %err, "blueprint rejected");
                let details = FailureDetails::new(kind, err.to_string());
                self.fail_fresh(task.id, running_version, details).await
            }
        }
    }

    /// Mark a task FAILED on a fresh lock after its previous lease was
    /// given up. A version mismatch means a racing worker advanced it first.
    async fn fail_fresh(
        &self,
        task_id: TaskId,
        expected_version: i64,
        details: FailureDetails,
    ) -> Result<ProcessOutcome, ProcessError> {
        let Some(mut lease) = self.relock(task_id, expected_version).await? else {
            return Ok(ProcessOutcome::Busy);
        };
        lease.update(TaskPatch::failed(details.to_result()), expected_version).await?;
        lease.commit().await?;
        Ok(ProcessOutcome::Advanced)
    }

    /// Re-acquire the row and verify it has not moved past
    /// `expected_version`. `None` means another worker won the race.
    async fn relock(
        &self,
        task_id: TaskId,
        expected_version: i64,
    ) -> Result<Option<G::Lease>, ProcessError> {
        let lease = match self.lock_with_retry(task_id).await {
            Ok(lease) => lease,
            Err(StorageError::LockMiss(_)) => {
                debug!(%task_id, "lost re-lock race");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if lease.task().version != expected_version {
            debug!(
                %task_id,
                expected = expected_version,
                found = lease.task().version,
                "version moved while unlocked"
            );
            lease.rollback().await?;
            return Ok(None);
        }
        Ok(Some(lease))
    }

    /// Route a completed task's context along its outgoing edges.
    ///
    /// The source lock is released before any target lock is taken — holding
    /// both invites deadlock and the source is immutable once COMPLETED.
    async fn propagate(
        &self,
        lease: G::Lease,
        source: Task,
    ) -> Result<ProcessOutcome, ProcessError> {
        lease.rollback().await?;

        let edges = with_backoff(
            "outgoing_edges",
            self.store_retry_max,
            StorageError::is_transient,
            || self.gateway.outgoing_edges(source.id),
        )
        .await?;
        if edges.is_empty() {
            debug!(task_id = %source.id, "completed leaf, nothing to propagate");
            return Ok(ProcessOutcome::Dropped);
        }

        let empty = JsonMap::new();
        let result = source.result.as_ref().unwrap_or(&empty);
        let ctx = EvalContext::new(result, &source.input_data);

        let mut contended = false;
        for edge in &edges {
            if !edge_is_active(edge, &ctx) {
                continue;
            }
            let delta = match apply(edge.data_flow.as_ref(), &ctx) {
                Ok(delta) => delta,
                Err(err) => {
                    // evaluator faults skip the edge, never fail the source
                    warn!(edge_id = %edge.id, %err, "data-flow error, edge skipped");
                    continue;
                }
            };

            match self.contribute(edge, delta).await {
                Ok(()) => {}
                Err(ProcessError::Storage(StorageError::LockMiss(id))) => {
                    debug!(target_id = %id, "target contended, contribution deferred");
                    contended = true;
                }
                Err(ProcessError::Storage(StorageError::TaskNotFound(id))) => {
                    warn!(edge_id = %edge.id, target_id = %id, "edge target missing");
                }
                Err(e) => return Err(e),
            }
        }

        if contended {
            Ok(ProcessOutcome::Busy)
        } else {
            Ok(ProcessOutcome::Advanced)
        }
    }

    /// One transaction per edge: merge the delta into the target's input if
    /// it is still PENDING, then replay the deltas of every completed
    /// higher-uuid source on top. Conflicting paths at fan-in thus resolve
    /// last-writer-wins by source task uuid ascending, no matter which
    /// source happened to complete first. The version bump's update
    /// notification is what re-enqueues (activates) the target.
    async fn contribute(&self, edge: &Edge, delta: JsonMap) -> Result<(), ProcessError> {
        let mut lease = self.gateway.lock_task(edge.target_task_id).await?;
        let target = lease.task().clone();

        if target.status != TaskStatus::Pending {
            debug!(
                target_id = %target.id,
                status = %target.status,
                "target no longer PENDING, contribution skipped"
            );
            lease.rollback().await?;
            return Ok(());
        }

        let mut input = target.input_data.clone();
        deep_merge(&mut input, &delta);
        self.overlay_higher_sources(&target, edge.source_task_id, &mut input).await?;

        let patch = TaskPatch { input_data: Some(input), ..TaskPatch::default() };
        lease.update(patch, target.version).await?;
        lease.commit().await?;
        debug!(edge_id = %edge.id, target_id = %target.id, "edge contribution merged");
        Ok(())
    }

    /// Replay the deltas of every COMPLETED in-edge source whose uuid is
    /// above `source_id` over `input`, in (source uuid, edge id) order, so
    /// a lower-uuid source finishing late cannot clobber a path a
    /// higher-uuid source already wrote. Completed sources are immutable,
    /// so replayed deltas are deterministic and idempotent.
    async fn overlay_higher_sources(
        &self,
        target: &Task,
        source_id: TaskId,
        input: &mut JsonMap,
    ) -> Result<(), ProcessError> {
        let mut in_edges: Vec<Edge> = self
            .gateway
            .incoming_edges(target.id)
            .await?
            .into_iter()
            .filter(|e| e.source_task_id > source_id)
            .collect();
        if in_edges.is_empty() {
            return Ok(());
        }
        in_edges.sort_by_key(|e| (e.source_task_id, e.id));

        for in_edge in &in_edges {
            let source = match self.gateway.get_task(in_edge.source_task_id).await {
                Ok(source) => source,
                Err(StorageError::TaskNotFound(id)) => {
                    warn!(edge_id = %in_edge.id, source_id = %id, "overlay source missing");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if source.status != TaskStatus::Completed {
                continue;
            }

            let empty = JsonMap::new();
            let result = source.result.as_ref().unwrap_or(&empty);
            let ctx = EvalContext::new(result, &source.input_data);
            if !edge_is_active(in_edge, &ctx) {
                continue;
            }
            match apply(in_edge.data_flow.as_ref(), &ctx) {
                Ok(delta) => deep_merge(input, &delta),
                Err(err) => {
                    warn!(edge_id = %in_edge.id, %err, "data-flow error, overlay edge skipped");
                }
            }
        }
        Ok(())
    }
}

/// Absent condition ⇒ active; unknown dialect or evaluator fault ⇒ inactive
/// (logged), never a task failure.
fn edge_is_active(edge: &Edge, ctx: &EvalContext<'_>) -> bool {
    let Some(condition) = &edge.condition else {
        return true;
    };
    if condition.evaluator != trellis_core::Condition::BUILTIN_EVALUATOR {
        warn!(edge_id = %edge.id, evaluator = %condition.evaluator, "unknown evaluator, edge inactive");
        return false;
    }
    match evaluate(&condition.expression, ctx) {
        Ok(active) => active,
        Err(err) => {
            warn!(edge_id = %edge.id, %err, "condition error, edge inactive");
            false
        }
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
