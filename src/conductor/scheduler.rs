//! DAG scheduler / coordinator (C7) — the hardest part.
//!
//! Grounded on `workflow_coordinator.py`'s `execute_workflow` /
//! `_execute_level` / `_execute_agent` / `_build_task_prompt` methods (level
//! barrier via `asyncio.gather(..., return_exceptions=True)`, fail-fast on
//! the first agent failure in a level) and on `voice_parser.py`'s
//! `calculate_execution_order` static method (Kahn's algorithm topological
//! leveling). The `tokio::spawn`-per-task, level-barrier-via-`join_all`
//! shape mirrors `execute_parallel`/`execute_hierarchical` in this
//! codebase's own orchestration engine.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::conductor::agent_factory::AgentFactory;
use crate::conductor::error::{OrchestrationError, Result};
use crate::conductor::event_bus::EventBus;
use crate::conductor::llm::LlmRuntime;
use crate::conductor::model::{AgentConfig, AgentState, TriggerKind, WorkflowState};
use crate::conductor::quality_gate::QualityGateEngine;
use crate::conductor::store::WorkingSetStore;

/// Kahn's-algorithm topological leveling over `depends_on` edges.
///
/// Returns `L0, L1, ...` where every role in `Li` depends only on roles in
/// `L0..Li`. An empty intermediate pass with roles still remaining means the
/// graph is cyclic, reported as [`OrchestrationError::InvalidPlan`].
pub fn topological_levels(children: &[AgentConfig]) -> Result<Vec<Vec<String>>> {
    let roles: HashSet<&str> = children.iter().map(|c| c.role.as_str()).collect();
    for c in children {
        for dep in &c.depends_on {
            if !roles.contains(dep.as_str()) {
                return Err(OrchestrationError::InvalidPlan(format!(
                    "role '{}' depends_on unknown role '{}'",
                    c.role, dep
                )));
            }
        }
    }

    let mut in_degree: HashMap<String, usize> = children
        .iter()
        .map(|c| (c.role.clone(), c.depends_on.len()))
        .collect();
    // successors[x] = roles that depend_on x
    let mut successors: HashMap<String, Vec<String>> = HashMap::new();
    for c in children {
        for dep in &c.depends_on {
            successors
                .entry(dep.clone())
                .or_default()
                .push(c.role.clone());
        }
    }

    let mut remaining: HashSet<String> = children.iter().map(|c| c.role.clone()).collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let mut current: Vec<String> = remaining
            .iter()
            .filter(|r| in_degree.get(*r).copied().unwrap_or(0) == 0)
            .cloned()
            .collect();
        if current.is_empty() {
            return Err(OrchestrationError::InvalidPlan(
                "circular dependency detected in workflow".to_string(),
            ));
        }
        current.sort();
        for role in &current {
            remaining.remove(role);
            if let Some(succs) = successors.get(role) {
                for s in succs {
                    if let Some(d) = in_degree.get_mut(s) {
                        *d = d.saturating_sub(1);
                    }
                }
            }
        }
        levels.push(current);
    }

    Ok(levels)
}

/// Coordinates execution of a single workflow's DAG. One instance is shared
/// (via `Arc`) across every workflow the engine runs; per-workflow
/// cancellation tokens are tracked internally.
pub struct Scheduler {
    factory: Arc<AgentFactory>,
    event_bus: Arc<EventBus>,
    gates: Arc<QualityGateEngine>,
    llm: Arc<dyn LlmRuntime>,
    store: Arc<WorkingSetStore>,
    cancellations: tokio::sync::Mutex<HashMap<String, CancellationToken>>,
}

impl Scheduler {
    pub fn new(
        factory: Arc<AgentFactory>,
        event_bus: Arc<EventBus>,
        gates: Arc<QualityGateEngine>,
        llm: Arc<dyn LlmRuntime>,
        store: Arc<WorkingSetStore>,
    ) -> Self {
        Self {
            factory,
            event_bus,
            gates,
            llm,
            store,
            cancellations: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    async fn token_for(&self, workflow_id: &str) -> CancellationToken {
        let mut map = self.cancellations.lock().await;
        map.entry(workflow_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Drives a workflow from `running` through to a terminal state,
    /// scheduling each topological level in turn. Returns `Ok(())` once the
    /// workflow has reached `completed`, `failed`, or `cancelled`; the
    /// terminal state itself is read back from the factory.
    pub async fn execute_workflow(&self, workflow_id: &str) -> Result<()> {
        let levels = {
            let workflow = self
                .factory
                .get_workflow(workflow_id)
                .ok_or_else(|| OrchestrationError::ValidationError("workflow not found".into()))?;
            match topological_levels(&workflow.plan.children) {
                Ok(levels) => levels,
                Err(e) => {
                    self.factory
                        .update_workflow_state(workflow_id, WorkflowState::Failed);
                    return Err(e);
                }
            }
        };

        self.factory
            .update_workflow_state(workflow_id, WorkflowState::Running);

        let max_parallel = {
            let workflow = self.factory.get_workflow(workflow_id).unwrap();
            workflow.plan.max_parallel as usize
        };
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let cancel = self.token_for(workflow_id).await;

        let timeout_seconds = {
            let workflow = self.factory.get_workflow(workflow_id).unwrap();
            workflow.plan.timeout_seconds
        };
        let deadline_cancel = cancel.clone();
        let timeout_task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(timeout_seconds)) => {
                    deadline_cancel.cancel();
                }
                _ = deadline_cancel.cancelled() => {}
            }
        });

        let mut failed = false;
        let mut cancelled = false;

        'levels: for level in levels {
            if cancel.is_cancelled() {
                cancelled = true;
                break 'levels;
            }

            let mut tasks = Vec::with_capacity(level.len());
            for role in level {
                let this = self.clone_handles();
                let workflow_id = workflow_id.to_string();
                let semaphore = semaphore.clone();
                let cancel = cancel.clone();
                tasks.push(tokio::spawn(async move {
                    this.execute_agent_role(&workflow_id, &role, semaphore, cancel)
                        .await
                }));
            }

            let results = join_all(tasks).await;
            for r in results {
                match r {
                    Ok(Ok(())) => {}
                    Ok(Err(OrchestrationError::Cancelled(_))) => cancelled = true,
                    Ok(Err(_)) => failed = true,
                    Err(join_err) => {
                        log::error!("agent task panicked: {join_err}");
                        failed = true;
                    }
                }
            }

            if failed || cancelled {
                break 'levels;
            }
        }

        timeout_task.abort();
        self.cancellations.lock().await.remove(workflow_id);

        let final_state = if cancelled && !failed {
            WorkflowState::Cancelled
        } else if failed {
            WorkflowState::Failed
        } else {
            WorkflowState::Completed
        };
        self.factory.update_workflow_state(workflow_id, final_state);

        let trigger = match final_state {
            WorkflowState::Completed => TriggerKind::WorkflowCompleted,
            _ => TriggerKind::WorkflowFailed,
        };
        let _ = self
            .event_bus
            .publish(trigger, workflow_id, None, json!({"state": format!("{:?}", final_state)}))
            .await;

        match final_state {
            WorkflowState::Completed => Ok(()),
            WorkflowState::Cancelled => Err(OrchestrationError::Cancelled(workflow_id.to_string())),
            _ => Err(OrchestrationError::AgentError(format!(
                "workflow {workflow_id} failed"
            ))),
        }
    }

    /// Cheap clone of the `Arc` handles this scheduler needs inside a
    /// spawned task (the scheduler itself is not `Clone` because of the
    /// cancellation map, so tasks borrow through cloned `Arc`s instead).
    fn clone_handles(&self) -> SchedulerHandles {
        SchedulerHandles {
            factory: self.factory.clone(),
            event_bus: self.event_bus.clone(),
            gates: self.gates.clone(),
            llm: self.llm.clone(),
            store: self.store.clone(),
        }
    }

    pub async fn cancel_workflow(&self, workflow_id: &str) {
        let token = self.token_for(workflow_id).await;
        token.cancel();
        // Agents still `waiting` transition directly to `cancelled`; running
        // agents observe the token and finish their own transition.
        if let Some(agents) = self.factory.workflow_agents(workflow_id) {
            for agent in agents {
                if agent.state == AgentState::Waiting {
                    self.factory
                        .update_agent_state(&agent.id, AgentState::Cancelled, None, None);
                }
            }
        }
    }

    /// Single-agent variant of execution, with gate application — used by
    /// the engine's `execute_agent` surface independent of a full level
    /// sweep (e.g. re-running one escalation or retry target in isolation).
    pub async fn execute_agent(&self, workflow_id: &str, role: &str) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(1));
        let cancel = self.token_for(workflow_id).await;
        self.clone_handles()
            .execute_agent_role(workflow_id, role, semaphore, cancel)
            .await
    }

    pub async fn pause_workflow(&self, workflow_id: &str) -> Result<()> {
        self.factory
            .update_workflow_state(workflow_id, WorkflowState::Paused);
        Ok(())
    }

    pub async fn resume_workflow(&self, workflow_id: &str) -> Result<()> {
        let workflow = self
            .factory
            .get_workflow(workflow_id)
            .ok_or_else(|| OrchestrationError::ValidationError("workflow not found".into()))?;
        if workflow.state != WorkflowState::Paused {
            return Err(OrchestrationError::ValidationError(format!(
                "workflow {workflow_id} is not paused"
            )));
        }
        self.execute_workflow(workflow_id).await
    }
}

/// The subset of a [`Scheduler`]'s collaborators a spawned per-agent task
/// needs; cloned cheaply (all fields are `Arc`s) into each task.
#[derive(Clone)]
struct SchedulerHandles {
    factory: Arc<AgentFactory>,
    event_bus: Arc<EventBus>,
    gates: Arc<QualityGateEngine>,
    llm: Arc<dyn LlmRuntime>,
    store: Arc<WorkingSetStore>,
}

impl SchedulerHandles {
    async fn execute_agent_role(
        &self,
        workflow_id: &str,
        role: &str,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let agent_id = {
            let workflow = self
                .factory
                .get_workflow(workflow_id)
                .ok_or_else(|| OrchestrationError::ValidationError("workflow not found".into()))?;
            workflow
                .child_agents
                .get(role)
                .map(|a| a.id.clone())
                .ok_or_else(|| {
                    OrchestrationError::ValidationError(format!("agent role '{role}' not found"))
                })?
        };

        self.factory
            .update_agent_state(&agent_id, AgentState::Waiting, None, None);
        let _permit = tokio::select! {
            p = semaphore.acquire_owned() => p.map_err(|e| OrchestrationError::internal(e.to_string()))?,
            _ = cancel.cancelled() => {
                self.factory
                    .update_agent_state(&agent_id, AgentState::Cancelled, None, None);
                return Err(OrchestrationError::Cancelled(role.to_string()));
            }
        };

        self.factory
            .update_agent_state(&agent_id, AgentState::Running, None, None);
        let _ = self
            .event_bus
            .publish(
                TriggerKind::AgentStarted,
                workflow_id,
                Some(&agent_id),
                json!({"role": role}),
            )
            .await;

        let prompt = self.build_task_prompt(workflow_id, role)?;
        let (model, gates) = {
            let workflow = self.factory.get_workflow(workflow_id).unwrap();
            let agent = workflow.child_agents.get(role).unwrap();
            (agent.config.model.clone(), agent.config.quality_gates.clone())
        };

        let run_result = self
            .llm
            .run(&prompt, &model, None, None, &cancel)
            .await;

        let output = match run_result {
            Ok(resp) => serde_json::Value::String(resp.content),
            Err(e) => {
                if cancel.is_cancelled() {
                    self.factory
                        .update_agent_state(&agent_id, AgentState::Cancelled, None, None);
                    return Err(OrchestrationError::Cancelled(role.to_string()));
                }
                self.factory.update_agent_state(
                    &agent_id,
                    AgentState::Failed,
                    None,
                    Some(e.clone()),
                );
                let _ = self
                    .event_bus
                    .publish(
                        TriggerKind::AgentFailed,
                        workflow_id,
                        Some(&agent_id),
                        json!({"error": e}),
                    )
                    .await;
                return Err(OrchestrationError::AgentError(e));
            }
        };

        let agent_id_for_retry = agent_id.clone();
        let prompt_for_retry = prompt.clone();
        let model_for_retry = model.clone();
        let this = self.clone();
        let cancel_for_retry = cancel.clone();
        let retry_fn = move || {
            let this = this.clone();
            let prompt = prompt_for_retry.clone();
            let model = model_for_retry.clone();
            let cancel = cancel_for_retry.clone();
            Box::pin(async move {
                this.llm
                    .run(&prompt, &model, None, None, &cancel)
                    .await
                    .map(|r| serde_json::Value::String(r.content))
                    .map_err(|e| e)
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<serde_json::Value, String>> + Send>>
        };

        let mut current_output = output;
        let mut final_result = None;
        for gate in &gates {
            let result = self
                .gates
                .validate_with_retry(gate, current_output.clone(), &agent_id_for_retry, &retry_fn)
                .await;
            let trigger = if result.passed {
                TriggerKind::QualityGatePassed
            } else {
                TriggerKind::QualityGateFailed
            };
            let _ = self
                .event_bus
                .publish(
                    trigger,
                    workflow_id,
                    Some(&agent_id),
                    json!({"gate_id": gate.gate_id, "passed": result.passed}),
                )
                .await;
            if let Some(out) = result.output.as_str() {
                current_output = serde_json::Value::String(out.to_string());
            }
            if !result.passed {
                if gate.escalate_on_fail {
                    if let Some(target) = &gate.escalation_target {
                        if let Err(e) = self
                            .run_escalation(workflow_id, target, &current_output)
                            .await
                        {
                            self.factory.update_agent_state(
                                &agent_id,
                                AgentState::Failed,
                                None,
                                Some(format!("escalation_failed: {e}")),
                            );
                            return Err(OrchestrationError::EscalationFailed(e.to_string()));
                        }
                    }
                } else {
                    final_result = Some(result);
                    break;
                }
            }
        }

        if let Some(result) = final_result {
            let err = result.error.clone().unwrap_or_else(|| "gate_failed".into());
            self.factory
                .update_agent_state(&agent_id, AgentState::Failed, None, Some(err.clone()));
            return Err(OrchestrationError::GateFailed(err));
        }

        self.factory.update_agent_state(
            &agent_id,
            AgentState::Completed,
            Some(current_output.clone()),
            None,
        );

        let thread_id = self
            .factory
            .get_workflow(workflow_id)
            .and_then(|w| w.metadata.get("thread_id").and_then(|v| v.as_str().map(str::to_string)));
        if let Some(thread_id) = thread_id {
            if let Err(e) = self
                .store
                .update_thread_context(&thread_id, role.to_string(), current_output)
                .await
            {
                log::warn!("failed to write agent '{role}' output into thread {thread_id} context: {e}");
            }
        }

        let _ = self
            .event_bus
            .publish(
                TriggerKind::AgentCompleted,
                workflow_id,
                Some(&agent_id),
                json!({"role": role}),
            )
            .await;
        Ok(())
    }

    async fn run_escalation(
        &self,
        workflow_id: &str,
        target_role: &str,
        context: &serde_json::Value,
    ) -> std::result::Result<(), String> {
        let agent_id = {
            let workflow = self
                .factory
                .get_workflow(workflow_id)
                .ok_or("workflow not found")?;
            workflow
                .child_agents
                .get(target_role)
                .map(|a| a.id.clone())
                .ok_or("escalation target not found")?
        };
        let (model, prompt_base) = {
            let workflow = self.factory.get_workflow(workflow_id).unwrap();
            let agent = workflow.child_agents.get(target_role).unwrap();
            (agent.config.model.clone(), agent.config.system_prompt.clone())
        };
        let prompt = format!("{prompt_base}\n\nRecovery context: {context}");
        let cancel = CancellationToken::new();
        let resp = self
            .llm
            .run(&prompt, &model, None, None, &cancel)
            .await
            .map_err(|e| e)?;
        self.factory.update_agent_state(
            &agent_id,
            AgentState::Completed,
            Some(serde_json::Value::String(resp.content)),
            None,
        );
        Ok(())
    }

    /// Builds the prompt for one agent: its own system prompt, a block of
    /// its dependencies' outputs (declaration order), and workflow metadata
    /// — matching `_build_task_prompt` in `workflow_coordinator.py`.
    fn build_task_prompt(&self, workflow_id: &str, role: &str) -> Result<String> {
        let workflow = self
            .factory
            .get_workflow(workflow_id)
            .ok_or_else(|| OrchestrationError::ValidationError("workflow not found".into()))?;
        let agent = workflow
            .child_agents
            .get(role)
            .ok_or_else(|| OrchestrationError::ValidationError(format!("role '{role}' not found")))?;

        let mut parts = vec![format!("Your role: {role}")];
        parts.push(agent.config.system_prompt.clone());

        if !agent.config.depends_on.is_empty() {
            parts.push("\nContext from dependent agents:".to_string());
            for dep_role in &agent.config.depends_on {
                if let Some(dep_agent) = workflow.child_agents.get(dep_role) {
                    if let Some(output) = &dep_agent.output {
                        parts.push(format!("\n{dep_role} output: {output}"));
                    }
                }
            }
        }

        if !workflow.metadata.is_empty() {
            parts.push(format!("\nWorkflow context: {:?}", workflow.metadata));
        }

        Ok(parts.join("\n"))
    }
}

// A minimal in-crate replacement for a `VecDeque`-based ring buffer used by
// both the event bus and the webhook delivery history.
pub(crate) struct RingBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::model::AgentConfig;

    fn cfg(role: &str, deps: &[&str]) -> AgentConfig {
        AgentConfig {
            role: role.to_string(),
            system_prompt: "do work".to_string(),
            model: "gpt-4o-mini".to_string(),
            tools: vec![],
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            webhooks: vec![],
            quality_gates: vec![],
            metadata: Default::default(),
        }
    }

    #[test]
    fn linear_chain_levels_in_order() {
        let children = vec![cfg("code", &[]), cfg("test", &["code"])];
        let levels = topological_levels(&children).unwrap();
        assert_eq!(levels, vec![vec!["code".to_string()], vec!["test".to_string()]]);
    }

    #[test]
    fn independent_roles_share_a_level() {
        let children = vec![cfg("browser", &[]), cfg("shell", &[])];
        let levels = topological_levels(&children).unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].len(), 2);
    }

    #[test]
    fn cycle_is_rejected() {
        let children = vec![cfg("a", &["b"]), cfg("b", &["a"])];
        let err = topological_levels(&children).unwrap_err();
        assert_eq!(err.kind(), "invalid_plan");
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let children = vec![cfg("a", &["missing"])];
        let err = topological_levels(&children).unwrap_err();
        assert_eq!(err.kind(), "invalid_plan");
    }
}
