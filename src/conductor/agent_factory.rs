//! Agent factory (C6).
//!
//! Grounded on `agent_factory.py`'s `AgentFactory`: owns `workflows` and
//! `agents` maps, is the sole writer of agent `state`/`output`/`error`/
//! `retry_count`/`started_at`/`completed_at`, and stamps `started_at`/
//! `completed_at` automatically on the relevant state transitions rather
//! than requiring every caller to remember to. Each mutating call takes the
//! same coarse lock, which is what "per-agent logical lock" collapses to
//! when agent storage lives inside its parent `Workflow`: transitions never
//! interleave because the whole map is locked for the duration of one
//! mutation.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use crate::conductor::model::{
    AgentConfig, AgentInstance, AgentState, OrchestrationPlan, Workflow, WorkflowState,
};

struct Inner {
    workflows: HashMap<String, Workflow>,
    /// agent_id -> (workflow_id, role), so lookups by bare id don't need to
    /// scan every workflow's child map.
    agent_locations: HashMap<String, (String, String)>,
}

pub struct AgentFactory {
    inner: Mutex<Inner>,
}

impl Default for AgentFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentFactory {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                workflows: HashMap::new(),
                agent_locations: HashMap::new(),
            }),
        }
    }

    /// Creates a workflow with its parent orchestrator agent already
    /// materialized, matching `create_workflow` in the Python source.
    pub fn create_workflow(
        &self,
        plan: OrchestrationPlan,
        metadata: crate::conductor::model::Metadata,
    ) -> Workflow {
        let mut inner = self.inner.lock().unwrap();
        let mut workflow = Workflow::new(plan.clone(), metadata);

        let parent_config = AgentConfig {
            role: plan.parent_role.clone(),
            system_prompt: plan.parent_prompt.clone(),
            model: "gpt-4o".to_string(),
            tools: vec![],
            depends_on: vec![],
            webhooks: vec![],
            quality_gates: vec![],
            metadata: Default::default(),
        };
        let parent_id = format!("agent_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let parent = AgentInstance::new(parent_id.clone(), parent_config);
        inner
            .agent_locations
            .insert(parent_id, (workflow.workflow_id.clone(), plan.parent_role.clone()));
        workflow.parent_agent = Some(parent);

        inner.workflows.insert(workflow.workflow_id.clone(), workflow.clone());
        workflow
    }

    /// Spawns a single child agent in an existing workflow.
    pub fn spawn_child_agent(&self, workflow_id: &str, config: AgentConfig) -> Option<AgentInstance> {
        let mut inner = self.inner.lock().unwrap();
        let role = config.role.clone();
        let agent_id = format!("agent_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let instance = AgentInstance::new(agent_id.clone(), config);
        let workflow = inner.workflows.get_mut(workflow_id)?;
        workflow.child_agents.insert(role.clone(), instance.clone());
        inner
            .agent_locations
            .insert(agent_id, (workflow_id.to_string(), role));
        Some(instance)
    }

    /// Pre-materializes every child agent named by the workflow's plan at
    /// once, for `spawn_children`'s bulk-registration semantics.
    pub fn spawn_children(&self, workflow_id: &str) -> Vec<AgentInstance> {
        let configs = {
            let inner = self.inner.lock().unwrap();
            match inner.workflows.get(workflow_id) {
                Some(w) => w.plan.children.clone(),
                None => return vec![],
            }
        };
        configs
            .into_iter()
            .filter_map(|c| self.spawn_child_agent(workflow_id, c))
            .collect()
    }

    pub fn update_agent_state(
        &self,
        agent_id: &str,
        state: AgentState,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        let Some((workflow_id, role)) = inner.agent_locations.get(agent_id).cloned() else {
            log::warn!("update_agent_state: unknown agent {agent_id}");
            return;
        };
        let Some(workflow) = inner.workflows.get_mut(&workflow_id) else {
            return;
        };
        let agent = if workflow.parent_agent.as_ref().map(|a| &a.id) == Some(&agent_id.to_string()) {
            workflow.parent_agent.as_mut()
        } else {
            workflow.child_agents.get_mut(&role)
        };
        let Some(agent) = agent else { return };

        agent.state = state;
        if state == AgentState::Running && agent.started_at.is_none() {
            agent.started_at = Some(Utc::now());
        }
        if state.is_terminal() {
            agent.completed_at = Some(Utc::now());
        }
        if let Some(output) = output {
            agent.output = Some(output);
        }
        if let Some(error) = error {
            agent.error = Some(error);
        }
    }

    pub fn update_workflow_state(&self, workflow_id: &str, state: WorkflowState) {
        let mut inner = self.inner.lock().unwrap();
        let Some(workflow) = inner.workflows.get_mut(workflow_id) else {
            return;
        };
        workflow.state = state;
        if state == WorkflowState::Running && workflow.started_at.is_none() {
            workflow.started_at = Some(Utc::now());
        }
        if state.is_terminal() {
            workflow.completed_at = Some(Utc::now());
        }
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Option<Workflow> {
        self.inner.lock().unwrap().workflows.get(workflow_id).cloned()
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<AgentInstance> {
        let inner = self.inner.lock().unwrap();
        let (workflow_id, role) = inner.agent_locations.get(agent_id)?;
        let workflow = inner.workflows.get(workflow_id)?;
        if workflow.parent_agent.as_ref().map(|a| a.id.as_str()) == Some(agent_id) {
            workflow.parent_agent.clone()
        } else {
            workflow.child_agents.get(role).cloned()
        }
    }

    pub fn get_agent_by_role(&self, workflow_id: &str, role: &str) -> Option<AgentInstance> {
        let inner = self.inner.lock().unwrap();
        inner.workflows.get(workflow_id)?.child_agents.get(role).cloned()
    }

    pub fn workflow_agents(&self, workflow_id: &str) -> Option<Vec<AgentInstance>> {
        let inner = self.inner.lock().unwrap();
        let workflow = inner.workflows.get(workflow_id)?;
        let mut agents: Vec<AgentInstance> = workflow.child_agents.values().cloned().collect();
        if let Some(parent) = &workflow.parent_agent {
            agents.push(parent.clone());
        }
        Some(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn plan() -> OrchestrationPlan {
        OrchestrationPlan {
            workflow_id: "wf_test".to_string(),
            parent_role: "orchestrator".to_string(),
            parent_prompt: "coordinate".to_string(),
            children: vec![AgentConfig {
                role: "code".to_string(),
                system_prompt: "write code".to_string(),
                model: "gpt-4o-mini".to_string(),
                tools: vec![],
                depends_on: vec![],
                webhooks: vec![],
                quality_gates: vec![],
                metadata: Default::default(),
            }],
            webhooks: vec![],
            max_parallel: 5,
            timeout_seconds: 600,
            metadata: Default::default(),
        }
    }

    #[test]
    fn agent_state_transitions_stamp_timestamps() {
        let factory = AgentFactory::new();
        let workflow = factory.create_workflow(plan(), Map::new());
        let children = factory.spawn_children(&workflow.workflow_id);
        let agent = &children[0];

        factory.update_agent_state(&agent.id, AgentState::Running, None, None);
        let updated = factory.get_agent(&agent.id).unwrap();
        assert!(updated.started_at.is_some());
        assert!(updated.completed_at.is_none());

        factory.update_agent_state(
            &agent.id,
            AgentState::Completed,
            Some(serde_json::json!("done")),
            None,
        );
        let updated = factory.get_agent(&agent.id).unwrap();
        assert!(updated.completed_at.is_some());
        assert_eq!(updated.output, Some(serde_json::json!("done")));
    }
}
