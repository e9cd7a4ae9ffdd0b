//! Orchestration engine (C8) — the top-level façade.
//!
//! Grounded on `orchestration_engine.py`'s `OrchestrationEngine`: the
//! constructor wires every collaborator as an explicit field
//! (`self.voice_parser`, `self.factory`, `self.coordinator`,
//! `self.quality_gates`, `self.webhook_adapter`) instead of reaching for
//! module-level singletons, which is exactly the re-architecture item the
//! design document calls out — "wire the full graph once at process
//! startup". `process_voice_command` / `execute_workflow` / `execute_agent`
//! / `spawn_children` / `cancel_workflow` mirror that file's methods one
//! for one, translating scheduler state changes into the bus events it
//! already emits (`workflow.started`, `workflow.completed`,
//! `workflow.failed`).

use std::sync::Arc;

use serde_json::json;

use crate::conductor::agent_factory::AgentFactory;
use crate::conductor::config::Config;
use crate::conductor::error::Result;
use crate::conductor::event_bus::EventBus;
use crate::conductor::llm::LlmRuntime;
use crate::conductor::model::{AgentInstance, Metadata, TriggerKind, Workflow};
use crate::conductor::plan_compiler::PlanCompiler;
use crate::conductor::quality_gate::QualityGateEngine;
use crate::conductor::scheduler::Scheduler;
use crate::conductor::store::WorkingSetStore;
use crate::conductor::webhook::WebhookManager;

/// Ties C1-C7 together behind the public surface named in the design
/// document: `compile_plan`, `create_workflow`, `spawn_children`,
/// `execute_workflow`, `execute_agent`, `cancel_workflow`,
/// `get_workflow(id)`, `get_agent(id)`.
pub struct OrchestrationEngine {
    compiler: PlanCompiler,
    factory: Arc<AgentFactory>,
    event_bus: Arc<EventBus>,
    webhooks: Arc<WebhookManager>,
    scheduler: Arc<Scheduler>,
    store: Arc<WorkingSetStore>,
}

impl OrchestrationEngine {
    pub fn new(llm: Arc<dyn LlmRuntime>, config: Config) -> Arc<Self> {
        let factory = Arc::new(AgentFactory::new());
        let event_bus = EventBus::new(config.event_bus_capacity, config.event_bus_shutdown_deadline);
        let gates = Arc::new(QualityGateEngine::new(llm.clone()));
        let store = WorkingSetStore::new(config.snapshot_path.clone());
        let scheduler = Arc::new(Scheduler::new(
            factory.clone(),
            event_bus.clone(),
            gates,
            llm.clone(),
            store.clone(),
        ));
        let webhooks = Arc::new(WebhookManager::new(
            config.webhook_timeout,
            config.webhook_retry_delays.clone(),
            config.webhook_history_capacity,
        ));

        Arc::new(Self {
            compiler: PlanCompiler::new(llm),
            factory,
            event_bus,
            webhooks,
            scheduler,
            store,
        })
    }

    /// Starts the event bus worker and wires webhook delivery as a handler
    /// for every trigger kind, then loads any existing store snapshot.
    pub async fn start(self: &Arc<Self>) {
        for trigger in ALL_TRIGGERS {
            let webhooks = self.webhooks.clone();
            self.event_bus
                .subscribe(
                    *trigger,
                    Arc::new(move |event| {
                        let webhooks = webhooks.clone();
                        Box::pin(async move {
                            webhooks.deliver(event.trigger, &event.payload).await;
                        })
                    }),
                )
                .await;
        }
        self.event_bus.start();
        self.store.load().await;
    }

    pub fn store(&self) -> &Arc<WorkingSetStore> {
        &self.store
    }

    pub fn webhooks(&self) -> &Arc<WebhookManager> {
        &self.webhooks
    }

    pub async fn compile_plan(&self, utterance: &str, context: Option<&Metadata>) -> Result<crate::conductor::model::VoiceCommandIntent> {
        self.compiler.compile(utterance, context).await
    }

    /// Compiles an utterance, constructs the workflow, emits
    /// `workflow.started`, and returns the handle without awaiting
    /// execution.
    ///
    /// A thread is created in the working-set store up front and its id is
    /// folded into the workflow metadata under `thread_id`, so the scheduler
    /// can let agents write into `Thread.context` as they complete.
    pub async fn process_voice_command(&self, utterance: &str, metadata: Option<Metadata>) -> Result<Workflow> {
        let intent = self.compiler.compile(utterance, metadata.as_ref()).await?;
        let mut metadata = metadata.unwrap_or_default();
        let thread = self.store.create_thread(metadata.clone()).await;
        metadata.insert("thread_id".to_string(), serde_json::Value::String(thread.id));
        let workflow = self.factory.create_workflow(intent.orchestration, metadata);
        let _ = self
            .event_bus
            .publish(
                TriggerKind::WorkflowStarted,
                &workflow.workflow_id,
                None,
                json!({"intent": intent.intent, "confidence": intent.confidence}),
            )
            .await;
        Ok(workflow)
    }

    pub fn create_workflow(&self, plan: crate::conductor::model::OrchestrationPlan, metadata: Metadata) -> Workflow {
        self.factory.create_workflow(plan, metadata)
    }

    /// Pre-materializes every child agent named by the plan up front.
    pub fn spawn_children(&self, workflow_id: &str) -> Vec<AgentInstance> {
        self.factory.spawn_children(workflow_id)
    }

    pub async fn execute_workflow(&self, workflow_id: &str) -> Result<()> {
        if self.factory.workflow_agents(workflow_id).map(|a| a.is_empty()).unwrap_or(true) {
            self.factory.spawn_children(workflow_id);
        }
        self.scheduler.execute_workflow(workflow_id).await
    }

    pub async fn execute_agent(&self, workflow_id: &str, role: &str) -> Result<()> {
        self.scheduler.execute_agent(workflow_id, role).await
    }

    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<()> {
        self.scheduler.cancel_workflow(workflow_id).await;
        self.factory
            .update_workflow_state(workflow_id, crate::conductor::model::WorkflowState::Cancelled);
        Ok(())
    }

    pub async fn pause_workflow(&self, workflow_id: &str) -> Result<()> {
        self.scheduler.pause_workflow(workflow_id).await
    }

    pub async fn resume_workflow(&self, workflow_id: &str) -> Result<()> {
        self.scheduler.resume_workflow(workflow_id).await
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Option<Workflow> {
        self.factory.get_workflow(workflow_id)
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<AgentInstance> {
        self.factory.get_agent(agent_id)
    }

    /// Deadline-bounded teardown: stops accepting new events and drains the
    /// bus's queue per spec §4.3 before returning.
    pub async fn shutdown(&self) {
        self.event_bus.shutdown().await;
    }
}

const ALL_TRIGGERS: &[TriggerKind] = &[
    TriggerKind::WorkflowStarted,
    TriggerKind::WorkflowCompleted,
    TriggerKind::WorkflowFailed,
    TriggerKind::AgentStarted,
    TriggerKind::AgentCompleted,
    TriggerKind::AgentFailed,
    TriggerKind::QualityGatePassed,
    TriggerKind::QualityGateFailed,
    TriggerKind::MetricThreshold,
    TriggerKind::UserRegistered,
    TriggerKind::ErrorOccurred,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::llm::{LlmResponse, LlmRuntime};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct EchoLlm;

    #[async_trait]
    impl LlmRuntime for EchoLlm {
        async fn run(
            &self,
            _prompt: &str,
            _model: &str,
            _temperature: Option<f32>,
            _max_tokens: Option<u32>,
            _cancel: &CancellationToken,
        ) -> std::result::Result<LlmResponse, String> {
            Ok(LlmResponse {
                content: "ok".to_string(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn trivial_code_workflow_completes() {
        let config = Config {
            snapshot_path: std::env::temp_dir().join("conductor_engine_test_snapshot.json"),
            ..Config::default()
        };
        let engine = OrchestrationEngine::new(Arc::new(EchoLlm), config);
        engine.start().await;

        let workflow = engine
            .process_voice_command("write a function to add two numbers", None)
            .await
            .unwrap();
        engine.execute_workflow(&workflow.workflow_id).await.unwrap();

        let final_workflow = engine.get_workflow(&workflow.workflow_id).unwrap();
        assert_eq!(final_workflow.state, crate::conductor::model::WorkflowState::Completed);
    }

    #[tokio::test]
    async fn cyclic_plan_never_runs() {
        let config = Config {
            snapshot_path: std::env::temp_dir().join("conductor_engine_test_snapshot_cycle.json"),
            ..Config::default()
        };
        let engine = OrchestrationEngine::new(Arc::new(EchoLlm), config);
        engine.start().await;

        use crate::conductor::model::{AgentConfig, OrchestrationPlan};
        let plan = OrchestrationPlan {
            workflow_id: "wf_cycle".to_string(),
            parent_role: "orchestrator".to_string(),
            parent_prompt: "coordinate".to_string(),
            children: vec![
                AgentConfig {
                    role: "a".to_string(),
                    system_prompt: "x".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    tools: vec![],
                    depends_on: vec!["b".to_string()],
                    webhooks: vec![],
                    quality_gates: vec![],
                    metadata: Default::default(),
                },
                AgentConfig {
                    role: "b".to_string(),
                    system_prompt: "y".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    tools: vec![],
                    depends_on: vec!["a".to_string()],
                    webhooks: vec![],
                    quality_gates: vec![],
                    metadata: Default::default(),
                },
            ],
            webhooks: vec![],
            max_parallel: 5,
            timeout_seconds: 600,
            metadata: Default::default(),
        };
        engine.create_workflow(plan, Default::default());
        let err = engine.execute_workflow("wf_cycle").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_plan");
        let workflow = engine.get_workflow("wf_cycle").unwrap();
        assert_eq!(workflow.state, crate::conductor::model::WorkflowState::Failed);
    }
}
