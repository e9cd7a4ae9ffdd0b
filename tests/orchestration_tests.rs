use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor::conductor::llm::{LlmResponse, LlmRuntime, UnavailableLlm};
use conductor::conductor::model::{AgentConfig, OrchestrationPlan, QualityGate, QualityGateKind, WorkflowState};
use conductor::{Config, OrchestrationEngine};
use tokio_util::sync::CancellationToken;

fn test_config() -> Config {
    Config {
        snapshot_path: std::env::temp_dir().join(format!("conductor_it_{}.json", uuid_like())),
        ..Config::default()
    }
}

fn uuid_like() -> u64 {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    COUNTER.fetch_add(1, Ordering::SeqCst) as u64
}

#[tokio::test]
async fn trivial_code_intent_compiles_and_completes_via_rule_path() {
    let engine = OrchestrationEngine::new(Arc::new(UnavailableLlm), test_config());
    engine.start().await;

    let workflow = engine
        .process_voice_command("write a function to add two numbers", None)
        .await
        .expect("rule path must still produce a valid plan when the LLM is unavailable");
    assert_eq!(workflow.plan.children.len(), 2);

    engine.execute_workflow(&workflow.workflow_id).await.unwrap();

    let finished = engine.get_workflow(&workflow.workflow_id).unwrap();
    assert_eq!(finished.state, WorkflowState::Completed);
    let code_agent = finished.child_agents.get("code").unwrap();
    let test_agent = finished.child_agents.get("test").unwrap();
    assert_eq!(code_agent.state, conductor::conductor::model::AgentState::Completed);
    assert_eq!(test_agent.state, conductor::conductor::model::AgentState::Completed);
}

#[tokio::test]
async fn cyclic_plan_fails_without_running_any_agent() {
    let engine = OrchestrationEngine::new(Arc::new(UnavailableLlm), test_config());
    engine.start().await;

    let plan = OrchestrationPlan {
        workflow_id: "wf_cyclic".to_string(),
        parent_role: "orchestrator".to_string(),
        parent_prompt: "coordinate".to_string(),
        children: vec![
            agent_config("a", &["b"]),
            agent_config("b", &["a"]),
        ],
        webhooks: vec![],
        max_parallel: 5,
        timeout_seconds: 600,
        metadata: Default::default(),
    };
    engine.create_workflow(plan, Default::default());

    let err = engine.execute_workflow("wf_cyclic").await.unwrap_err();
    assert_eq!(err.kind(), "invalid_plan");

    let workflow = engine.get_workflow("wf_cyclic").unwrap();
    assert_eq!(workflow.state, WorkflowState::Failed);
    for agent in workflow.child_agents.values() {
        assert_eq!(agent.state, conductor::conductor::model::AgentState::Creating);
    }
}

/// Answers "maybe" on its first call and "yes" on every call after, so a
/// regex gate with `retry_on_fail=true` needs exactly one retry to pass.
struct FlakyThenGoodLlm {
    calls: AtomicU32,
}

#[async_trait]
impl LlmRuntime for FlakyThenGoodLlm {
    async fn run(
        &self,
        _prompt: &str,
        _model: &str,
        _temperature: Option<f32>,
        _max_tokens: Option<u32>,
        _cancel: &CancellationToken,
    ) -> Result<LlmResponse, String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let content = if n == 0 { "maybe" } else { "yes" };
        Ok(LlmResponse {
            content: content.to_string(),
            usage: None,
        })
    }
}

#[tokio::test]
async fn gate_retry_recovers_after_first_bad_answer() {
    let llm = Arc::new(FlakyThenGoodLlm { calls: AtomicU32::new(0) });
    let engine = OrchestrationEngine::new(llm.clone(), test_config());
    engine.start().await;

    let mut agent = agent_config("a", &[]);
    agent.quality_gates = vec![QualityGate {
        gate_id: "must_say_yes".to_string(),
        kind: QualityGateKind::Regex,
        config: serde_json::json!({"pattern": "^yes$"}),
        retry_on_fail: true,
        max_retries: 2,
        escalate_on_fail: false,
        escalation_target: None,
    }];
    let plan = OrchestrationPlan {
        workflow_id: "wf_retry".to_string(),
        parent_role: "orchestrator".to_string(),
        parent_prompt: "coordinate".to_string(),
        children: vec![agent],
        webhooks: vec![],
        max_parallel: 5,
        timeout_seconds: 600,
        metadata: Default::default(),
    };
    engine.create_workflow(plan, Default::default());

    engine.execute_workflow("wf_retry").await.unwrap();

    let workflow = engine.get_workflow("wf_retry").unwrap();
    assert_eq!(workflow.state, WorkflowState::Completed);
    let a = workflow.child_agents.get("a").unwrap();
    assert_eq!(a.output, Some(serde_json::json!("yes")));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
}

/// An LLM that never returns until cancelled, so a workflow spanning one
/// level of several of these agents can be cancelled mid-flight.
struct HangingLlm;

#[async_trait]
impl LlmRuntime for HangingLlm {
    async fn run(
        &self,
        _prompt: &str,
        _model: &str,
        _temperature: Option<f32>,
        _max_tokens: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, String> {
        cancel.cancelled().await;
        Err("cancelled".to_string())
    }
}

#[tokio::test]
async fn cancelling_a_workflow_mid_level_leaves_no_agent_running() {
    let engine = OrchestrationEngine::new(Arc::new(HangingLlm), test_config());
    engine.start().await;

    let plan = OrchestrationPlan {
        workflow_id: "wf_cancel".to_string(),
        parent_role: "orchestrator".to_string(),
        parent_prompt: "coordinate".to_string(),
        children: vec![
            agent_config("browser", &[]),
            agent_config("shell", &[]),
            agent_config("search", &[]),
        ],
        webhooks: vec![],
        max_parallel: 5,
        timeout_seconds: 600,
        metadata: Default::default(),
    };
    engine.create_workflow(plan, Default::default());

    let engine_for_task = engine.clone();
    let run = tokio::spawn(async move { engine_for_task.execute_workflow("wf_cancel").await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.cancel_workflow("wf_cancel").await.unwrap();

    let result = run.await.unwrap();
    assert!(result.is_err());

    let workflow = engine.get_workflow("wf_cancel").unwrap();
    assert_eq!(workflow.state, WorkflowState::Cancelled);
    for agent in workflow.child_agents.values() {
        assert_ne!(agent.state, conductor::conductor::model::AgentState::Running);
    }
}

fn agent_config(role: &str, depends_on: &[&str]) -> AgentConfig {
    AgentConfig {
        role: role.to_string(),
        system_prompt: format!("perform the {role} task"),
        model: "gpt-4o-mini".to_string(),
        tools: vec![],
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        webhooks: vec![],
        quality_gates: vec![],
        metadata: Default::default(),
    }
}
