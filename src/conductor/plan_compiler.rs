//! Plan compiler (C1).
//!
//! Grounded on `voice_parser.py`'s `VoiceCommandParser`: the system prompt
//! enumerating available tools and the required JSON shape, the keyword-stem
//! rule-path fallback (`_classify_intent`-equivalent), and
//! `calculate_execution_order`'s reuse as a validation step at compile time
//! (the same Kahn's-algorithm leveling the scheduler runs again at execution
//! entry — compiling a plan and scheduling it are two different call sites
//! that both need "is this DAG acyclic", so [`crate::conductor::scheduler::topological_levels`]
//! is shared between them rather than duplicated).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::conductor::error::{OrchestrationError, Result};
use crate::conductor::llm::LlmRuntime;
use crate::conductor::model::{AgentConfig, Metadata, OrchestrationPlan, QualityGate, VoiceCommandIntent};
use crate::conductor::scheduler::topological_levels;

/// The tool names a compiled plan's agents may reference.
pub const AVAILABLE_TOOLS: &[&str] = &[
    "filesystem",
    "browser",
    "terminal",
    "search",
    "database",
    "github",
    "slack",
    "test_runner",
    "git",
    "research",
];

const MAX_TOOLS_PER_AGENT: usize = 32;
const MIN_PARALLEL: u32 = 1;
const MAX_PARALLEL: u32 = 20;
const MIN_TIMEOUT: u64 = 60;
const MAX_TIMEOUT: u64 = 3600;
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

pub struct PlanCompiler {
    llm: Arc<dyn LlmRuntime>,
}

impl PlanCompiler {
    pub fn new(llm: Arc<dyn LlmRuntime>) -> Self {
        Self { llm }
    }

    /// Compiles an utterance into a validated plan: the LLM path is tried
    /// first, falling back to the rule path on any failure or on
    /// low-confidence output.
    pub async fn compile(&self, utterance: &str, context: Option<&Metadata>) -> Result<VoiceCommandIntent> {
        let intent = match self.compile_llm_path(utterance).await {
            Ok(intent) if intent.confidence >= LOW_CONFIDENCE_THRESHOLD => intent,
            _ => self.compile_rule_path(utterance, context)?,
        };
        validate_plan(&intent.orchestration)?;
        Ok(intent)
    }

    async fn compile_llm_path(&self, utterance: &str) -> Result<VoiceCommandIntent> {
        let system_prompt = system_prompt_text();
        let prompt = format!("{system_prompt}\n\nCommand: {utterance}");
        let cancel = CancellationToken::new();
        let response = self
            .llm
            .run_json_mode(&prompt, "gpt-4o-mini", &cancel)
            .await
            .map_err(OrchestrationError::CompileError)?;
        let cleaned = strip_json_wrapper(&response.content);
        serde_json::from_str::<VoiceCommandIntent>(cleaned)
            .map_err(|e| OrchestrationError::CompileError(format!("unparseable LLM reply: {e}")))
    }

    fn compile_rule_path(&self, utterance: &str, context: Option<&Metadata>) -> Result<VoiceCommandIntent> {
        let lower = utterance.to_lowercase();
        let mut matched: Vec<&str> = Vec::new();
        for (stems, intent) in KEYWORD_TABLE {
            if stems.iter().any(|stem| lower.contains(stem)) {
                matched.push(intent);
            }
        }
        let intent = matched.first().copied().unwrap_or("unknown");
        let alternatives = matched.iter().skip(1).map(|s| s.to_string()).collect();

        let workflow_id = format!("wf_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let children = template_for(intent);
        let metadata = context.cloned().unwrap_or_default();

        let orchestration = OrchestrationPlan {
            workflow_id,
            parent_role: "orchestrator".to_string(),
            parent_prompt: format!("Coordinate the '{intent}' workflow for: {utterance}"),
            children,
            webhooks: vec![],
            max_parallel: 5,
            timeout_seconds: 600,
            metadata,
        };

        Ok(VoiceCommandIntent {
            original_command: utterance.to_string(),
            intent: intent.to_string(),
            orchestration,
            confidence: 0.5,
            alternative_intents: alternatives,
        })
    }
}

fn system_prompt_text() -> String {
    format!(
        "You are a voice command parser for a multi-agent orchestration system. \
        Available MCP tools: {}. \
        Respond with a JSON object matching: {{\"original_command\": str, \"intent\": str, \
        \"confidence\": float, \"alternative_intents\": [str], \"orchestration\": {{\"workflow_id\": str, \
        \"parent_role\": str, \"parent_prompt\": str, \"children\": [{{\"role\": str, \"system_prompt\": str, \
        \"model\": str, \"tools\": [str], \"depends_on\": [str]}}], \"max_parallel\": int, \"timeout_seconds\": int}}}}.",
        AVAILABLE_TOOLS.join(", ")
    )
}

/// Accepts both bare JSON and JSON wrapped in triple-backtick fences, plus
/// an optional sentinel-token pair; strips the outermost such wrapper only.
fn strip_json_wrapper(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest.trim();
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest.trim();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim();
    }
    if s.starts_with("<<<") && s.ends_with(">>>") {
        s = &s[3..s.len() - 3];
        s = s.trim();
    }
    s
}

type KeywordIntent = (&'static [&'static str], &'static str);

const KEYWORD_TABLE: &[KeywordIntent] = &[
    (&["deploy", "release", "publish", "launch"], "deploy"),
    (&["write", "create", "generate", "code", "implement", "build"], "code"),
    (&["research", "find", "search", "investigate"], "research"),
    (&["test", "verify", "validate"], "test"),
    (&["analyze", "examine", "review", "inspect"], "analyze"),
    (&["automate", "schedule", "run"], "automate"),
];

fn agent(role: &str, prompt: &str, depends_on: &[&str]) -> AgentConfig {
    AgentConfig {
        role: role.to_string(),
        system_prompt: prompt.to_string(),
        model: "gpt-4o-mini".to_string(),
        tools: vec![],
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        webhooks: vec![],
        quality_gates: vec![],
        metadata: Metadata::new(),
    }
}

fn template_for(intent: &str) -> Vec<AgentConfig> {
    match intent {
        "code" => vec![
            agent("code", "Write the requested code.", &[]),
            agent("test", "Test the code produced by the code agent.", &["code"]),
        ],
        "research" => vec![agent("research", "Research the requested topic.", &[])],
        "test" => vec![agent("test", "Test the requested subject.", &[])],
        "deploy" => vec![
            agent("test", "Run pre-deploy tests.", &[]),
            agent("shell", "Execute the deployment.", &["test"]),
            agent("test2", "Run post-deploy smoke tests.", &["shell"]),
        ],
        "analyze" => vec![
            agent("research", "Gather material to analyze.", &[]),
            agent("analysis", "Analyze the gathered material.", &["research"]),
        ],
        "automate" => vec![
            agent("browser", "Perform the requested browser automation.", &[]),
            agent("shell", "Perform the requested shell automation.", &[]),
        ],
        _ => vec![agent("generic", "Handle the request as best as possible.", &[])],
    }
}

/// Fail-closed validation: a DAG, resolvable dependencies, and every
/// numeric bound named in the design document.
pub fn validate_plan(plan: &OrchestrationPlan) -> Result<()> {
    topological_levels(&plan.children)?;

    if !(MIN_PARALLEL..=MAX_PARALLEL).contains(&plan.max_parallel) {
        return Err(OrchestrationError::ValidationError(format!(
            "max_parallel must be in [{MIN_PARALLEL}, {MAX_PARALLEL}], got {}",
            plan.max_parallel
        )));
    }
    if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&plan.timeout_seconds) {
        return Err(OrchestrationError::ValidationError(format!(
            "timeout_seconds must be in [{MIN_TIMEOUT}, {MAX_TIMEOUT}], got {}",
            plan.timeout_seconds
        )));
    }
    for child in &plan.children {
        if child.tools.len() > MAX_TOOLS_PER_AGENT {
            return Err(OrchestrationError::ValidationError(format!(
                "agent '{}' has more than {MAX_TOOLS_PER_AGENT} tools",
                child.role
            )));
        }
        for tool in &child.tools {
            if !AVAILABLE_TOOLS.contains(&tool.as_str()) {
                return Err(OrchestrationError::ValidationError(format!(
                    "agent '{}' references unknown tool '{tool}'",
                    child.role
                )));
            }
        }
        for gate in &child.quality_gates {
            validate_gate_config(gate)?;
        }
    }
    Ok(())
}

fn validate_gate_config(gate: &QualityGate) -> Result<()> {
    use crate::conductor::model::QualityGateKind::*;
    let ok = match gate.kind {
        JsonSchema => gate.config.get("schema").is_some(),
        Regex => gate.config.get("pattern").and_then(|v| v.as_str()).is_some(),
        LlmJudge => gate.config.get("criteria").and_then(|v| v.as_str()).is_some(),
        Custom => gate.config.get("function").and_then(|v| v.as_str()).is_some(),
    };
    if ok {
        Ok(())
    } else {
        Err(OrchestrationError::ValidationError(format!(
            "gate '{}' config does not match its kind",
            gate.gate_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::llm::UnavailableLlm;

    #[tokio::test]
    async fn rule_path_trivial_code_intent() {
        let compiler = PlanCompiler::new(Arc::new(UnavailableLlm));
        let intent = compiler
            .compile("write a function to add two numbers", None)
            .await
            .unwrap();
        assert_eq!(intent.intent, "code");
        let roles: Vec<&str> = intent
            .orchestration
            .children
            .iter()
            .map(|c| c.role.as_str())
            .collect();
        assert_eq!(roles, vec!["code", "test"]);
        assert_eq!(intent.orchestration.children[1].depends_on, vec!["code"]);
    }

    #[test]
    fn strips_fenced_json() {
        let raw = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_json_wrapper(raw), "{\"a\":1}");
    }

    #[test]
    fn rejects_out_of_range_max_parallel() {
        let mut plan = sample_plan();
        plan.max_parallel = 99;
        let err = validate_plan(&plan).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    fn sample_plan() -> OrchestrationPlan {
        OrchestrationPlan {
            workflow_id: "wf_1".to_string(),
            parent_role: "orchestrator".to_string(),
            parent_prompt: "coordinate".to_string(),
            children: vec![agent("code", "write code", &[])],
            webhooks: vec![],
            max_parallel: 5,
            timeout_seconds: 600,
            metadata: Metadata::new(),
        }
    }
}
