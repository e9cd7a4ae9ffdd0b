//! Shared data model: threads, items, attachments, workflows, agents, plans,
//! gates, and webhook subscriptions.
//!
//! Field shapes follow `schemas.py` in the voice-automation-platform source
//! tree (`AgentConfig`, `AgentInstance`, `OrchestrationConfig`,
//! `WorkflowContext`, `QualityGate`, `WebhookConfig`) and the richer
//! `EnhancedMemoryStore` model in the voice-automation-hub source tree
//! (`Thread`, `Item`, `Attachment`), translated into owned Rust structs with
//! `serde` derives instead of `pydantic` models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type Id = String;

/// Free-form scalar used in metadata maps: JSON values restricted to the
/// kinds metadata entries are ever populated with in practice.
pub type MetadataValue = serde_json::Value;
pub type Metadata = HashMap<String, MetadataValue>;

// ---------------------------------------------------------------------
// Thread / Item / Attachment
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: Id,
    pub status: ThreadStatus,
    pub metadata: Metadata,
    pub messages: Vec<Message>,
    pub item_ids: Vec<Id>,
    pub attachment_ids: Vec<Id>,
    /// Scratch map agents read from and write to during execution.
    pub context: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(id: Id) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: ThreadStatus::Active,
            metadata: Metadata::new(),
            messages: Vec::new(),
            item_ids: Vec::new(),
            attachment_ids: Vec::new(),
            context: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: serde_json::Value,
    pub tags: HashSet<String>,
    /// Symmetric: `a.relations.contains(b)` iff `b.relations.contains(a)`.
    pub relations: HashSet<Id>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn new(id: Id, kind: String, content: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            content,
            tags: HashSet::new(),
            relations: HashSet::new(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Id,
    pub file_path: String,
    pub mime_type: String,
    /// Bytes, recorded once at creation.
    pub size: u64,
    /// Lowercase hex SHA-256 of the file contents at creation time.
    pub checksum: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Plans, agent configs, gates, webhooks
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGateKind {
    JsonSchema,
    Regex,
    LlmJudge,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGate {
    pub gate_id: Id,
    pub kind: QualityGateKind,
    pub config: serde_json::Value,
    #[serde(default = "default_true")]
    pub retry_on_fail: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub escalate_on_fail: bool,
    #[serde(default)]
    pub escalation_target: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[serde(rename = "workflow.started")]
    WorkflowStarted,
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted,
    #[serde(rename = "workflow.failed")]
    WorkflowFailed,
    #[serde(rename = "agent.started")]
    AgentStarted,
    #[serde(rename = "agent.completed")]
    AgentCompleted,
    #[serde(rename = "agent.failed")]
    AgentFailed,
    #[serde(rename = "quality_gate.passed")]
    QualityGatePassed,
    #[serde(rename = "quality_gate.failed")]
    QualityGateFailed,
    #[serde(rename = "metric.threshold")]
    MetricThreshold,
    #[serde(rename = "user.registered")]
    UserRegistered,
    #[serde(rename = "error.occurred")]
    ErrorOccurred,
}

impl TriggerKind {
    /// The exact wire string used in outgoing webhook bodies and event logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::WorkflowStarted => "workflow.started",
            TriggerKind::WorkflowCompleted => "workflow.completed",
            TriggerKind::WorkflowFailed => "workflow.failed",
            TriggerKind::AgentStarted => "agent.started",
            TriggerKind::AgentCompleted => "agent.completed",
            TriggerKind::AgentFailed => "agent.failed",
            TriggerKind::QualityGatePassed => "quality_gate.passed",
            TriggerKind::QualityGateFailed => "quality_gate.failed",
            TriggerKind::MetricThreshold => "metric.threshold",
            TriggerKind::UserRegistered => "user.registered",
            TriggerKind::ErrorOccurred => "error.occurred",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub role: String,
    pub system_prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub webhooks: Vec<Id>,
    #[serde(default)]
    pub quality_gates: Vec<QualityGate>,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    pub workflow_id: Id,
    pub parent_role: String,
    pub parent_prompt: String,
    pub children: Vec<AgentConfig>,
    #[serde(default)]
    pub webhooks: Vec<Id>,
    pub max_parallel: u32,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: Id,
    pub url: String,
    pub events: Vec<TriggerKind>,
    pub secret: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Runtime state: AgentInstance / Workflow
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Creating,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Completed | AgentState::Failed | AgentState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Creating,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    pub id: Id,
    pub role: String,
    pub config: AgentConfig,
    pub state: AgentState,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentInstance {
    pub fn new(id: Id, config: AgentConfig) -> Self {
        Self {
            id,
            role: config.role.clone(),
            config,
            state: AgentState::Creating,
            output: None,
            error: None,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: Id,
    pub plan: OrchestrationPlan,
    pub state: WorkflowState,
    pub parent_agent: Option<AgentInstance>,
    pub child_agents: HashMap<String, AgentInstance>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(plan: OrchestrationPlan, metadata: Metadata) -> Self {
        Self {
            workflow_id: plan.workflow_id.clone(),
            plan,
            state: WorkflowState::Creating,
            parent_agent: None,
            child_agents: HashMap::new(),
            metadata,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------
// Plan compiler output
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceCommandIntent {
    pub original_command: String,
    pub intent: String,
    pub orchestration: OrchestrationPlan,
    pub confidence: f64,
    #[serde(default)]
    pub alternative_intents: Vec<String>,
}

// ---------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Id,
    pub trigger: TriggerKind,
    pub workflow_id: Id,
    pub agent_id: Option<Id>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateResult {
    pub gate_id: Id,
    pub passed: bool,
    pub agent_id: Id,
    pub output: serde_json::Value,
    pub error: Option<String>,
    pub retry_attempted: bool,
    pub timestamp: DateTime<Utc>,
}
