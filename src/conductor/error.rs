//! The error taxonomy shared by every component.
//!
//! Modeled on the hand-rolled `Display`/`Error` pattern the orchestration
//! layer of the teacher codebase uses for its own error enum, rather than
//! pulling in a derive-macro crate: each kind below is a user-visible
//! "reason", not an internal implementation detail, so the `Display` text is
//! part of the contract callers depend on.

use std::fmt;

/// One of the ten error kinds a caller of the control plane can observe.
///
/// Every variant corresponds to a named kind in the error taxonomy; an
/// unexpected condition that doesn't fit any of them is reported as
/// [`OrchestrationError::Internal`] with a recovery hint, never a panic.
#[derive(Debug, Clone)]
pub enum OrchestrationError {
    /// Plan compilation failed: unparseable LLM reply, invalid DAG, unknown tool.
    CompileError(String),
    /// Cyclic or malformed DAG detected at scheduler entry.
    InvalidPlan(String),
    /// An agent task failed to produce any output.
    AgentError(String),
    /// A quality gate rejected output after all retries were exhausted.
    GateFailed(String),
    /// A gate failure escalated and the escalation target also failed.
    EscalationFailed(String),
    /// Explicit cancellation or timeout.
    Cancelled(String),
    /// The event bus's bounded channel was full at publish time.
    BusOverflow(String),
    /// A webhook delivery exhausted its retries.
    DeliveryFailed(String),
    /// Store snapshot I/O or attachment file read failed.
    IoError(String),
    /// An input constraint was violated at an API boundary.
    ValidationError(String),
    /// Anything else, surfaced with a recovery recommendation.
    Internal { detail: String, recovery: String },
}

impl OrchestrationError {
    /// The stable machine-readable kind string, matching the taxonomy in the
    /// design document by name (`"compile_error"`, `"invalid_plan"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::CompileError(_) => "compile_error",
            OrchestrationError::InvalidPlan(_) => "invalid_plan",
            OrchestrationError::AgentError(_) => "agent_error",
            OrchestrationError::GateFailed(_) => "gate_failed",
            OrchestrationError::EscalationFailed(_) => "escalation_failed",
            OrchestrationError::Cancelled(_) => "cancelled",
            OrchestrationError::BusOverflow(_) => "bus_overflow",
            OrchestrationError::DeliveryFailed(_) => "delivery_failed",
            OrchestrationError::IoError(_) => "io_error",
            OrchestrationError::ValidationError(_) => "validation_error",
            OrchestrationError::Internal { .. } => "internal_error",
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        OrchestrationError::Internal {
            detail: detail.into(),
            recovery: "retry".to_string(),
        }
    }
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationError::CompileError(msg) => write!(f, "compile_error: {msg}"),
            OrchestrationError::InvalidPlan(msg) => write!(f, "invalid_plan: {msg}"),
            OrchestrationError::AgentError(msg) => write!(f, "agent_error: {msg}"),
            OrchestrationError::GateFailed(msg) => write!(f, "gate_failed: {msg}"),
            OrchestrationError::EscalationFailed(msg) => write!(f, "escalation_failed: {msg}"),
            OrchestrationError::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            OrchestrationError::BusOverflow(msg) => write!(f, "bus_overflow: {msg}"),
            OrchestrationError::DeliveryFailed(msg) => write!(f, "delivery_failed: {msg}"),
            OrchestrationError::IoError(msg) => write!(f, "io_error: {msg}"),
            OrchestrationError::ValidationError(msg) => write!(f, "validation_error: {msg}"),
            OrchestrationError::Internal { detail, recovery } => {
                write!(f, "internal_error: {detail} (recommend: {recovery})")
            }
        }
    }
}

impl std::error::Error for OrchestrationError {}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
