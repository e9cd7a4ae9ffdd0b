// src/lib.rs

//! Voice-driven multi-agent orchestration control plane.
//!
//! A natural-language utterance is compiled into a DAG of LLM-backed agents
//! ([`conductor::plan_compiler`]), scheduled level-by-level with per-level
//! parallelism ([`conductor::scheduler`]), validated through pluggable quality
//! gates ([`conductor::quality_gate`]), and fanned out over an in-process
//! event bus ([`conductor::event_bus`]) to webhook subscribers
//! ([`conductor::webhook`]). Shared state between agents lives in a typed
//! working-set store ([`conductor::store`]).
//!
//! [`conductor::engine::OrchestrationEngine`] wires all of the above into the
//! single façade most callers should use.

pub mod conductor;

pub use conductor::config::Config;
pub use conductor::engine::OrchestrationEngine;
pub use conductor::error::OrchestrationError;
pub use conductor::llm::LlmRuntime;
