//! Process-wide tunables for the control plane.
//!
//! Kept deliberately free of any config-file parsing dependency, matching
//! the rest of this codebase's philosophy: a plain struct with a sensible
//! [`Default`], constructed by the embedding application however it likes
//! (environment variables, a CLI flag parser, a hand-written TOML reader —
//! none of that is this crate's concern).
use std::path::PathBuf;
use std::time::Duration;

/// Tunables covering every number spec.md pins: channel capacities, retry
/// schedules, history caps, and default DAG bounds.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path the working-set store snapshots to.
    pub snapshot_path: PathBuf,
    /// Capacity of the event bus's bounded channel.
    pub event_bus_capacity: usize,
    /// How long the event bus worker drains in-flight events on shutdown
    /// before dropping the rest with a warning.
    pub event_bus_shutdown_deadline: Duration,
    /// Total timeout for a single webhook HTTP POST.
    pub webhook_timeout: Duration,
    /// Delay before each webhook retry attempt, in order.
    pub webhook_retry_delays: Vec<Duration>,
    /// Maximum delivery records retained per webhook manager (FIFO ring).
    pub webhook_history_capacity: usize,
    /// Default `max_parallel` when a plan doesn't specify one.
    pub default_max_parallel: u32,
    /// Default `timeout_seconds` when a plan doesn't specify one.
    pub default_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("working_set_snapshot.json"),
            event_bus_capacity: 1024,
            event_bus_shutdown_deadline: Duration::from_secs(5),
            webhook_timeout: Duration::from_secs(10),
            webhook_retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            webhook_history_capacity: 1000,
            default_max_parallel: 5,
            default_timeout_seconds: 600,
        }
    }
}
