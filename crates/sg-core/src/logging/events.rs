//! Stable event names and pipeline stages for structured logs.
//!
//! Every log record emitted by the loops carries an `event` field taken
//! from [`event_names`] and a `stage` field, so JSON output can be
//! filtered without matching on message text.

use serde::{Deserialize, Serialize};

/// Processing stages in the spikeguard pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Sampler loop: provider call and store update.
    Sample,
    /// Response controller: escalation and actions.
    Respond,
    /// Restoration of quiet processes.
    Restore,
    /// Persistent-spike reporting.
    Report,
    /// Shutdown and summary.
    Shutdown,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Sample => "sample",
            Stage::Respond => "respond",
            Stage::Restore => "restore",
            Stage::Report => "report",
            Stage::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const SHUTDOWN_REQUESTED: &str = "run.shutdown_requested";

    // Sampler
    pub const SAMPLER_TICK: &str = "sampler.tick";
    pub const SAMPLER_PROVIDER_FAILED: &str = "sampler.provider_failed";
    pub const SAMPLER_CAPACITY_EXCEEDED: &str = "sampler.capacity_exceeded";
    pub const SAMPLER_PID_REUSED: &str = "sampler.pid_reused";

    // Response
    pub const RESPONSE_TICK: &str = "response.tick";
    pub const RESPONSE_ADVISORY: &str = "response.advisory";
    pub const RESPONSE_ESCALATED: &str = "response.escalated";
    pub const RESPONSE_ACTION: &str = "response.action";
    pub const RESPONSE_COOLDOWN: &str = "response.cooldown";
    pub const RESPONSE_PROTECTED: &str = "response.protected";
    pub const RESPONSE_ACTION_FAILED: &str = "response.action_failed";
    pub const RESPONSE_RESTORED: &str = "response.restored";
    pub const RESPONSE_PERSISTENT: &str = "response.persistent_spike";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";
}
