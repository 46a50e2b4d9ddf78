//! Per-process response state.

use serde::{Deserialize, Serialize};
use sg_common::{ProcessId, ProcessName, SpikeFlags, SpikeKind};

use super::escalation::EscalationLevel;

/// A process the controller has seen spiking.
///
/// Created on first spike, reset (not removed) on restoration, dropped when
/// the process disappears from the store or its pid is reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedProcess {
    pub pid: ProcessId,
    pub name: ProcessName,
    /// Store `seq` of the signature this entry belongs to.
    pub seq: u64,
    /// Nice value before the controller touched the process.
    pub original_priority: i32,
    pub current_priority: i32,
    /// Categories seen spiking since the last restoration.
    pub spike_type_mask: SpikeFlags,
    /// Flagged categories summed over consecutive flagged response ticks.
    pub consecutive_spike_samples: u32,
    pub escalation_level: EscalationLevel,
    /// Most recent applied action in any category.
    pub last_action_at: Option<u64>,
    /// Most recent applied action per category (indexed by `SpikeKind::index`).
    pub category_last_action_at: [Option<u64>; 3],
    pub io_adjusted: bool,
    /// A CPU directive timed out and may still have landed.
    pub cpu_unsettled: bool,
    /// The OOM preference was raised at CRITICAL.
    pub oom_adjusted: bool,
    pub last_seen_spiking_at: u64,
    pub action_count: u64,
}

impl TrackedProcess {
    pub fn new(
        pid: ProcessId,
        name: ProcessName,
        seq: u64,
        original_priority: i32,
        now: u64,
    ) -> Self {
        Self {
            pid,
            name,
            seq,
            original_priority,
            current_priority: original_priority,
            spike_type_mask: SpikeFlags::NONE,
            consecutive_spike_samples: 0,
            escalation_level: EscalationLevel::None,
            last_action_at: None,
            category_last_action_at: [None; 3],
            io_adjusted: false,
            cpu_unsettled: false,
            oom_adjusted: false,
            last_seen_spiking_at: now,
            action_count: 0,
        }
    }

    /// Account one flagged category; returns the level before and after.
    ///
    /// Called once per flagged category, so a process spiking on several
    /// resources at once escalates faster.
    pub fn record_spike(&mut self, kind: SpikeKind, now: u64) -> (EscalationLevel, EscalationLevel) {
        let before = self.escalation_level;
        self.spike_type_mask = self.spike_type_mask.with(kind);
        self.consecutive_spike_samples = self.consecutive_spike_samples.saturating_add(1);
        self.escalation_level = EscalationLevel::for_consecutive(self.consecutive_spike_samples);
        self.last_seen_spiking_at = now;
        (before, self.escalation_level)
    }

    pub fn last_action(&self, kind: SpikeKind) -> Option<u64> {
        self.category_last_action_at[kind.index()]
    }

    pub fn mark_action(&mut self, kind: SpikeKind, now: u64) {
        self.category_last_action_at[kind.index()] = Some(now);
        self.last_action_at = Some(now);
        self.action_count += 1;
    }

    /// Whether restoration has to reassert the original nice value.
    pub fn priority_changed(&self) -> bool {
        self.cpu_unsettled || self.current_priority != self.original_priority
    }

    /// Whether restoration has anything to undo through the sink.
    pub fn needs_restore(&self) -> bool {
        self.priority_changed() || self.io_adjusted || self.oom_adjusted
    }

    /// Whether the process has been quiet for longer than `window` seconds.
    pub fn is_quiet(&self, now: u64, window: u64) -> bool {
        now.saturating_sub(self.last_seen_spiking_at) > window
    }

    /// Back to the untouched state after a successful restoration.
    ///
    /// Action history (times, count) is kept so cooldowns still hold if the
    /// process spikes again right away.
    pub fn reset(&mut self) {
        self.current_priority = self.original_priority;
        self.io_adjusted = false;
        self.cpu_unsettled = false;
        self.oom_adjusted = false;
        self.consecutive_spike_samples = 0;
        self.escalation_level = EscalationLevel::None;
        self.spike_type_mask = SpikeFlags::NONE;
    }
}
