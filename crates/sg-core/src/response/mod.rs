//! Response controller: escalation, cooldown, restoration and reporting.
//!
//! Each response tick reads a store snapshot and, for every flagged process
//! that is not protected, per flagged category:
//! 1. Bumps its consecutive-spike run and recomputes the escalation level
//! 2. Advises or applies that category's directive (cooldown-gated)
//!
//! Then it restores processes that have been quiet long enough and, on its
//! own interval, reports processes that keep spiking.
//!
//! Time is passed in explicitly as whole seconds from a [`Clock`].

pub mod escalation;
pub mod tracked;

pub use escalation::{Directive, EscalationLevel, ResponsePolicy, IO_RESTORE_LEVEL};
pub use tracked::TrackedProcess;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sg_common::{ProcessId, ProcessName, SpikeFlags, SpikeKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::action::{ActionError, ActionSink, IoClass};
use crate::counters::Counters;
use crate::logging::{event_names, Stage};
use crate::store::{ProcessSignature, SignatureStore};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic seconds used for cooldowns and quiet windows.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Seconds elapsed since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_secs(&self) -> u64 {
        self.origin.elapsed().as_secs()
    }
}

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ActionOutcome {
    /// Logged and counted only.
    Advised,
    /// The sink accepted the directive (or the directive needs no sink call).
    Applied,
    /// Withheld because the category acted too recently.
    CooldownSkipped,
    Failed { reason: String },
}

/// One per-category decision for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub pid: ProcessId,
    pub kind: SpikeKind,
    pub level: EscalationLevel,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub pid: ProcessId,
    pub from: EscalationLevel,
    pub to: EscalationLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationRecord {
    pub pid: ProcessId,
    /// `None` on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RestorationRecord {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentSpike {
    pub pid: ProcessId,
    pub name: ProcessName,
    pub consecutive_spike_samples: u32,
    pub escalation_level: EscalationLevel,
    pub spike_type_mask: SpikeFlags,
    pub action_count: u64,
}

/// Processes that keep spiking, emitted on the persistent-report interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentSpikeReport {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<PersistentSpike>,
}

/// Everything one response tick decided.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTickOutcome {
    pub now: u64,
    /// Signatures flagged in the snapshot.
    pub flagged: usize,
    pub tracked: usize,
    /// Entries forgotten because the pid exited or now names another process.
    pub dropped: Vec<ProcessId>,
    /// Flagged processes left alone because their name is protected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected: Vec<ProcessId>,
    pub escalations: Vec<EscalationRecord>,
    pub actions: Vec<ActionRecord>,
    pub restorations: Vec<RestorationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PersistentSpikeReport>,
}

impl ResponseTickOutcome {
    pub fn applied(&self) -> impl Iterator<Item = &ActionRecord> {
        self.actions
            .iter()
            .filter(|a| a.outcome == ActionOutcome::Applied)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct ResponseController<S: ActionSink> {
    store: Arc<SignatureStore>,
    sink: S,
    policy: ResponsePolicy,
    counters: Arc<Counters>,
    tracked: HashMap<ProcessId, TrackedProcess>,
    last_report_at: Option<u64>,
}

impl<S: ActionSink> ResponseController<S> {
    pub fn new(
        store: Arc<SignatureStore>,
        sink: S,
        policy: ResponsePolicy,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            store,
            sink,
            policy,
            counters,
            tracked: HashMap::new(),
            last_report_at: None,
        }
    }

    pub fn policy(&self) -> &ResponsePolicy {
        &self.policy
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn tracked(&self, pid: ProcessId) -> Option<&TrackedProcess> {
        self.tracked.get(&pid)
    }

    /// All tracked processes, ordered by pid.
    pub fn tracked_processes(&self) -> Vec<TrackedProcess> {
        let mut out: Vec<TrackedProcess> = self.tracked.values().cloned().collect();
        out.sort_by_key(|t| t.pid);
        out
    }

    /// Run one response tick at `now` (seconds).
    pub fn tick(&mut self, now: u64) -> ResponseTickOutcome {
        Counters::incr(&self.counters.response_ticks);
        let snapshot = self.store.snapshot();
        let mut outcome = ResponseTickOutcome {
            now,
            ..ResponseTickOutcome::default()
        };

        // A reused pid has a fresh signature with a new `seq`; its entry
        // describes the previous process and must not carry over.
        let live: HashMap<ProcessId, u64> = snapshot.iter().map(|s| (s.pid, s.seq)).collect();
        let mut dropped: Vec<ProcessId> = self
            .tracked
            .values()
            .filter(|t| live.get(&t.pid) != Some(&t.seq))
            .map(|t| t.pid)
            .collect();
        dropped.sort();
        for pid in &dropped {
            self.tracked.remove(pid);
        }
        outcome.dropped = dropped;

        for sig in snapshot.iter().filter(|s| !s.spike_flags.is_empty()) {
            outcome.flagged += 1;
            if self.policy.is_protected(&sig.name) {
                Counters::incr(&self.counters.protected_skips);
                debug!(
                    event = event_names::RESPONSE_PROTECTED,
                    stage = %Stage::Respond,
                    pid = sig.pid.0,
                    name = %sig.name,
                    kinds = %sig.spike_flags,
                    "protected process spiking, no response"
                );
                outcome.protected.push(sig.pid);
                continue;
            }
            self.respond(sig, now, &mut outcome);
        }

        self.restore_quiet(now, &mut outcome);
        outcome.report = self.persistent_report(now);
        outcome.tracked = self.tracked.len();

        debug!(
            event = event_names::RESPONSE_TICK,
            stage = %Stage::Respond,
            now,
            flagged = outcome.flagged,
            tracked = outcome.tracked,
            actions = outcome.actions.len(),
            restorations = outcome.restorations.len(),
            "response tick"
        );
        outcome
    }

    fn original_priority(&self, pid: ProcessId) -> i32 {
        match self.sink.current_cpu_priority(pid) {
            Ok(Some(priority)) => priority,
            Ok(None) => 0,
            Err(e) => {
                debug!(pid = pid.0, error = %e, "cannot read priority, assuming 0");
                0
            }
        }
    }

    fn respond(&mut self, sig: &ProcessSignature, now: u64, outcome: &mut ResponseTickOutcome) {
        if !self.tracked.contains_key(&sig.pid) {
            let original = self.original_priority(sig.pid);
            self.tracked.insert(
                sig.pid,
                TrackedProcess::new(sig.pid, sig.name.clone(), sig.seq, original, now),
            );
        }

        let Self {
            tracked,
            sink,
            policy,
            counters,
            ..
        } = self;
        let Some(entry) = tracked.get_mut(&sig.pid) else {
            return;
        };
        entry.name = sig.name.clone();

        for kind in sig.spike_flags.iter() {
            let (before, level) = entry.record_spike(kind, now);
            if level > before && level > EscalationLevel::Advisory {
                Counters::incr(&counters.escalations);
                info!(
                    event = event_names::RESPONSE_ESCALATED,
                    stage = %Stage::Respond,
                    pid = sig.pid.0,
                    name = %sig.name,
                    kind = %kind,
                    from = %before,
                    to = %level,
                    consecutive = entry.consecutive_spike_samples,
                    "escalated"
                );
                outcome.escalations.push(EscalationRecord {
                    pid: sig.pid,
                    from: before,
                    to: level,
                });
            }

            let result = apply_category(sink, policy, counters, entry, kind, level, now);
            outcome.actions.push(ActionRecord {
                pid: sig.pid,
                kind,
                level,
                outcome: result,
            });
        }
    }

    fn restore_quiet(&mut self, now: u64, outcome: &mut ResponseTickOutcome) {
        let window = self.policy.quiet_window_secs;
        let mut due: Vec<ProcessId> = self
            .tracked
            .values()
            .filter(|t| t.escalation_level != EscalationLevel::None && t.is_quiet(now, window))
            .map(|t| t.pid)
            .collect();
        due.sort();

        for pid in due {
            let Some(entry) = self.tracked.get_mut(&pid) else {
                continue;
            };
            let failure = restore_one(&self.sink, entry).err();
            match &failure {
                None => {
                    entry.reset();
                    Counters::incr(&self.counters.restorations);
                    info!(
                        event = event_names::RESPONSE_RESTORED,
                        stage = %Stage::Restore,
                        pid = pid.0,
                        name = %entry.name,
                        priority = entry.original_priority,
                        "restored"
                    );
                }
                Some(e) => {
                    Counters::incr(&self.counters.action_failures);
                    warn!(
                        event = event_names::RESPONSE_ACTION_FAILED,
                        stage = %Stage::Restore,
                        pid = pid.0,
                        error = %e,
                        "restoration failed, will retry"
                    );
                }
            }
            outcome.restorations.push(RestorationRecord {
                pid,
                failure: failure.map(|e| e.to_string()),
            });
        }
    }

    fn persistent_report(&mut self, now: u64) -> Option<PersistentSpikeReport> {
        if let Some(last) = self.last_report_at {
            if now.saturating_sub(last) < self.policy.persistent_interval_secs {
                return None;
            }
        }
        self.last_report_at = Some(now);

        let mut entries: Vec<PersistentSpike> = self
            .tracked
            .values()
            .filter(|t| {
                t.consecutive_spike_samples >= self.policy.persistent_min_samples
                    && now.saturating_sub(t.last_seen_spiking_at)
                        < self.policy.persistent_freshness_secs
            })
            .map(|t| PersistentSpike {
                pid: t.pid,
                name: t.name.clone(),
                consecutive_spike_samples: t.consecutive_spike_samples,
                escalation_level: t.escalation_level,
                spike_type_mask: t.spike_type_mask,
                action_count: t.action_count,
            })
            .collect();
        entries.sort_by_key(|e| e.pid);

        Counters::add(&self.counters.persistent_spikes, entries.len() as u64);
        for entry in &entries {
            warn!(
                event = event_names::RESPONSE_PERSISTENT,
                stage = %Stage::Report,
                pid = entry.pid.0,
                name = %entry.name,
                consecutive = entry.consecutive_spike_samples,
                level = %entry.escalation_level,
                kinds = %entry.spike_type_mask,
                actions = entry.action_count,
                "persistent spike"
            );
        }

        Some(PersistentSpikeReport {
            generated_at: Utc::now(),
            entries,
        })
    }
}

/// Advise or apply the directive for one flagged category.
fn apply_category<S: ActionSink>(
    sink: &S,
    policy: &ResponsePolicy,
    counters: &Counters,
    entry: &mut TrackedProcess,
    kind: SpikeKind,
    level: EscalationLevel,
    now: u64,
) -> ActionOutcome {
    let pid = entry.pid;
    let directive = match policy.directive(kind, level, entry.original_priority) {
        Some(d) => d,
        None => return ActionOutcome::Advised,
    };

    if directive == Directive::Advise {
        counters.advisory(kind);
        debug!(
            event = event_names::RESPONSE_ADVISORY,
            stage = %Stage::Respond,
            pid = pid.0,
            kind = %kind,
            level = %level,
            "spike advisory"
        );
        return ActionOutcome::Advised;
    }

    if !policy.cooldown_elapsed(kind, entry.last_action(kind), now) {
        Counters::incr(&counters.cooldown_skips);
        let err = sg_common::Error::ActionCooldown { pid, kind };
        debug!(
            event = event_names::RESPONSE_COOLDOWN,
            stage = %Stage::Respond,
            code = err.code(),
            "{}",
            err
        );
        return ActionOutcome::CooldownSkipped;
    }

    let result: Result<(), ActionError> = match directive {
        Directive::CpuPriority(target) => sink
            .set_cpu_priority(pid, target)
            .map(|_| entry.current_priority = target),
        Directive::IoPriority { class, level: io_level } => sink
            .set_io_priority(pid, class, io_level)
            .map(|_| entry.io_adjusted = true),
        Directive::Memory { advise: true } => sink
            .advise_memory_pressure(pid, level)
            .map(|_| entry.oom_adjusted = true),
        Directive::Memory { advise: false } | Directive::Advise => Ok(()),
    };

    // A timed-out call may still land; make sure restoration undoes it.
    if result == Err(ActionError::Timeout) {
        match directive {
            Directive::CpuPriority(_) => entry.cpu_unsettled = true,
            Directive::IoPriority { .. } => entry.io_adjusted = true,
            Directive::Memory { advise: true } => entry.oom_adjusted = true,
            Directive::Memory { advise: false } | Directive::Advise => {}
        }
    }

    match result {
        Ok(()) => {
            entry.mark_action(kind, now);
            counters.action_applied(kind);
            info!(
                event = event_names::RESPONSE_ACTION,
                stage = %Stage::Respond,
                pid = pid.0,
                name = %entry.name,
                kind = %kind,
                level = %level,
                directive = ?directive,
                "action applied"
            );
            ActionOutcome::Applied
        }
        Err(e) => {
            Counters::incr(&counters.action_failures);
            let err = sg_common::Error::ActionFailed {
                pid,
                reason: e.to_string(),
            };
            warn!(
                event = event_names::RESPONSE_ACTION_FAILED,
                stage = %Stage::Respond,
                kind = %kind,
                level = %level,
                code = err.code(),
                "{}",
                err
            );
            ActionOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Undo priority, I/O and OOM-preference changes for one process.
///
/// Each part that succeeds is recorded even if a later one fails, so the
/// retry on the next tick only repeats what is still pending.
fn restore_one<S: ActionSink>(sink: &S, entry: &mut TrackedProcess) -> Result<(), ActionError> {
    if entry.priority_changed() {
        sink.set_cpu_priority(entry.pid, entry.original_priority)?;
        entry.current_priority = entry.original_priority;
        entry.cpu_unsettled = false;
    }
    if entry.io_adjusted {
        sink.set_io_priority(entry.pid, IoClass::BestEffort, IO_RESTORE_LEVEL)?;
        entry.io_adjusted = false;
    }
    if entry.oom_adjusted {
        sink.clear_memory_pressure(entry.pid)?;
        entry.oom_adjusted = false;
    }
    Ok(())
}
