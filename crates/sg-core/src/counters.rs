//! Lock-free operational counters shared by both loops.

use serde::{Deserialize, Serialize};
use sg_common::SpikeKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals since startup. All fields only ever increase.
#[derive(Debug, Default)]
pub struct Counters {
    pub sampler_ticks: AtomicU64,
    pub samples: AtomicU64,
    pub signatures_created: AtomicU64,
    pub signatures_evicted: AtomicU64,
    pub pid_reuses: AtomicU64,
    pub capacity_exceeded: AtomicU64,
    pub provider_failures: AtomicU64,
    pub provider_timeouts: AtomicU64,
    pub response_ticks: AtomicU64,
    pub cpu_advisories: AtomicU64,
    pub mem_advisories: AtomicU64,
    pub io_advisories: AtomicU64,
    pub cpu_boosts: AtomicU64,
    pub io_boosts: AtomicU64,
    pub mem_actions: AtomicU64,
    pub restorations: AtomicU64,
    pub escalations: AtomicU64,
    pub persistent_spikes: AtomicU64,
    pub cooldown_skips: AtomicU64,
    pub protected_skips: AtomicU64,
    pub action_failures: AtomicU64,
}

/// Serializable point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub sampler_ticks: u64,
    pub samples: u64,
    pub signatures_created: u64,
    pub signatures_evicted: u64,
    pub pid_reuses: u64,
    pub capacity_exceeded: u64,
    pub provider_failures: u64,
    pub provider_timeouts: u64,
    pub response_ticks: u64,
    pub cpu_advisories: u64,
    pub mem_advisories: u64,
    pub io_advisories: u64,
    pub cpu_boosts: u64,
    pub io_boosts: u64,
    pub mem_actions: u64,
    pub restorations: u64,
    pub escalations: u64,
    pub persistent_spikes: u64,
    pub cooldown_skips: u64,
    pub protected_skips: u64,
    pub action_failures: u64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        bump(counter, 1);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        bump(counter, n);
    }

    pub fn advisory(&self, kind: SpikeKind) {
        match kind {
            SpikeKind::Cpu => bump(&self.cpu_advisories, 1),
            SpikeKind::Mem => bump(&self.mem_advisories, 1),
            SpikeKind::Io => bump(&self.io_advisories, 1),
        }
    }

    /// Count one applied action for a category.
    pub fn action_applied(&self, kind: SpikeKind) {
        match kind {
            SpikeKind::Cpu => bump(&self.cpu_boosts, 1),
            SpikeKind::Mem => bump(&self.mem_actions, 1),
            SpikeKind::Io => bump(&self.io_boosts, 1),
        }
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            sampler_ticks: load(&self.sampler_ticks),
            samples: load(&self.samples),
            signatures_created: load(&self.signatures_created),
            signatures_evicted: load(&self.signatures_evicted),
            pid_reuses: load(&self.pid_reuses),
            capacity_exceeded: load(&self.capacity_exceeded),
            provider_failures: load(&self.provider_failures),
            provider_timeouts: load(&self.provider_timeouts),
            response_ticks: load(&self.response_ticks),
            cpu_advisories: load(&self.cpu_advisories),
            mem_advisories: load(&self.mem_advisories),
            io_advisories: load(&self.io_advisories),
            cpu_boosts: load(&self.cpu_boosts),
            io_boosts: load(&self.io_boosts),
            mem_actions: load(&self.mem_actions),
            restorations: load(&self.restorations),
            escalations: load(&self.escalations),
            persistent_spikes: load(&self.persistent_spikes),
            cooldown_skips: load(&self.cooldown_skips),
            protected_skips: load(&self.protected_skips),
            action_failures: load(&self.action_failures),
        }
    }
}

impl CountersSnapshot {
    pub fn advisories(&self, kind: SpikeKind) -> u64 {
        match kind {
            SpikeKind::Cpu => self.cpu_advisories,
            SpikeKind::Mem => self.mem_advisories,
            SpikeKind::Io => self.io_advisories,
        }
    }
}
