//! Bounded concurrent signature store.
//!
//! One writer (the sampler loop) and many readers (query surface, response
//! controller). A whole sampler tick runs under a single write guard
//! ([`SignatureStore::begin_tick`]) so readers only ever observe complete
//! ticks. Readers receive owned copies.

use serde::{Deserialize, Serialize};
use sg_common::{Error, ProcessId, ProcessName, Result, SpikeFlags, SpikeKind};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::predict::{Channel, Prediction, PriorEmas};

/// Default maximum number of tracked processes.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Smoothed behaviour of one live process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSignature {
    pub pid: ProcessId,
    pub name: ProcessName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    pub cpu: Channel,
    pub mem: Channel,
    pub io: Channel,
    pub spike_flags: SpikeFlags,
    /// Sampler tick on which the signature was created.
    pub created_at: u64,
    /// Sampler tick of the last update.
    pub last_update_at: u64,
    pub samples_total: u64,
    pub cpu_spikes_predicted: u64,
    pub mem_spikes_predicted: u64,
    pub io_spikes_predicted: u64,
    /// Insertion order.
    pub seq: u64,
}

impl ProcessSignature {
    fn new(pid: ProcessId, name: ProcessName, start_time: Option<u64>, now: u64, seq: u64) -> Self {
        Self {
            pid,
            name,
            start_time,
            cpu: Channel::default(),
            mem: Channel::default(),
            io: Channel::default(),
            spike_flags: SpikeFlags::NONE,
            created_at: now,
            last_update_at: now,
            samples_total: 0,
            cpu_spikes_predicted: 0,
            mem_spikes_predicted: 0,
            io_spikes_predicted: 0,
            seq,
        }
    }

    pub fn channel(&self, kind: SpikeKind) -> &Channel {
        match kind {
            SpikeKind::Cpu => &self.cpu,
            SpikeKind::Mem => &self.mem,
            SpikeKind::Io => &self.io,
        }
    }

    pub fn spikes_predicted(&self, kind: SpikeKind) -> u64 {
        match kind {
            SpikeKind::Cpu => self.cpu_spikes_predicted,
            SpikeKind::Mem => self.mem_spikes_predicted,
            SpikeKind::Io => self.io_spikes_predicted,
        }
    }

    /// EMAs the next prediction starts from.
    pub fn prior(&self) -> PriorEmas {
        PriorEmas {
            cpu: self.cpu.ema,
            mem: self.mem.ema,
            io: self.io.ema,
        }
    }

    /// `|cpu_roc| + |mem_roc| + |io_roc|`, saturating.
    pub fn total_score(&self) -> i64 {
        self.cpu
            .roc
            .saturating_abs()
            .saturating_add(self.mem.roc.saturating_abs())
            .saturating_add(self.io.roc.saturating_abs())
    }

    fn apply(&mut self, prediction: &Prediction, now: u64) {
        self.cpu = prediction.cpu;
        self.mem = prediction.mem;
        self.io = prediction.io;
        self.spike_flags = prediction.flags;
        self.last_update_at = now;
        self.samples_total += 1;
        for kind in prediction.flags.iter() {
            match kind {
                SpikeKind::Cpu => self.cpu_spikes_predicted += 1,
                SpikeKind::Mem => self.mem_spikes_predicted += 1,
                SpikeKind::Io => self.io_spikes_predicted += 1,
            }
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<ProcessId, ProcessSignature>,
    next_seq: u64,
}

impl StoreInner {
    fn get_or_create(
        &mut self,
        capacity: usize,
        pid: ProcessId,
        name: &ProcessName,
        start_time: Option<u64>,
        now: u64,
    ) -> Result<(&ProcessSignature, bool)> {
        if !self.entries.contains_key(&pid) && self.entries.len() >= capacity {
            return Err(Error::CapacityExceeded { capacity });
        }

        let mut created = false;
        let next_seq = &mut self.next_seq;
        let entry = self.entries.entry(pid).or_insert_with(|| {
            created = true;
            let seq = *next_seq;
            *next_seq += 1;
            ProcessSignature::new(pid, name.clone(), start_time, now, seq)
        });
        if !created {
            if entry.start_time.is_none() {
                entry.start_time = start_time;
            }
            if entry.name != *name {
                entry.name = name.clone();
            }
        }
        Ok((&*entry, created))
    }

    fn update(&mut self, pid: ProcessId, prediction: &Prediction, now: u64) -> bool {
        match self.entries.get_mut(&pid) {
            Some(sig) => {
                sig.apply(prediction, now);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> Vec<ProcessSignature> {
        let mut out: Vec<ProcessSignature> = self.entries.values().cloned().collect();
        out.sort_by_key(|s| s.seq);
        out
    }
}

/// Bounded map from pid to [`ProcessSignature`].
#[derive(Debug)]
pub struct SignatureStore {
    inner: RwLock<StoreInner>,
    capacity: usize,
}

impl Default for SignatureStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SignatureStore {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            capacity: capacity.max(1),
        }
    }

    // A panic while holding the lock leaves the map itself consistent (every
    // mutation is a single insert/remove/assignment), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        self.read().entries.contains_key(&pid)
    }

    pub fn get(&self, pid: ProcessId) -> Option<ProcessSignature> {
        self.read().entries.get(&pid).cloned()
    }

    /// Return the existing signature or insert a zeroed one.
    ///
    /// Fails with [`Error::CapacityExceeded`] when the pid is new and the
    /// store is full. Existing entries are never evicted to make room.
    pub fn get_or_create(
        &self,
        pid: ProcessId,
        name: &ProcessName,
        now: u64,
    ) -> Result<ProcessSignature> {
        let mut inner = self.write();
        let (sig, _) = inner.get_or_create(self.capacity, pid, name, None, now)?;
        Ok(sig.clone())
    }

    /// Store a prediction. Returns `false` when the pid is not tracked.
    pub fn update(&self, pid: ProcessId, prediction: &Prediction, now: u64) -> bool {
        self.write().update(pid, prediction, now)
    }

    /// Idempotent; returns whether an entry was removed.
    pub fn remove(&self, pid: ProcessId) -> bool {
        self.write().entries.remove(&pid).is_some()
    }

    /// Point-in-time copy ordered by insertion sequence.
    pub fn snapshot(&self) -> Vec<ProcessSignature> {
        self.read().snapshot()
    }

    /// Pids with a signature right now.
    pub fn pids(&self) -> HashSet<ProcessId> {
        self.read().entries.keys().copied().collect()
    }

    /// Take the writer role for a whole sampler tick.
    pub fn begin_tick(&self) -> StoreTick<'_> {
        StoreTick {
            inner: self.write(),
            capacity: self.capacity,
        }
    }
}

/// Exclusive write access to the store for the duration of one tick.
///
/// Dropping the guard publishes every change made through it at once.
pub struct StoreTick<'a> {
    inner: RwLockWriteGuard<'a, StoreInner>,
    capacity: usize,
}

impl StoreTick<'_> {
    /// Like [`SignatureStore::get_or_create`]; the flag reports creation.
    pub fn get_or_create(
        &mut self,
        pid: ProcessId,
        name: &ProcessName,
        start_time: Option<u64>,
        now: u64,
    ) -> Result<(&ProcessSignature, bool)> {
        self.inner
            .get_or_create(self.capacity, pid, name, start_time, now)
    }

    pub fn get(&self, pid: ProcessId) -> Option<&ProcessSignature> {
        self.inner.entries.get(&pid)
    }

    pub fn update(&mut self, pid: ProcessId, prediction: &Prediction, now: u64) -> bool {
        self.inner.update(pid, prediction, now)
    }

    pub fn remove(&mut self, pid: ProcessId) -> bool {
        self.inner.entries.remove(&pid).is_some()
    }

    /// Remove every entry whose pid is not in `live`; returns removed pids.
    pub fn retain_only(&mut self, live: &HashSet<ProcessId>) -> Vec<ProcessId> {
        let mut removed: Vec<ProcessId> = self
            .inner
            .entries
            .keys()
            .filter(|pid| !live.contains(pid))
            .copied()
            .collect();
        removed.sort();
        for pid in &removed {
            self.inner.entries.remove(pid);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::Predictor;
    use sg_common::RawSample;

    fn name(s: &str) -> ProcessName {
        ProcessName::new(s)
    }

    #[test]
    fn create_then_get_existing() {
        let store = SignatureStore::new(4);
        let sig = store.get_or_create(ProcessId(10), &name("a"), 1).unwrap();
        assert_eq!(sig.samples_total, 0);
        assert_eq!(sig.cpu.ema, 0);
        let again = store.get_or_create(ProcessId(10), &name("a"), 2).unwrap();
        assert_eq!(again.seq, sig.seq);
        assert_eq!(again.created_at, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn capacity_exceeded_without_eviction() {
        let store = SignatureStore::new(2);
        store.get_or_create(ProcessId(1), &name("a"), 0).unwrap();
        store.get_or_create(ProcessId(2), &name("b"), 0).unwrap();
        let err = store.get_or_create(ProcessId(3), &name("c"), 0).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { capacity: 2 }));
        assert!(store.contains(ProcessId(1)));
        assert!(store.contains(ProcessId(2)));
        // Existing pids still resolve when full.
        assert!(store.get_or_create(ProcessId(2), &name("b"), 1).is_ok());
    }

    #[test]
    fn update_absent_pid_is_noop() {
        let store = SignatureStore::new(2);
        let p = Predictor::default().predict(PriorEmas::default(), &RawSample::new(5, "x", 1, 1, 1));
        assert!(!store.update(ProcessId(5), &p, 1));
        assert!(store.is_empty());
    }

    #[test]
    fn update_bumps_counters() {
        let store = SignatureStore::new(2);
        store.get_or_create(ProcessId(5), &name("x"), 0).unwrap();
        let p = Predictor::default()
            .predict(PriorEmas::default(), &RawSample::new(5, "x", 8000, 0, 0));
        assert!(store.update(ProcessId(5), &p, 3));
        let sig = store.get(ProcessId(5)).unwrap();
        assert_eq!(sig.cpu.ema, 2400);
        assert_eq!(sig.samples_total, 1);
        assert_eq!(sig.cpu_spikes_predicted, 1);
        assert_eq!(sig.mem_spikes_predicted, 0);
        assert_eq!(sig.last_update_at, 3);
        assert!(sig.spike_flags.contains(SpikeKind::Cpu));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = SignatureStore::new(2);
        store.get_or_create(ProcessId(1), &name("a"), 0).unwrap();
        assert!(store.remove(ProcessId(1)));
        assert!(!store.remove(ProcessId(1)));
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let store = SignatureStore::new(8);
        for pid in [40, 7, 300, 1] {
            store.get_or_create(ProcessId(pid), &name("p"), 0).unwrap();
        }
        let pids: Vec<u32> = store.snapshot().iter().map(|s| s.pid.0).collect();
        assert_eq!(pids, vec![40, 7, 300, 1]);
    }

    #[test]
    fn tick_guard_retain_only() {
        let store = SignatureStore::new(8);
        {
            let mut tick = store.begin_tick();
            for pid in 1..=4 {
                let (_, created) = tick
                    .get_or_create(ProcessId(pid), &name("p"), None, 0)
                    .unwrap();
                assert!(created);
            }
            let live: HashSet<ProcessId> = [ProcessId(2), ProcessId(4)].into_iter().collect();
            assert_eq!(tick.retain_only(&live), vec![ProcessId(1), ProcessId(3)]);
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn start_time_filled_when_unknown() {
        let store = SignatureStore::new(2);
        let mut tick = store.begin_tick();
        tick.get_or_create(ProcessId(1), &name("a"), None, 0).unwrap();
        let (sig, created) = tick
            .get_or_create(ProcessId(1), &name("a"), Some(77), 1)
            .unwrap();
        assert!(!created);
        assert_eq!(sig.start_time, Some(77));
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let store = std::sync::Arc::new(SignatureStore::new(2));
        store.get_or_create(ProcessId(1), &name("a"), 0).unwrap();
        let cloned = store.clone();
        let _ = std::thread::spawn(move || {
            let _tick = cloned.begin_tick();
            panic!("writer died mid-tick");
        })
        .join();
        assert_eq!(store.len(), 1);
        assert!(store.get_or_create(ProcessId(2), &name("b"), 1).is_ok());
    }

    #[test]
    fn total_score_sums_absolute_rocs() {
        let store = SignatureStore::new(2);
        store.get_or_create(ProcessId(1), &name("a"), 0).unwrap();
        let mut p = Predictor::default()
            .predict(PriorEmas::default(), &RawSample::new(1, "a", 0, 0, 0));
        p.cpu.roc = -300;
        p.mem.roc = 200;
        p.io.roc = 10;
        store.update(ProcessId(1), &p, 1);
        assert_eq!(store.get(ProcessId(1)).unwrap().total_score(), 510);
    }
}
