//! Read-only query surface over the signature store.

use serde::{Deserialize, Serialize};
use sg_common::{Error, ProcessId, SpikeKind};
use std::str::FromStr;
use std::sync::Arc;

use crate::store::{ProcessSignature, SignatureStore};

/// Ordering key for [`top_n`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Sum of absolute rates of change.
    #[default]
    TotalScore,
    CpuRoc,
    MemRoc,
    IoRoc,
}

impl Metric {
    pub fn key(self, sig: &ProcessSignature) -> i64 {
        match self {
            Metric::TotalScore => sig.total_score(),
            Metric::CpuRoc => sig.cpu.roc,
            Metric::MemRoc => sig.mem.roc,
            Metric::IoRoc => sig.io.roc,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Metric::TotalScore => "total_score",
            Metric::CpuRoc => "cpu_roc",
            Metric::MemRoc => "mem_roc",
            Metric::IoRoc => "io_roc",
        };
        f.write_str(s)
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "total_score" | "total" | "score" => Ok(Metric::TotalScore),
            "cpu_roc" | "cpu" => Ok(Metric::CpuRoc),
            "mem_roc" | "mem" => Ok(Metric::MemRoc),
            "io_roc" | "io" => Ok(Metric::IoRoc),
            other => Err(Error::Config(format!("unknown metric: {other}"))),
        }
    }
}

/// The `n` highest signatures by `metric`, descending.
///
/// `n` is clamped to `1..=capacity`. Ties keep snapshot (insertion) order.
pub fn top_n(store: &SignatureStore, n: usize, metric: Metric) -> Vec<ProcessSignature> {
    let n = n.clamp(1, store.capacity());
    let mut all = store.snapshot();
    all.sort_by(|a, b| metric.key(b).cmp(&metric.key(a)));
    all.truncate(n);
    all
}

/// A signature with at least one category flagged on its last update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSpike {
    pub signature: ProcessSignature,
    pub cpu: bool,
    pub mem: bool,
    pub io: bool,
}

pub fn active_spikes(store: &SignatureStore) -> Vec<ActiveSpike> {
    store
        .snapshot()
        .into_iter()
        .filter(|s| !s.spike_flags.is_empty())
        .map(|signature| ActiveSpike {
            cpu: signature.spike_flags.contains(SpikeKind::Cpu),
            mem: signature.spike_flags.contains(SpikeKind::Mem),
            io: signature.spike_flags.contains(SpikeKind::Io),
            signature,
        })
        .collect()
}

/// Cloneable handle for readers that do not own the store.
#[derive(Debug, Clone)]
pub struct QuerySurface {
    store: Arc<SignatureStore>,
}

impl QuerySurface {
    pub fn new(store: Arc<SignatureStore>) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> Vec<ProcessSignature> {
        self.store.snapshot()
    }

    pub fn get(&self, pid: ProcessId) -> Result<ProcessSignature, Error> {
        self.store.get(pid).ok_or(Error::StaleLookup { pid })
    }

    pub fn top_n(&self, n: usize, metric: Metric) -> Vec<ProcessSignature> {
        top_n(&self.store, n, metric)
    }

    pub fn active_spikes(&self) -> Vec<ActiveSpike> {
        active_spikes(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::{Predictor, PriorEmas};
    use sg_common::{ProcessName, RawSample};

    /// Store whose cpu roc per pid equals `cpu` (alpha 100, from zero).
    fn store_with_cpu(readings: &[(u32, i64)]) -> SignatureStore {
        let store = SignatureStore::new(16);
        let predictor = Predictor::new(100, Default::default());
        for &(pid, cpu) in readings {
            store
                .get_or_create(ProcessId(pid), &ProcessName::new("p"), 0)
                .unwrap();
            let p = predictor.predict(PriorEmas::default(), &RawSample::new(pid, "p", cpu, 0, 0));
            store.update(ProcessId(pid), &p, 0);
        }
        store
    }

    #[test]
    fn top_three_by_score() {
        let store = store_with_cpu(&[(1, 10), (2, 9000), (3, 50), (4, 200)]);
        let top: Vec<i64> = top_n(&store, 3, Metric::TotalScore)
            .iter()
            .map(|s| s.total_score())
            .collect();
        assert_eq!(top, vec![9000, 200, 50]);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let store = store_with_cpu(&[(9, 100), (3, 100), (5, 100)]);
        let pids: Vec<u32> = top_n(&store, 3, Metric::CpuRoc)
            .iter()
            .map(|s| s.pid.0)
            .collect();
        assert_eq!(pids, vec![9, 3, 5]);
    }

    #[test]
    fn n_is_clamped() {
        let store = store_with_cpu(&[(1, 10), (2, 20)]);
        assert_eq!(top_n(&store, 0, Metric::TotalScore).len(), 1);
        assert_eq!(top_n(&store, 1000, Metric::TotalScore).len(), 2);
    }

    #[test]
    fn active_spikes_only_flagged() {
        let store = store_with_cpu(&[(1, 10), (2, 9000)]);
        let active = QuerySurface::new(Arc::new(store)).active_spikes();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].signature.pid, ProcessId(2));
        assert!(active[0].cpu);
        assert!(!active[0].mem);
    }

    #[test]
    fn missing_pid_is_stale() {
        let surface = QuerySurface::new(Arc::new(store_with_cpu(&[(1, 10)])));
        assert!(surface.get(ProcessId(1)).is_ok());
        assert!(matches!(
            surface.get(ProcessId(2)),
            Err(Error::StaleLookup { pid: ProcessId(2) })
        ));
    }

    #[test]
    fn metric_names() {
        assert_eq!("cpu-roc".parse::<Metric>().unwrap(), Metric::CpuRoc);
        assert_eq!(Metric::TotalScore.to_string(), "total_score");
        assert!("latency".parse::<Metric>().is_err());
    }
}
