//! Sampler loop: provider snapshot in, signatures updated.
//!
//! One tick:
//! 1. Collect a snapshot from the provider (outside any lock)
//! 2. Under one store write guard, create/predict/update per sample
//! 3. Evict signatures whose pid was absent from the snapshot
//!
//! A failed collection leaves the store exactly as it was.

use serde::{Deserialize, Serialize};
use sg_common::{Error, ProcessId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collect::{ProviderError, SamplesProvider};
use crate::counters::Counters;
use crate::logging::{event_names, Stage};
use crate::predict::Predictor;
use crate::store::SignatureStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerPhase {
    Idle,
    Sampling,
}

/// What one sampler tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerTickOutcome {
    pub tick: u64,
    /// Samples applied to a signature.
    pub sampled: usize,
    pub created: usize,
    pub evicted: Vec<ProcessId>,
    /// Samples dropped because the store was full.
    pub dropped: usize,
    /// Repeated pids within one snapshot (first reading wins).
    pub duplicates: usize,
    pub reused: usize,
    pub spikes_flagged: usize,
}

pub struct SamplerLoop<P: SamplesProvider> {
    provider: P,
    store: Arc<SignatureStore>,
    predictor: Predictor,
    counters: Arc<Counters>,
    phase: SamplerPhase,
    ticks: u64,
}

impl<P: SamplesProvider> SamplerLoop<P> {
    pub fn new(
        provider: P,
        store: Arc<SignatureStore>,
        predictor: Predictor,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            provider,
            store,
            predictor,
            counters,
            phase: SamplerPhase::Idle,
            ticks: 0,
        }
    }

    pub fn phase(&self) -> SamplerPhase {
        self.phase
    }

    /// Completed ticks, including failed collections.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn tick(&mut self) -> Result<SamplerTickOutcome, Error> {
        self.ticks += 1;
        Counters::incr(&self.counters.sampler_ticks);
        let tick = self.ticks;

        self.phase = SamplerPhase::Sampling;
        let collected = self.provider.collect();
        self.phase = SamplerPhase::Idle;

        let samples = match collected {
            Ok(samples) => samples,
            Err(e) => {
                match &e {
                    ProviderError::Timeout { .. } => {
                        Counters::incr(&self.counters.provider_timeouts)
                    }
                    _ => Counters::incr(&self.counters.provider_failures),
                }
                let err = Error::from(e);
                warn!(
                    event = event_names::SAMPLER_PROVIDER_FAILED,
                    stage = %Stage::Sample,
                    provider = self.provider.name(),
                    tick,
                    code = err.code(),
                    "{}",
                    err
                );
                return Err(err);
            }
        };

        let mut outcome = SamplerTickOutcome {
            tick,
            ..SamplerTickOutcome::default()
        };
        let mut seen: HashSet<ProcessId> = HashSet::with_capacity(samples.len());

        let mut guard = self.store.begin_tick();
        for sample in &samples {
            if !seen.insert(sample.pid) {
                outcome.duplicates += 1;
                continue;
            }

            let reused = match (sample.start_time, guard.get(sample.pid)) {
                (Some(new_start), Some(existing)) => {
                    existing.start_time.is_some_and(|old| old != new_start)
                }
                _ => false,
            };
            if reused {
                guard.remove(sample.pid);
                outcome.reused += 1;
                Counters::incr(&self.counters.pid_reuses);
                debug!(
                    event = event_names::SAMPLER_PID_REUSED,
                    stage = %Stage::Sample,
                    pid = sample.pid.0,
                    name = %sample.name,
                    "pid reused, signature reset"
                );
            }

            let prior = match guard.get_or_create(sample.pid, &sample.name, sample.start_time, tick) {
                Ok((sig, created)) => {
                    if created {
                        outcome.created += 1;
                    }
                    sig.prior()
                }
                Err(err) => {
                    outcome.dropped += 1;
                    Counters::incr(&self.counters.capacity_exceeded);
                    debug!(
                        event = event_names::SAMPLER_CAPACITY_EXCEEDED,
                        stage = %Stage::Sample,
                        pid = sample.pid.0,
                        code = err.code(),
                        "{}",
                        err
                    );
                    continue;
                }
            };

            let prediction = self.predictor.predict(prior, sample);
            if !prediction.flags.is_empty() {
                outcome.spikes_flagged += 1;
            }
            guard.update(sample.pid, &prediction, tick);
            outcome.sampled += 1;
        }

        outcome.evicted = guard.retain_only(&seen);
        let tracked = guard.len();
        drop(guard);

        Counters::add(&self.counters.samples, outcome.sampled as u64);
        Counters::add(&self.counters.signatures_created, outcome.created as u64);
        Counters::add(&self.counters.signatures_evicted, outcome.evicted.len() as u64);

        if outcome.dropped > 0 {
            info!(
                event = event_names::SAMPLER_CAPACITY_EXCEEDED,
                stage = %Stage::Sample,
                tick,
                dropped = outcome.dropped,
                capacity = self.store.capacity(),
                "store full, new processes not tracked"
            );
        }
        debug!(
            event = event_names::SAMPLER_TICK,
            stage = %Stage::Sample,
            tick,
            sampled = outcome.sampled,
            created = outcome.created,
            evicted = outcome.evicted.len(),
            flagged = outcome.spikes_flagged,
            tracked,
            "sampler tick"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedProvider;
    use sg_common::{RawSample, SpikeKind};

    fn sampler(provider: ScriptedProvider, capacity: usize) -> SamplerLoop<ScriptedProvider> {
        SamplerLoop::new(
            provider,
            Arc::new(SignatureStore::new(capacity)),
            Predictor::default(),
            Arc::new(Counters::new()),
        )
    }

    #[test]
    fn creates_predicts_and_evicts() {
        let provider = ScriptedProvider::new()
            .then_ok(vec![
                RawSample::new(1, "a", 8000, 0, 0),
                RawSample::new(2, "b", 100, 0, 0),
            ])
            .then_ok(vec![RawSample::new(2, "b", 100, 0, 0)]);
        let mut s = sampler(provider, 8);

        let first = s.tick().unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(first.spikes_flagged, 1);
        let sig = s.store.get(ProcessId(1)).unwrap();
        assert_eq!(sig.cpu.ema, 2400);
        assert!(sig.spike_flags.contains(SpikeKind::Cpu));

        let second = s.tick().unwrap();
        assert_eq!(second.evicted, vec![ProcessId(1)]);
        assert!(!s.store.contains(ProcessId(1)));
        assert_eq!(s.store.get(ProcessId(2)).unwrap().samples_total, 2);
        assert_eq!(s.phase(), SamplerPhase::Idle);
    }

    #[test]
    fn provider_failure_leaves_store_untouched() {
        let provider = ScriptedProvider::new()
            .then_ok(vec![RawSample::new(1, "a", 500, 0, 0)])
            .then_err(ProviderError::Failed("boom".to_string()))
            .then_err(ProviderError::Timeout { millis: 250 });
        let mut s = sampler(provider, 8);
        s.tick().unwrap();
        let before = s.store.snapshot();

        assert!(matches!(s.tick(), Err(Error::Provider(_))));
        assert!(matches!(s.tick(), Err(Error::ProviderTimeout { millis: 250 })));
        assert_eq!(s.store.snapshot(), before);
        let c = s.counters.snapshot();
        assert_eq!(c.provider_failures, 1);
        assert_eq!(c.provider_timeouts, 1);
        assert_eq!(c.sampler_ticks, 3);
    }

    #[test]
    fn duplicate_pid_keeps_first_reading() {
        let provider = ScriptedProvider::new().then_ok(vec![
            RawSample::new(3, "a", 1000, 0, 0),
            RawSample::new(3, "a", 9000, 0, 0),
        ]);
        let mut s = sampler(provider, 8);
        let out = s.tick().unwrap();
        assert_eq!(out.duplicates, 1);
        assert_eq!(s.store.get(ProcessId(3)).unwrap().cpu.ema, 300);
    }

    #[test]
    fn reused_pid_starts_fresh() {
        let provider = ScriptedProvider::new()
            .then_ok(vec![RawSample::new(4, "old", 8000, 0, 0).with_start_time(10)])
            .then_ok(vec![RawSample::new(4, "new", 0, 0, 0).with_start_time(20)]);
        let mut s = sampler(provider, 8);
        s.tick().unwrap();
        let out = s.tick().unwrap();
        assert_eq!(out.reused, 1);
        assert_eq!(out.created, 1);
        let sig = s.store.get(ProcessId(4)).unwrap();
        assert_eq!(sig.name.as_str(), "new");
        assert_eq!(sig.cpu.ema, 0);
        assert_eq!(sig.samples_total, 1);
        assert_eq!(sig.start_time, Some(20));
    }

    #[test]
    fn full_store_drops_new_pids() {
        let provider = ScriptedProvider::new().then_ok(vec![
            RawSample::new(1, "a", 0, 0, 0),
            RawSample::new(2, "b", 0, 0, 0),
            RawSample::new(3, "c", 0, 0, 0),
        ]);
        let mut s = sampler(provider, 2);
        let out = s.tick().unwrap();
        assert_eq!(out.sampled, 2);
        assert_eq!(out.dropped, 1);
        assert_eq!(s.counters.snapshot().capacity_exceeded, 1);
        assert!(!s.store.contains(ProcessId(3)));
    }
}
