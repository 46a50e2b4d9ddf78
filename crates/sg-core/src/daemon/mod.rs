//! Daemon runner: the sampler and response loops on two threads.
//!
//! - **Sampler thread**: provider → predictor → store, every `sample_interval`
//! - **Response thread**: store snapshot → escalation/actions, every
//!   `response_interval`
//! - **Shutdown**: a shared flag checked between ticks and while sleeping;
//!   an in-flight tick always completes
//!
//! Both loops share only the store and the counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sg_common::{Error, Result};
use sg_config::Settings;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};

use crate::action::ActionSink;
use crate::collect::SamplesProvider;
use crate::counters::{Counters, CountersSnapshot};
use crate::logging::{event_names, generate_run_id, Stage};
use crate::predict::Predictor;
use crate::ranking::QuerySurface;
use crate::response::{Clock, ResponseController, ResponsePolicy};
use crate::sampler::SamplerLoop;
use crate::store::SignatureStore;

/// Longest uninterrupted sleep, so shutdown is noticed promptly.
pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub sample_interval: Duration,
    pub response_interval: Duration,
    pub capacity: usize,
}

impl DaemonConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            sample_interval: Duration::from_millis(settings.sampler.interval_ms),
            response_interval: Duration::from_millis(settings.response.interval_ms),
            capacity: settings.sampler.capacity,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Written at shutdown when `--summary` is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub tracked_signatures: usize,
    pub counters: CountersSnapshot,
}

impl RunSummary {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signal handling
// ---------------------------------------------------------------------------

/// Set `flag` on SIGINT/SIGTERM. Can only be installed once per process.
pub fn install_signal_handler(flag: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| Error::Config(format!("cannot install signal handler: {e}")))
}

/// Sleep up to `duration` in [`SLEEP_SLICE`] steps; returns early on shutdown.
fn sleep_interruptible(shutdown: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct Daemon<P: SamplesProvider, S: ActionSink, C: Clock> {
    config: DaemonConfig,
    store: Arc<SignatureStore>,
    counters: Arc<Counters>,
    sampler: SamplerLoop<P>,
    controller: ResponseController<S>,
    clock: C,
    shutdown: Arc<AtomicBool>,
    run_id: String,
    dry_run: bool,
}

impl<P: SamplesProvider, S: ActionSink, C: Clock> Daemon<P, S, C> {
    pub fn new(settings: &Settings, provider: P, sink: S, clock: C) -> Self {
        let config = DaemonConfig::from_settings(settings);
        let store = Arc::new(SignatureStore::new(config.capacity));
        let counters = Arc::new(Counters::new());
        let sampler = SamplerLoop::new(
            provider,
            Arc::clone(&store),
            Predictor::from_settings(&settings.predictor),
            Arc::clone(&counters),
        );
        let controller = ResponseController::new(
            Arc::clone(&store),
            sink,
            ResponsePolicy::from_settings(&settings.response),
            Arc::clone(&counters),
        );
        Self {
            config,
            store,
            counters,
            sampler,
            controller,
            clock,
            shutdown: Arc::new(AtomicBool::new(false)),
            run_id: generate_run_id(),
            dry_run: false,
        }
    }

    /// Mark the run as dry (recorded in the summary only).
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Flag that stops both loops once set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    pub fn query(&self) -> QuerySurface {
        QuerySurface::new(Arc::clone(&self.store))
    }

    /// Run both loops until the shutdown flag is set.
    pub fn run(&mut self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let span = info_span!("run", run_id = %self.run_id);
        let _enter = span.enter();

        info!(
            event = event_names::RUN_STARTED,
            stage = %Stage::Init,
            sample_interval_ms = self.config.sample_interval.as_millis() as u64,
            response_interval_ms = self.config.response_interval.as_millis() as u64,
            capacity = self.config.capacity,
            sink = self.controller.sink().name(),
            dry_run = self.dry_run,
            "spikeguard started"
        );

        let Self {
            config,
            sampler,
            controller,
            clock,
            shutdown,
            ..
        } = self;
        let shutdown: &AtomicBool = shutdown;
        let clock: &C = clock;

        std::thread::scope(|scope| -> Result<()> {
            let sampler_span = span.clone();
            let sample_interval = config.sample_interval;
            let sampler_thread = std::thread::Builder::new()
                .name("sg-sampler".to_string())
                .spawn_scoped(scope, move || {
                    let _enter = sampler_span.enter();
                    while !shutdown.load(Ordering::SeqCst) {
                        let started = Instant::now();
                        // Failures are logged and counted inside the tick.
                        let _ = sampler.tick();
                        sleep_interruptible(shutdown, sample_interval.saturating_sub(started.elapsed()));
                    }
                });
            if let Err(e) = sampler_thread {
                shutdown.store(true, Ordering::SeqCst);
                return Err(Error::Io(e));
            }

            let response_span = span.clone();
            let response_interval = config.response_interval;
            let response_thread = std::thread::Builder::new()
                .name("sg-response".to_string())
                .spawn_scoped(scope, move || {
                    let _enter = response_span.enter();
                    while !shutdown.load(Ordering::SeqCst) {
                        let started = Instant::now();
                        controller.tick(clock.now_secs());
                        sleep_interruptible(shutdown, response_interval.saturating_sub(started.elapsed()));
                    }
                });
            if let Err(e) = response_thread {
                shutdown.store(true, Ordering::SeqCst);
                return Err(Error::Io(e));
            }
            Ok(())
        })?;

        info!(
            event = event_names::SHUTDOWN_REQUESTED,
            stage = %Stage::Shutdown,
            "both loops stopped"
        );

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            tracked_signatures: self.store.len(),
            counters: self.counters.snapshot(),
        };
        if summary.counters.action_failures > 0 {
            warn!(
                stage = %Stage::Shutdown,
                failures = summary.counters.action_failures,
                "some actions failed during the run"
            );
        }
        info!(
            event = event_names::RUN_FINISHED,
            stage = %Stage::Shutdown,
            sampler_ticks = summary.counters.sampler_ticks,
            response_ticks = summary.counters.response_ticks,
            restorations = summary.counters.restorations,
            "spikeguard finished"
        );
        Ok(summary)
    }
}
