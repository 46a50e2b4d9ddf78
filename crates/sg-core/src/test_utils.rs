//! Test doubles for the provider, sink and clock seams.
//!
//! Compiled for unit tests and, behind the `test-utils` feature, for the
//! integration tests under `tests/`.

use sg_common::{ProcessId, RawSample};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::action::{ActionError, ActionSink, IoClass};
use crate::collect::{ProviderError, SamplesProvider};
use crate::response::{Clock, EscalationLevel};

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

// ============================================================================
// Provider
// ============================================================================

/// Provider that replays a script of batches.
///
/// Once the script runs out, the last successful batch is repeated.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: VecDeque<Result<Vec<RawSample>, ProviderError>>,
    last_ok: Vec<RawSample>,
    calls: Arc<AtomicU64>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that always returns `batch`.
    pub fn repeating(batch: Vec<RawSample>) -> Self {
        Self::new().then_ok(batch)
    }

    pub fn then_ok(mut self, batch: Vec<RawSample>) -> Self {
        self.script.push_back(Ok(batch));
        self
    }

    pub fn then_err(mut self, err: ProviderError) -> Self {
        self.script.push_back(Err(err));
        self
    }

    /// Shared count of `collect` calls.
    pub fn calls(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.calls)
    }
}

impl SamplesProvider for ScriptedProvider {
    fn collect(&mut self) -> Result<Vec<RawSample>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Ok(batch)) => {
                self.last_ok = batch.clone();
                Ok(batch)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last_ok.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ============================================================================
// Sink
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    CpuPriority(ProcessId, i32),
    IoPriority(ProcessId, IoClass, u8),
    Memory(ProcessId, EscalationLevel),
    ClearMemory(ProcessId),
    ReadCpuPriority(ProcessId),
}

impl SinkCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, SinkCall::ReadCpuPriority(_))
    }
}

#[derive(Debug, Default)]
struct SinkState {
    calls: Vec<SinkCall>,
    fail_with: Option<ActionError>,
    priorities: HashMap<ProcessId, i32>,
}

/// Sink that records every call. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `priority` as the current nice value of `pid`.
    pub fn with_priority(self, pid: ProcessId, priority: i32) -> Self {
        self.lock().priorities.insert(pid, priority);
        self
    }

    /// Make every mutating call fail with `err` until cleared.
    pub fn fail_with(&self, err: Option<ActionError>) {
        self.lock().fail_with = err;
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.lock().calls.clone()
    }

    /// Calls that would change a process, in order.
    pub fn mutations(&self) -> Vec<SinkCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: SinkCall) -> Result<(), ActionError> {
        let mut state = self.lock();
        state.calls.push(call);
        match &state.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl ActionSink for RecordingSink {
    fn set_cpu_priority(&self, pid: ProcessId, priority: i32) -> Result<(), ActionError> {
        self.record(SinkCall::CpuPriority(pid, priority))?;
        self.lock().priorities.insert(pid, priority);
        Ok(())
    }

    fn set_io_priority(&self, pid: ProcessId, class: IoClass, level: u8) -> Result<(), ActionError> {
        self.record(SinkCall::IoPriority(pid, class, level))
    }

    fn advise_memory_pressure(
        &self,
        pid: ProcessId,
        level: EscalationLevel,
    ) -> Result<(), ActionError> {
        self.record(SinkCall::Memory(pid, level))
    }

    fn clear_memory_pressure(&self, pid: ProcessId) -> Result<(), ActionError> {
        self.record(SinkCall::ClearMemory(pid))
    }

    fn current_cpu_priority(&self, pid: ProcessId) -> Result<Option<i32>, ActionError> {
        let mut state = self.lock();
        state.calls.push(SinkCall::ReadCpuPriority(pid));
        Ok(state.priorities.get(&pid).copied())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Clock moved by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, secs: u64) {
        self.now.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
