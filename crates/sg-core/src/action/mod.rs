//! Action sinks: where priority, I/O and memory directives are applied.
//!
//! Every directive carries an absolute target, so repeating one is harmless.
//! The controller never retries a failed directive within the same tick.

pub mod dry_run;
pub mod syscall;

pub use dry_run::DryRunActionSink;
pub use syscall::SyscallActionSink;

use serde::{Deserialize, Serialize};
use sg_common::ProcessId;
use std::time::Duration;
use thiserror::Error;

use crate::bounded::{BoundedError, BoundedWorker};
use crate::response::EscalationLevel;

/// Errors during action execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("process not found")]
    ProcessNotFound,
    #[error("timeout")]
    Timeout,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("action failed: {0}")]
    Failed(String),
}

/// I/O scheduling class (`IOPRIO_CLASS_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoClass {
    Realtime,
    BestEffort,
    Idle,
}

impl IoClass {
    /// Kernel class number.
    pub fn as_raw(self) -> i32 {
        match self {
            IoClass::Realtime => 1,
            IoClass::BestEffort => 2,
            IoClass::Idle => 3,
        }
    }
}

impl std::fmt::Display for IoClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoClass::Realtime => write!(f, "realtime"),
            IoClass::BestEffort => write!(f, "best_effort"),
            IoClass::Idle => write!(f, "idle"),
        }
    }
}

/// Applies directives to processes.
pub trait ActionSink: Send {
    /// Set the nice value of `pid` to `priority`.
    fn set_cpu_priority(&self, pid: ProcessId, priority: i32) -> Result<(), ActionError>;

    /// Set the I/O scheduling class and level (0 = highest, 7 = lowest).
    fn set_io_priority(&self, pid: ProcessId, class: IoClass, level: u8)
        -> Result<(), ActionError>;

    /// Signal memory pressure for `pid` at `level`.
    fn advise_memory_pressure(
        &self,
        pid: ProcessId,
        level: EscalationLevel,
    ) -> Result<(), ActionError>;

    /// Undo what `advise_memory_pressure` changed for `pid`.
    ///
    /// Sinks that never change anything keep the default.
    fn clear_memory_pressure(&self, _pid: ProcessId) -> Result<(), ActionError> {
        Ok(())
    }

    /// Current nice value, if the sink can read it.
    fn current_cpu_priority(&self, _pid: ProcessId) -> Result<Option<i32>, ActionError> {
        Ok(None)
    }

    fn name(&self) -> &'static str;
}

impl<S: ActionSink + ?Sized> ActionSink for Box<S> {
    fn set_cpu_priority(&self, pid: ProcessId, priority: i32) -> Result<(), ActionError> {
        (**self).set_cpu_priority(pid, priority)
    }

    fn set_io_priority(&self, pid: ProcessId, class: IoClass, level: u8) -> Result<(), ActionError> {
        (**self).set_io_priority(pid, class, level)
    }

    fn advise_memory_pressure(
        &self,
        pid: ProcessId,
        level: EscalationLevel,
    ) -> Result<(), ActionError> {
        (**self).advise_memory_pressure(pid, level)
    }

    fn clear_memory_pressure(&self, pid: ProcessId) -> Result<(), ActionError> {
        (**self).clear_memory_pressure(pid)
    }

    fn current_cpu_priority(&self, pid: ProcessId) -> Result<Option<i32>, ActionError> {
        (**self).current_cpu_priority(pid)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// ---------------------------------------------------------------------------
// Timeout wrapper
// ---------------------------------------------------------------------------

enum SinkRequest {
    CpuPriority(ProcessId, i32),
    IoPriority(ProcessId, IoClass, u8),
    Memory(ProcessId, EscalationLevel),
    ClearMemory(ProcessId),
    ReadCpuPriority(ProcessId),
}

type SinkReply = Result<Option<i32>, ActionError>;

/// Runs another sink on a worker thread and bounds each call.
///
/// An overrunning call fails with [`ActionError::Timeout`]; the directive
/// may still land later, which is safe because targets are absolute.
pub struct TimedSink {
    name: &'static str,
    worker: BoundedWorker<SinkRequest, SinkReply>,
}

impl TimedSink {
    pub fn new<S>(sink: S, timeout: Duration) -> std::io::Result<Self>
    where
        S: ActionSink + 'static,
    {
        let name = sink.name();
        let worker = BoundedWorker::spawn("sg-action", timeout, move |req| match req {
            SinkRequest::CpuPriority(pid, prio) => sink.set_cpu_priority(pid, prio).map(|_| None),
            SinkRequest::IoPriority(pid, class, level) => {
                sink.set_io_priority(pid, class, level).map(|_| None)
            }
            SinkRequest::Memory(pid, level) => {
                sink.advise_memory_pressure(pid, level).map(|_| None)
            }
            SinkRequest::ClearMemory(pid) => sink.clear_memory_pressure(pid).map(|_| None),
            SinkRequest::ReadCpuPriority(pid) => sink.current_cpu_priority(pid),
        })?;
        Ok(Self { name, worker })
    }

    fn call(&self, req: SinkRequest) -> SinkReply {
        match self.worker.call(req) {
            Ok(reply) => reply,
            Err(BoundedError::Elapsed { .. }) => Err(ActionError::Timeout),
            Err(BoundedError::Disconnected) => {
                Err(ActionError::Failed("action worker thread exited".to_string()))
            }
        }
    }
}

impl ActionSink for TimedSink {
    fn set_cpu_priority(&self, pid: ProcessId, priority: i32) -> Result<(), ActionError> {
        self.call(SinkRequest::CpuPriority(pid, priority)).map(|_| ())
    }

    fn set_io_priority(&self, pid: ProcessId, class: IoClass, level: u8) -> Result<(), ActionError> {
        self.call(SinkRequest::IoPriority(pid, class, level))
            .map(|_| ())
    }

    fn advise_memory_pressure(
        &self,
        pid: ProcessId,
        level: EscalationLevel,
    ) -> Result<(), ActionError> {
        self.call(SinkRequest::Memory(pid, level)).map(|_| ())
    }

    fn clear_memory_pressure(&self, pid: ProcessId) -> Result<(), ActionError> {
        self.call(SinkRequest::ClearMemory(pid)).map(|_| ())
    }

    fn current_cpu_priority(&self, pid: ProcessId) -> Result<Option<i32>, ActionError> {
        self.call(SinkRequest::ReadCpuPriority(pid))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
