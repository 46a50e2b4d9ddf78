//! Action sink backed by Linux syscalls.
//!
//! - CPU: setpriority(2) on the process
//! - I/O: ioprio_set(2) with `IOPRIO_WHO_PROCESS`
//! - Memory: writes `/proc/[pid]/oom_score_adj` at CRITICAL and puts the
//!   previous value back when the process is restored
//!
//! Raising priority (negative nice, realtime I/O class) requires
//! `CAP_SYS_NICE`/`CAP_SYS_ADMIN`; without it calls fail with
//! [`ActionError::PermissionDenied`] and the controller records the failure.

use sg_common::ProcessId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use super::{ActionError, ActionSink, IoClass};
use crate::response::EscalationLevel;

/// Maximum nice value allowed (19 = lowest priority).
pub const MAX_NICE_VALUE: i32 = 19;
/// Minimum nice value allowed (-20 = highest priority).
pub const MIN_NICE_VALUE: i32 = -20;

#[cfg(target_os = "linux")]
const IOPRIO_WHO_PROCESS: libc::c_long = 1;
#[cfg(target_os = "linux")]
const IOPRIO_CLASS_SHIFT: i32 = 13;

/// Syscall sink configuration.
#[derive(Debug, Clone)]
pub struct SyscallSinkConfig {
    /// Value written to `oom_score_adj` on CRITICAL memory pressure.
    pub oom_score_adj: i32,
    /// procfs mount point.
    pub proc_root: PathBuf,
}

impl Default for SyscallSinkConfig {
    fn default() -> Self {
        Self {
            oom_score_adj: 500,
            proc_root: PathBuf::from("/proc"),
        }
    }
}

#[derive(Debug, Default)]
pub struct SyscallActionSink {
    config: SyscallSinkConfig,
    /// `oom_score_adj` before the first CRITICAL write, per pid.
    saved_oom: Mutex<HashMap<ProcessId, i32>>,
}

#[cfg(unix)]
fn errno_to_action_error(err: std::io::Error) -> ActionError {
    match err.raw_os_error() {
        Some(libc::ESRCH) => ActionError::ProcessNotFound,
        Some(libc::EPERM) | Some(libc::EACCES) => ActionError::PermissionDenied,
        Some(libc::EINVAL) => ActionError::Failed("invalid priority value".to_string()),
        _ => ActionError::Failed(err.to_string()),
    }
}

impl SyscallActionSink {
    pub fn new(config: SyscallSinkConfig) -> Self {
        Self {
            config,
            saved_oom: Mutex::new(HashMap::new()),
        }
    }

    fn saved_oom(&self) -> std::sync::MutexGuard<'_, HashMap<ProcessId, i32>> {
        self.saved_oom.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Parse the nice value out of stat content.
    fn parse_nice(content: &str) -> Option<i32> {
        // Format: pid (comm) state ...
        let comm_end = content.rfind(')')?;
        let after_comm = content.get(comm_end + 2..)?;
        let fields: Vec<&str> = after_comm.split_whitespace().collect();

        // Fields after (comm): 0=state, 1=ppid, ..., 15=priority, 16=nice
        fields.get(16)?.parse::<i32>().ok()
    }

    fn read_nice(&self, pid: ProcessId) -> Result<Option<i32>, ActionError> {
        let stat_path = self.config.proc_root.join(pid.0.to_string()).join("stat");
        match std::fs::read_to_string(stat_path) {
            Ok(content) => Ok(Self::parse_nice(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ActionError::ProcessNotFound),
            Err(e) => Err(ActionError::Failed(e.to_string())),
        }
    }

    fn oom_path(&self, pid: ProcessId) -> PathBuf {
        self.config
            .proc_root
            .join(pid.0.to_string())
            .join("oom_score_adj")
    }

    fn read_oom_score_adj(&self, pid: ProcessId) -> Option<i32> {
        std::fs::read_to_string(self.oom_path(pid))
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    fn write_oom_score_adj(&self, pid: ProcessId, value: i32) -> Result<(), ActionError> {
        std::fs::write(self.oom_path(pid), value.to_string()).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ActionError::ProcessNotFound,
            std::io::ErrorKind::PermissionDenied => ActionError::PermissionDenied,
            _ => ActionError::Failed(e.to_string()),
        })
    }
}

impl ActionSink for SyscallActionSink {
    #[cfg(unix)]
    fn set_cpu_priority(&self, pid: ProcessId, priority: i32) -> Result<(), ActionError> {
        let nice_value = priority.clamp(MIN_NICE_VALUE, MAX_NICE_VALUE);
        // SAFETY: setpriority takes plain integers.
        let result =
            unsafe { libc::setpriority(libc::PRIO_PROCESS, pid.0 as libc::id_t, nice_value) };

        if result == 0 {
            return Ok(());
        }
        Err(errno_to_action_error(std::io::Error::last_os_error()))
    }

    #[cfg(not(unix))]
    fn set_cpu_priority(&self, _pid: ProcessId, _priority: i32) -> Result<(), ActionError> {
        Err(ActionError::Unsupported(
            "setpriority not supported on this platform".to_string(),
        ))
    }

    #[cfg(target_os = "linux")]
    fn set_io_priority(&self, pid: ProcessId, class: IoClass, level: u8) -> Result<(), ActionError> {
        let ioprio = (class.as_raw() << IOPRIO_CLASS_SHIFT) | i32::from(level.min(7));
        // SAFETY: ioprio_set takes plain integers.
        let result = unsafe {
            libc::syscall(
                libc::SYS_ioprio_set,
                IOPRIO_WHO_PROCESS,
                libc::c_long::from(pid.0 as i32),
                libc::c_long::from(ioprio),
            )
        };

        if result == 0 {
            return Ok(());
        }
        Err(errno_to_action_error(std::io::Error::last_os_error()))
    }

    #[cfg(not(target_os = "linux"))]
    fn set_io_priority(&self, _pid: ProcessId, _class: IoClass, _level: u8) -> Result<(), ActionError> {
        Err(ActionError::Unsupported(
            "ioprio_set not supported on this platform".to_string(),
        ))
    }

    fn advise_memory_pressure(
        &self,
        pid: ProcessId,
        level: EscalationLevel,
    ) -> Result<(), ActionError> {
        if level < EscalationLevel::Critical {
            return Ok(());
        }
        {
            let mut saved = self.saved_oom();
            if !saved.contains_key(&pid) {
                if let Some(previous) = self.read_oom_score_adj(pid) {
                    saved.insert(pid, previous);
                }
            }
        }
        self.write_oom_score_adj(pid, self.config.oom_score_adj)
    }

    fn clear_memory_pressure(&self, pid: ProcessId) -> Result<(), ActionError> {
        let previous = self.saved_oom().get(&pid).copied().unwrap_or(0);
        match self.write_oom_score_adj(pid, previous) {
            // Gone is as good as restored.
            Ok(()) | Err(ActionError::ProcessNotFound) => {
                self.saved_oom().remove(&pid);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn current_cpu_priority(&self, pid: ProcessId) -> Result<Option<i32>, ActionError> {
        self.read_nice(pid)
    }

    fn name(&self) -> &'static str {
        "syscall"
    }
}
