//! Raw per-process readings as delivered by a samples provider.

use serde::{Deserialize, Serialize};

use crate::id::{ProcessId, ProcessName};

/// Fixed-point scale shared by raw samples, EMAs and thresholds (x100).
pub const FIXED_POINT_SCALE: i64 = 100;

/// One process reading for one tick.
///
/// `cpu_raw`, `mem_raw` and `io_raw` are fixed-point values in
/// [`FIXED_POINT_SCALE`] (e.g. 8000 = 80.00%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub pid: ProcessId,
    pub name: ProcessName,
    pub cpu_raw: i64,
    pub mem_raw: i64,
    pub io_raw: i64,
    /// Process incarnation epoch (e.g. start time in clock ticks). Used to
    /// tell a reused pid apart from the process that held it before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
}

impl RawSample {
    pub fn new(pid: u32, name: &str, cpu_raw: i64, mem_raw: i64, io_raw: i64) -> Self {
        Self {
            pid: ProcessId(pid),
            name: ProcessName::new(name),
            cpu_raw,
            mem_raw,
            io_raw,
            start_time: None,
        }
    }

    pub fn with_start_time(mut self, start_time: u64) -> Self {
        self.start_time = Some(start_time);
        self
    }
}
