//! `/proc` samples provider (Linux).
//!
//! Readings, all fixed-point x100:
//! - cpu: CPU% of one core since the previous scan (utime+stime delta)
//! - mem: RSS as a percentage of `MemTotal`
//! - io: read+write bytes/s as a percentage of a configured full scale
//!
//! The first scan of a process has no previous counters, so its cpu and io
//! readings are 0.

use sg_common::{ProcessId, RawSample, FIXED_POINT_SCALE};
use sg_config::ProcfsSettings;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{ProviderError, SamplesProvider};

/// `PF_KTHREAD` from `include/linux/sched.h`.
const PF_KTHREAD: u64 = 0x0020_0000;

/// pid of kthreadd, parent of every kernel thread.
const KTHREADD_PID: u32 = 2;

/// Fields of `/proc/[pid]/stat` used for sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFields {
    pub comm: String,
    pub ppid: u32,
    pub flags: u64,
    pub utime: u64,
    pub stime: u64,
    /// Field 22, clock ticks since boot.
    pub starttime: u64,
    pub rss_pages: u64,
}

impl StatFields {
    pub fn is_kernel_thread(&self, pid: u32) -> bool {
        self.flags & PF_KTHREAD != 0 || pid == KTHREADD_PID || self.ppid == KTHREADD_PID
    }
}

/// Parse stat file content.
///
/// The comm field may contain spaces and parentheses, so fields are located
/// from the last `)`.
pub fn parse_stat_content(content: &str) -> Option<StatFields> {
    let comm_start = content.find('(')?;
    let comm_end = content.rfind(')')?;
    let comm = content.get(comm_start + 1..comm_end)?.to_string();
    let fields: Vec<&str> = content.get(comm_end + 1..)?.split_whitespace().collect();

    // Index 0 is field 3 (state).
    let field = |n: usize| -> Option<u64> { fields.get(n - 3)?.parse().ok() };

    Some(StatFields {
        comm,
        ppid: u32::try_from(field(4)?).ok()?,
        flags: field(9)?,
        utime: field(14)?,
        stime: field(15)?,
        starttime: field(22)?,
        rss_pages: field(24)?,
    })
}

/// Combined `read_bytes + write_bytes` from `/proc/[pid]/io` content.
pub fn parse_io_bytes(content: &str) -> Option<u64> {
    let mut read = None;
    let mut write = None;
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<u64>() else {
            continue;
        };
        match key.trim() {
            "read_bytes" => read = Some(value),
            "write_bytes" => write = Some(value),
            _ => {}
        }
    }
    Some(read?.saturating_add(write?))
}

/// `MemTotal` in bytes from `/proc/meminfo` content.
pub fn parse_mem_total(content: &str) -> Option<u64> {
    let line = content.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

#[derive(Debug, Clone, Copy)]
struct PrevCounters {
    cpu_ticks: u64,
    io_bytes: Option<u64>,
    starttime: u64,
}

#[derive(Debug, Clone, Copy)]
struct SystemConstants {
    clock_ticks: u64,
    page_size: u64,
}

impl SystemConstants {
    #[cfg(unix)]
    fn detect() -> Self {
        // SAFETY: sysconf has no memory-safety preconditions.
        let clock_ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        Self {
            clock_ticks: u64::try_from(clock_ticks).ok().filter(|v| *v > 0).unwrap_or(100),
            page_size: u64::try_from(page_size).ok().filter(|v| *v > 0).unwrap_or(4096),
        }
    }

    #[cfg(not(unix))]
    fn detect() -> Self {
        Self {
            clock_ticks: 100,
            page_size: 4096,
        }
    }
}

/// Scans a procfs tree and turns counters into fixed-point readings.
pub struct ProcfsProvider {
    root: PathBuf,
    io_full_scale: u64,
    skip_kernel_threads: bool,
    constants: SystemConstants,
    previous: HashMap<ProcessId, PrevCounters>,
    last_scan: Option<Instant>,
}

impl ProcfsProvider {
    pub fn new(settings: &ProcfsSettings) -> Self {
        Self {
            root: settings.proc_root.clone(),
            io_full_scale: settings.io_full_scale_bytes_per_sec.max(1),
            skip_kernel_threads: settings.skip_kernel_threads,
            constants: SystemConstants::detect(),
            previous: HashMap::new(),
            last_scan: None,
        }
    }

    /// Override clock ticks and page size (fixture trees).
    pub fn with_system_constants(mut self, clock_ticks: u64, page_size: u64) -> Self {
        self.constants = SystemConstants {
            clock_ticks: clock_ticks.max(1),
            page_size: page_size.max(1),
        };
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn mem_total(&self) -> Result<u64, ProviderError> {
        let content = fs::read_to_string(self.root.join("meminfo"))?;
        parse_mem_total(&content)
            .filter(|v| *v > 0)
            .ok_or_else(|| ProviderError::Failed("meminfo has no MemTotal".to_string()))
    }

    fn scan_with_elapsed(&mut self, elapsed_secs: Option<f64>) -> Result<Vec<RawSample>, ProviderError> {
        let mem_total = self.mem_total()?;
        let mut current = HashMap::new();
        let mut samples = Vec::new();

        for entry in fs::read_dir(&self.root)?.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };

            // The process may exit between read_dir and the read.
            let Ok(content) = fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            let Some(stat) = parse_stat_content(&content) else {
                continue;
            };
            if self.skip_kernel_threads && stat.is_kernel_thread(pid) {
                continue;
            }

            // io is root-only for other users' processes; treat as unknown.
            let io_bytes = fs::read_to_string(entry.path().join("io"))
                .ok()
                .and_then(|c| parse_io_bytes(&c));

            let pid_key = ProcessId(pid);
            let counters = PrevCounters {
                cpu_ticks: stat.utime.saturating_add(stat.stime),
                io_bytes,
                starttime: stat.starttime,
            };
            let prev = self
                .previous
                .get(&pid_key)
                .filter(|p| p.starttime == stat.starttime);

            let (cpu_raw, io_raw) = match (prev, elapsed_secs) {
                (Some(prev), Some(elapsed)) if elapsed > 0.0 => {
                    let tick_delta = counters.cpu_ticks.saturating_sub(prev.cpu_ticks);
                    let cpu_pct = tick_delta as f64 / self.constants.clock_ticks as f64 / elapsed
                        * 100.0;
                    let io_pct = match (prev.io_bytes, io_bytes) {
                        (Some(before), Some(after)) => {
                            let rate = after.saturating_sub(before) as f64 / elapsed;
                            rate / self.io_full_scale as f64 * 100.0
                        }
                        _ => 0.0,
                    };
                    (to_fixed(cpu_pct), to_fixed(io_pct))
                }
                _ => (0, 0),
            };

            let rss_bytes = stat.rss_pages.saturating_mul(self.constants.page_size);
            let mem_raw = to_fixed(rss_bytes as f64 / mem_total as f64 * 100.0);

            current.insert(pid_key, counters);
            samples.push(
                RawSample::new(pid, &stat.comm, cpu_raw, mem_raw, io_raw)
                    .with_start_time(stat.starttime),
            );
        }

        self.previous = current;
        samples.sort_by_key(|s| s.pid);
        Ok(samples)
    }
}

fn to_fixed(percent: f64) -> i64 {
    let scaled = (percent * FIXED_POINT_SCALE as f64).round();
    if scaled.is_finite() {
        scaled as i64
    } else {
        0
    }
}

impl SamplesProvider for ProcfsProvider {
    fn collect(&mut self) -> Result<Vec<RawSample>, ProviderError> {
        let now = Instant::now();
        let elapsed = self
            .last_scan
            .map(|prev| now.duration_since(prev).as_secs_f64());
        let samples = self.scan_with_elapsed(elapsed)?;
        self.last_scan = Some(now);
        Ok(samples)
    }

    fn name(&self) -> &'static str {
        "procfs"
    }
}
