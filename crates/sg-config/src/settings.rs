//! Typed settings for the spikeguard daemon.
//!
//! Every table and field is optional in the TOML file; anything omitted
//! takes the built-in default shown here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::validate::ValidationError;

/// Complete daemon settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub sampler: SamplerSettings,
    pub predictor: PredictorSettings,
    pub response: ResponseSettings,
    pub procfs: ProcfsSettings,
}

/// Sampler loop and signature store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerSettings {
    /// Sampling period in milliseconds.
    pub interval_ms: u64,
    /// Maximum number of tracked signatures.
    pub capacity: usize,
    /// Upper bound on a single provider call.
    pub provider_timeout_ms: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            capacity: 4096,
            provider_timeout_ms: 250,
        }
    }
}

/// Smoothing factor and spike thresholds, all fixed-point (x100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictorSettings {
    /// EMA weight of the new sample, out of 100.
    pub alpha: i64,
    pub cpu_threshold: i64,
    pub mem_threshold: i64,
    pub io_threshold: i64,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            alpha: 30,
            cpu_threshold: 2000,
            mem_threshold: 1500,
            io_threshold: 1000,
        }
    }
}

/// Response controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseSettings {
    /// Response tick period in milliseconds.
    pub interval_ms: u64,
    /// Upper bound on a single action sink call.
    pub action_timeout_ms: u64,
    /// Seconds without a spike before a process is restored.
    pub quiet_window_secs: u64,
    /// Minimum seconds between persistent-spike reports.
    pub persistent_interval_secs: u64,
    /// Consecutive flagged ticks needed to appear in the report.
    pub persistent_min_samples: u32,
    /// A process must have spiked within this many seconds to be reported.
    pub persistent_freshness_secs: u64,
    /// Process names (as in `/proc/<pid>/comm`, case-insensitive) that are
    /// never reniced or marked for the OOM killer.
    pub protected: Vec<String>,
    pub cpu: CpuResponse,
    pub mem: MemResponse,
    pub io: IoResponse,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            action_timeout_ms: 250,
            quiet_window_secs: 5,
            persistent_interval_secs: 5,
            persistent_min_samples: 5,
            persistent_freshness_secs: 2,
            protected: default_protected(),
            cpu: CpuResponse::default(),
            mem: MemResponse::default(),
            io: IoResponse::default(),
        }
    }
}

fn default_protected() -> Vec<String> {
    ["systemd", "init", "sshd", "systemd-journal", "spikeguard"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// CPU priority boosts per escalation level (nice deltas).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CpuResponse {
    pub cooldown_secs: u64,
    pub soft_boost: i32,
    pub hard_boost: i32,
    pub critical_boost: i32,
    /// Lowest nice value the controller will ever request.
    pub priority_floor: i32,
}

impl Default for CpuResponse {
    fn default() -> Self {
        Self {
            cooldown_secs: 10,
            soft_boost: -5,
            hard_boost: -10,
            critical_boost: -15,
            priority_floor: -20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemResponse {
    pub cooldown_secs: u64,
    /// Value written to `oom_score_adj` at CRITICAL.
    pub oom_score_adj: i32,
}

impl Default for MemResponse {
    fn default() -> Self {
        Self {
            cooldown_secs: 15,
            oom_score_adj: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IoResponse {
    pub cooldown_secs: u64,
}

impl Default for IoResponse {
    fn default() -> Self {
        Self { cooldown_secs: 10 }
    }
}

/// Settings for the `/proc` samples provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcfsSettings {
    pub proc_root: PathBuf,
    /// Combined read+write bandwidth that maps to an I/O reading of 100%.
    pub io_full_scale_bytes_per_sec: u64,
    /// Skip kernel threads (no `cmdline`, parent kthreadd).
    pub skip_kernel_threads: bool,
}

impl Default for ProcfsSettings {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            io_full_scale_bytes_per_sec: 100 * 1024 * 1024,
            skip_kernel_threads: true,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_toml(&content)
    }

    /// Parse settings from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self, ValidationError> {
        toml::from_str(content)
            .map_err(|e| ValidationError::ParseError(format!("Invalid TOML: {}", e)))
    }

    /// Render the settings as TOML.
    pub fn to_toml_string(&self) -> Result<String, ValidationError> {
        toml::to_string_pretty(self)
            .map_err(|e| ValidationError::ParseError(format!("Cannot render TOML: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let settings = Settings::parse_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.sampler.capacity, 4096);
        assert_eq!(settings.predictor.alpha, 30);
        assert_eq!(settings.response.cpu.soft_boost, -5);
    }

    #[test]
    fn partial_table_keeps_other_defaults() {
        let settings = Settings::parse_toml(
            r#"
            [response.cpu]
            cooldown_secs = 3

            [predictor]
            cpu_threshold = 2500
            "#,
        )
        .unwrap();
        assert_eq!(settings.response.cpu.cooldown_secs, 3);
        assert_eq!(settings.response.cpu.hard_boost, -10);
        assert_eq!(settings.response.mem.cooldown_secs, 15);
        assert_eq!(settings.predictor.cpu_threshold, 2500);
        assert_eq!(settings.predictor.mem_threshold, 1500);
    }

    #[test]
    fn protected_list_replaces_defaults() {
        assert!(Settings::default()
            .response
            .protected
            .contains(&"sshd".to_string()));
        let settings = Settings::parse_toml("[response]\nprotected = [\"postgres\"]\n").unwrap();
        assert_eq!(settings.response.protected, vec!["postgres".to_string()]);
    }

    #[test]
    fn unknown_field_rejected() {
        let err = Settings::parse_toml("[sampler]\nintervl_ms = 5\n").unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }

    #[test]
    fn toml_output_parses_back() {
        let mut settings = Settings::default();
        settings.procfs.io_full_scale_bytes_per_sec = 1234;
        let text = settings.to_toml_string().unwrap();
        assert!(text.contains("[response.cpu]"));
        assert_eq!(Settings::parse_toml(&text).unwrap(), settings);
    }
}
