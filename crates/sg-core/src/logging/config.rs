//! Where the log level and format come from.
//!
//! Precedence, highest first: `--log-level`/`--log-format`, then
//! `SPIKEGUARD_LOG`/`SPIKEGUARD_LOG_FORMAT`, then the `RUST_LOG` directive
//! for our crates, then the defaults (info, human).

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ENV_LOG_LEVEL: &str = "SPIKEGUARD_LOG";
pub const ENV_LOG_FORMAT: &str = "SPIKEGUARD_LOG_FORMAT";
/// Set to `0`/`false` to drop timestamps from human output (journald adds its own).
pub const ENV_LOG_TIMESTAMPS: &str = "SPIKEGUARD_LOG_TIMESTAMPS";
const ENV_RUST_LOG: &str = "RUST_LOG";

/// Targets whose `RUST_LOG` directives we honor.
const OWN_TARGETS: [&str; 2] = ["sg_core", "spikeguard"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Console lines for an operator at a terminal.
    #[default]
    #[value(alias = "console", alias = "pretty")]
    Human,
    /// One JSON object per record.
    #[value(alias = "json")]
    Jsonl,
}

/// Ordered from most to least verbose.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[value(alias = "warning")]
    Warn,
    Error,
    #[value(alias = "none", alias = "quiet")]
    Off,
}

macro_rules! value_enum_text {
    ($ty:ty, $what:literal) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty as ValueEnum>::from_str(s.trim(), true)
                    .map_err(|_| format!(concat!("unknown log ", $what, ": {}"), s))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.to_possible_value() {
                    Some(value) => f.write_str(value.get_name()),
                    None => Ok(()),
                }
            }
        }
    };
}

value_enum_text!(LogFormat, "format");
value_enum_text!(LogLevel, "level");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
        }
    }
}

impl LogConfig {
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), cli_level, cli_format)
    }

    /// [`LogConfig::from_env`] with an injectable variable lookup.
    ///
    /// Unparseable values are ignored and the next source down is used.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let defaults = LogConfig::default();

        let level = cli_level
            .or_else(|| lookup(ENV_LOG_LEVEL).and_then(|v| v.parse().ok()))
            .or_else(|| lookup(ENV_RUST_LOG).and_then(|v| level_from_rust_log(&v)))
            .unwrap_or(defaults.level);

        let format = cli_format
            .or_else(|| lookup(ENV_LOG_FORMAT).and_then(|v| v.parse().ok()))
            .unwrap_or(defaults.format);

        let timestamps = lookup(ENV_LOG_TIMESTAMPS)
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.timestamps);

        LogConfig {
            format,
            level,
            timestamps,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

/// Most verbose level that `RUST_LOG` grants one of our targets.
///
/// A bare level (`debug`) applies to everything; `sg_core=trace` or
/// `spikeguard::daemon=warn` apply to us; directives for other crates are
/// skipped.
fn level_from_rust_log(directives: &str) -> Option<LogLevel> {
    directives
        .split(',')
        .filter_map(|directive| {
            let directive = directive.trim();
            match directive.split_once('=') {
                None => directive.parse::<LogLevel>().ok(),
                Some((target, level)) => {
                    let root = target.split("::").next().unwrap_or(target);
                    if OWN_TARGETS.contains(&root) {
                        level.parse::<LogLevel>().ok()
                    } else {
                        None
                    }
                }
            }
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn names_and_aliases_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("Console".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("quiet".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn display_uses_canonical_name() {
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogFormat::Jsonl.to_string(), "jsonl");
    }

    #[test]
    fn own_env_beats_rust_log() {
        let config = LogConfig::from_lookup(
            lookup_from(&[(ENV_LOG_LEVEL, "error"), (ENV_RUST_LOG, "debug")]),
            None,
            None,
        );
        assert_eq!(config.level, LogLevel::Error);
    }

    #[test]
    fn bad_env_value_falls_through() {
        let config = LogConfig::from_lookup(
            lookup_from(&[(ENV_LOG_LEVEL, "loud"), (ENV_RUST_LOG, "trace")]),
            None,
            None,
        );
        assert_eq!(config.level, LogLevel::Trace);
    }

    #[test]
    fn rust_log_only_counts_our_targets() {
        assert_eq!(level_from_rust_log("hyper=trace,sg_core=debug"), Some(LogLevel::Debug));
        assert_eq!(level_from_rust_log("hyper=trace"), None);
        assert_eq!(
            level_from_rust_log("warn,spikeguard::daemon=trace"),
            Some(LogLevel::Trace)
        );
    }

    #[test]
    fn cli_overrides_env() {
        let config = LogConfig::from_lookup(
            lookup_from(&[(ENV_LOG_LEVEL, "error"), (ENV_LOG_FORMAT, "json")]),
            Some(LogLevel::Trace),
            Some(LogFormat::Human),
        );
        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Human);
    }

    #[test]
    fn timestamps_can_be_disabled() {
        let config =
            LogConfig::from_lookup(lookup_from(&[(ENV_LOG_TIMESTAMPS, "0")]), None, None);
        assert!(!config.timestamps);
        assert!(LogConfig::from_lookup(lookup_from(&[]), None, None).timestamps);
    }
}
