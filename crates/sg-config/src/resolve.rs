//! Locating the settings file.
//!
//! Candidates are tried in order and the first existing file wins:
//! `--config`, `$SPIKEGUARD_CONFIG`, `$SPIKEGUARD_CONFIG_DIR/spikeguard.toml`,
//! `$XDG_CONFIG_HOME/spikeguard/spikeguard.toml`,
//! `/etc/spikeguard/spikeguard.toml`. With none present the built-in
//! defaults apply.

use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "SPIKEGUARD_CONFIG";
pub const ENV_CONFIG_DIR: &str = "SPIKEGUARD_CONFIG_DIR";
pub const CONFIG_FILENAME: &str = "spikeguard.toml";

const CONFIG_SUBDIR: &str = "spikeguard";

/// Provenance of the effective settings, logged at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    CliArgument,
    /// `SPIKEGUARD_CONFIG` or `SPIKEGUARD_CONFIG_DIR`.
    Environment,
    XdgConfig,
    SystemConfig,
    #[default]
    BuiltinDefault,
}

impl ConfigSource {
    pub fn label(self) -> &'static str {
        match self {
            ConfigSource::CliArgument => "--config",
            ConfigSource::Environment => "environment",
            ConfigSource::XdgConfig => "user config dir",
            ConfigSource::SystemConfig => "/etc",
            ConfigSource::BuiltinDefault => "defaults",
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    /// `None` when no candidate exists.
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Ordered candidate paths, before any existence check.
pub fn candidates(cli_path: Option<&Path>) -> Vec<(ConfigSource, PathBuf)> {
    let env = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);

    let mut out = Vec::with_capacity(5);
    if let Some(path) = cli_path {
        out.push((ConfigSource::CliArgument, path.to_path_buf()));
    }
    if let Some(path) = env(ENV_CONFIG_PATH) {
        out.push((ConfigSource::Environment, path));
    }
    if let Some(dir) = env(ENV_CONFIG_DIR) {
        out.push((ConfigSource::Environment, dir.join(CONFIG_FILENAME)));
    }
    if let Some(dir) = xdg_config_dir() {
        out.push((ConfigSource::XdgConfig, dir.join(CONFIG_FILENAME)));
    }
    out.push((
        ConfigSource::SystemConfig,
        system_config_dir().join(CONFIG_FILENAME),
    ));
    out
}

pub fn resolve_config(cli_path: Option<&Path>) -> ResolvedConfig {
    candidates(cli_path)
        .into_iter()
        .find(|(_, path)| path.is_file())
        .map(|(source, path)| ResolvedConfig {
            path: Some(path),
            source,
        })
        .unwrap_or_default()
}

/// `~/.config/spikeguard` (or the platform equivalent).
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_SUBDIR))
}

pub fn system_config_dir() -> PathBuf {
    Path::new("/etc").join(CONFIG_SUBDIR)
}
