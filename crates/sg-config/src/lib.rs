//! spikeguard configuration loading and validation.
//!
//! This crate provides:
//! - Typed settings for the sampler, predictor, response controller and
//!   procfs backend, every field defaulted
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation with field paths

pub mod resolve;
pub mod settings;
pub mod validate;

use std::path::{Path, PathBuf};

pub use resolve::{resolve_config, ConfigSource, ResolvedConfig};
pub use settings::{
    CpuResponse, IoResponse, MemResponse, PredictorSettings, ProcfsSettings, ResponseSettings,
    SamplerSettings, Settings,
};
pub use validate::{validate_settings, ValidationError, ValidationResult};

/// Settings together with where they came from.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Resolve, parse and validate the effective settings.
///
/// An explicit CLI path that does not exist is an error; every other
/// missing location falls through to the next one and finally to defaults.
pub fn load_settings(cli_path: Option<&Path>) -> ValidationResult<LoadedSettings> {
    if let Some(path) = cli_path {
        if !path.exists() {
            return Err(ValidationError::IoError(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
    }

    let resolved = resolve_config(cli_path);
    let settings = match &resolved.path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    validate_settings(&settings)?;

    Ok(LoadedSettings {
        settings,
        path: resolved.path,
        source: resolved.source,
    })
}
