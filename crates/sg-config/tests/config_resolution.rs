//! Configuration loading + resolution tests against real files.
//!
//! Covers:
//! - Resolution order (CLI > env path > env dir > XDG)
//! - Validation of loaded files
//! - Missing explicit CLI path

use sg_config::resolve::{resolve_config, ConfigSource, CONFIG_FILENAME};
use sg_config::{load_settings, Settings, ValidationError};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const ENV_KEYS: &[&str] = &[
    "SPIKEGUARD_CONFIG",
    "SPIKEGUARD_CONFIG_DIR",
    "XDG_CONFIG_HOME",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|k| (k.to_string(), env::var(k).ok()))
            .collect();
        for key in keys {
            env::remove_var(key);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    f()
}

fn write_settings(path: &Path, capacity: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create config parent");
    }
    fs::write(path, format!("[sampler]\ncapacity = {}\n", capacity)).expect("write config");
}

#[test]
fn cli_path_wins_over_env() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        let cli = temp.path().join("cli.toml");
        let env_file = temp.path().join("env.toml");
        write_settings(&cli, 11);
        write_settings(&env_file, 22);
        env::set_var("SPIKEGUARD_CONFIG", &env_file);

        let loaded = load_settings(Some(&cli)).expect("load");
        assert_eq!(loaded.source, ConfigSource::CliArgument);
        assert_eq!(loaded.settings.sampler.capacity, 11);
    });
}

#[test]
fn env_path_wins_over_config_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        let env_file = temp.path().join("env.toml");
        let dir = temp.path().join("dir");
        write_settings(&env_file, 22);
        write_settings(&dir.join(CONFIG_FILENAME), 33);
        env::set_var("SPIKEGUARD_CONFIG", &env_file);
        env::set_var("SPIKEGUARD_CONFIG_DIR", &dir);

        let resolved = resolve_config(None);
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path.unwrap(), env_file);
    });
}

#[test]
fn config_dir_used_when_no_env_path() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().join("dir");
        write_settings(&dir.join(CONFIG_FILENAME), 33);
        env::set_var("SPIKEGUARD_CONFIG_DIR", &dir);

        let loaded = load_settings(None).expect("load");
        assert_eq!(loaded.source, ConfigSource::Environment);
        assert_eq!(loaded.settings.sampler.capacity, 33);
    });
}

#[test]
fn xdg_fallback() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        let xdg = temp.path().join("xdg");
        let app_file = xdg.join("spikeguard").join(CONFIG_FILENAME);
        write_settings(&app_file, 44);
        env::set_var("XDG_CONFIG_HOME", &xdg);

        let resolved = resolve_config(None);
        // dirs ignores XDG_CONFIG_HOME on non-Linux platforms.
        if cfg!(target_os = "linux") {
            assert_eq!(resolved.source, ConfigSource::XdgConfig);
            assert_eq!(resolved.path.unwrap(), app_file);
        }
    });
}

#[test]
fn missing_cli_path_is_an_error() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        let err = load_settings(Some(&temp.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ValidationError::IoError(_)));
    });
}

#[test]
fn invalid_file_fails_validation() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("bad.toml");
        fs::write(&path, "[predictor]\nalpha = 0\n").expect("write config");

        let err = load_settings(Some(&path)).unwrap_err();
        match err {
            ValidationError::InvalidValue { field, .. } => assert_eq!(field, "predictor.alpha"),
            other => panic!("unexpected error: {other}"),
        }
    });
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("broken.toml");
    fs::write(&path, "[sampler\ncapacity = ").expect("write config");
    assert!(matches!(
        Settings::from_file(&path),
        Err(ValidationError::ParseError(_))
    ));
}
