//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::settings::Settings;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
        }
    }
}

/// Nice values accepted by setpriority(2).
const NICE_MIN: i32 = -20;
const NICE_MAX: i32 = 19;

/// Validate settings semantically.
pub fn validate_settings(settings: &Settings) -> ValidationResult<()> {
    let sampler = &settings.sampler;
    positive("sampler.interval_ms", sampler.interval_ms)?;
    positive("sampler.provider_timeout_ms", sampler.provider_timeout_ms)?;
    if sampler.capacity == 0 {
        return Err(invalid("sampler.capacity", "Must be at least 1, got 0"));
    }

    let predictor = &settings.predictor;
    if !(1..=100).contains(&predictor.alpha) {
        return Err(invalid(
            "predictor.alpha",
            format!("Must be in [1, 100], got {}", predictor.alpha),
        ));
    }
    for (field, value) in [
        ("predictor.cpu_threshold", predictor.cpu_threshold),
        ("predictor.mem_threshold", predictor.mem_threshold),
        ("predictor.io_threshold", predictor.io_threshold),
    ] {
        if value < 0 {
            return Err(invalid(field, format!("Must be non-negative, got {}", value)));
        }
    }

    let response = &settings.response;
    positive("response.interval_ms", response.interval_ms)?;
    positive("response.action_timeout_ms", response.action_timeout_ms)?;
    positive("response.persistent_interval_secs", response.persistent_interval_secs)?;
    positive(
        "response.persistent_freshness_secs",
        response.persistent_freshness_secs,
    )?;
    if response.persistent_min_samples == 0 {
        return Err(invalid(
            "response.persistent_min_samples",
            "Must be at least 1, got 0",
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for (i, name) in response.protected.iter().enumerate() {
        let field = format!("response.protected[{}]", i);
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(invalid(&field, "Must not be empty"));
        }
        if trimmed.contains('/') {
            return Err(invalid(
                &field,
                format!("Must be a process name, not a path: {:?}", name),
            ));
        }
        if !seen.insert(trimmed.to_lowercase()) {
            return Err(invalid(&field, format!("Duplicate entry {:?}", name)));
        }
    }

    let cpu = &response.cpu;
    if !(NICE_MIN..=NICE_MAX).contains(&cpu.priority_floor) {
        return Err(invalid(
            "response.cpu.priority_floor",
            format!(
                "Must be a nice value in [{}, {}], got {}",
                NICE_MIN, NICE_MAX, cpu.priority_floor
            ),
        ));
    }
    for (field, value) in [
        ("response.cpu.soft_boost", cpu.soft_boost),
        ("response.cpu.hard_boost", cpu.hard_boost),
        ("response.cpu.critical_boost", cpu.critical_boost),
    ] {
        if value > 0 || value < NICE_MIN - NICE_MAX {
            return Err(invalid(
                field,
                format!(
                    "Must be in [{}, 0], got {}",
                    NICE_MIN - NICE_MAX,
                    value
                ),
            ));
        }
    }
    if !(cpu.soft_boost >= cpu.hard_boost && cpu.hard_boost >= cpu.critical_boost) {
        return Err(ValidationError::SemanticError(format!(
            "CPU boosts must not weaken with escalation (soft={}, hard={}, critical={})",
            cpu.soft_boost, cpu.hard_boost, cpu.critical_boost
        )));
    }

    if !(-1000..=1000).contains(&response.mem.oom_score_adj) {
        return Err(invalid(
            "response.mem.oom_score_adj",
            format!("Must be in [-1000, 1000], got {}", response.mem.oom_score_adj),
        ));
    }

    positive(
        "procfs.io_full_scale_bytes_per_sec",
        settings.procfs.io_full_scale_bytes_per_sec,
    )?;

    Ok(())
}

fn positive(field: &str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(invalid(field, "Must be positive, got 0"));
    }
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}
