//! Tracing setup for the `spikeguard` binary.
//!
//! Logs always go to stderr; stdout carries the `sample` and `config`
//! payloads. Records from the two loops carry `event` and `stage` fields
//! (see [`events`]) so JSON output can be filtered without parsing messages.

pub mod config;
pub mod events;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Stage};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Level filter covering the library and the binary targets.
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::new(format!(
        "sg_core={level},spikeguard={level}",
        level = config.level
    ))
}

/// Output layer for the configured format, type-erased so every format
/// stacks on the registry the same way.
pub fn build_layer(config: &LogConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    match config.format {
        LogFormat::Human => {
            let human = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(true)
                .with_ansi(std::io::stderr().is_terminal());
            if config.timestamps {
                human.boxed()
            } else {
                human.without_time().boxed()
            }
        }
        LogFormat::Jsonl => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .flatten_event(true)
            .boxed(),
    }
}

/// Install the global subscriber. Call once, before the first record.
pub fn init_logging(config: &LogConfig) {
    tracing_subscriber::registry()
        .with(build_layer(config))
        .with(build_filter(config))
        .init();
}

/// `run-` followed by 12 hex digits of a random UUID.
pub fn generate_run_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &hex[..12])
}
