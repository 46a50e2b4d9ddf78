//! spikeguard core library
//!
//! This library provides the resource-spike predictor and responder:
//! - Signature store and fixed-point EMA/RoC predictor
//! - Sampler loop over a pluggable samples provider
//! - Response controller with escalation, cooldowns and restoration
//! - Action sinks (syscalls, dry run) and the daemon runner
//!
//! The binary entry point is in `main.rs`.

pub mod action;
pub mod bounded;
pub mod collect;
pub mod counters;
pub mod daemon;
pub mod exit_codes;
pub mod logging;
pub mod predict;
pub mod ranking;
pub mod response;
pub mod sampler;
pub mod store;

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use counters::{Counters, CountersSnapshot};
pub use predict::{Predictor, Thresholds};
pub use ranking::{Metric, QuerySurface};
pub use response::{ResponseController, ResponsePolicy};
pub use sampler::SamplerLoop;
pub use store::{ProcessSignature, SignatureStore};
