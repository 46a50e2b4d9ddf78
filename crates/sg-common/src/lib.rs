//! spikeguard common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the spikeguard crates:
//! - Process identity types (pid, truncated display name)
//! - Spike categories and the per-tick flag set
//! - The raw sample shape consumed from samples providers
//! - Common error types with stable codes

pub mod error;
pub mod id;
pub mod sample;
pub mod spike;

pub use error::{Error, ErrorCategory, Result};
pub use id::{ProcessId, ProcessName, MAX_NAME_LEN};
pub use sample::{RawSample, FIXED_POINT_SCALE};
pub use spike::{SpikeFlags, SpikeKind};
