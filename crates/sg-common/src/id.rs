//! Process identity types.
//!
//! A tracked process is keyed by its pid. The display name is kept short and
//! truncated to a fixed length so signatures stay small and cheap to copy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length (in bytes) of a stored process name.
pub const MAX_NAME_LEN: usize = 16;

/// Process ID wrapper with display formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        ProcessId(pid)
    }
}

/// Short display name for a process, truncated to [`MAX_NAME_LEN`] bytes.
///
/// Truncation always lands on a char boundary, so names taken from
/// `/proc/<pid>/comm` or any UTF-8 source never split a code point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessName(String);

impl ProcessName {
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        if name.len() <= MAX_NAME_LEN {
            return ProcessName(name.to_string());
        }
        let mut end = MAX_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        ProcessName(name[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessName {
    fn from(name: &str) -> Self {
        ProcessName::new(name)
    }
}
