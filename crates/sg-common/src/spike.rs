//! Spike categories and the per-tick prediction flag set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource category a spike is predicted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeKind {
    Cpu,
    Mem,
    Io,
}

impl SpikeKind {
    /// All categories in evaluation order.
    pub const ALL: [SpikeKind; 3] = [SpikeKind::Cpu, SpikeKind::Mem, SpikeKind::Io];

    /// Dense index for per-category arrays.
    pub fn index(self) -> usize {
        match self {
            SpikeKind::Cpu => 0,
            SpikeKind::Mem => 1,
            SpikeKind::Io => 2,
        }
    }

    fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for SpikeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpikeKind::Cpu => write!(f, "cpu"),
            SpikeKind::Mem => write!(f, "mem"),
            SpikeKind::Io => write!(f, "io"),
        }
    }
}

/// Set of spike categories, stored as a bitmask (CPU=1, MEM=2, IO=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpikeFlags(u8);

impl SpikeFlags {
    pub const NONE: SpikeFlags = SpikeFlags(0);

    pub fn from_bits(bits: u8) -> Self {
        SpikeFlags(bits & 0b111)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, kind: SpikeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn set(&mut self, kind: SpikeKind, on: bool) {
        if on {
            self.0 |= kind.bit();
        } else {
            self.0 &= !kind.bit();
        }
    }

    pub fn with(mut self, kind: SpikeKind) -> Self {
        self.set(kind, true);
        self
    }

    pub fn union(self, other: SpikeFlags) -> Self {
        SpikeFlags(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Categories present in the set, in [`SpikeKind::ALL`] order.
    pub fn iter(self) -> impl Iterator<Item = SpikeKind> {
        SpikeKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<SpikeKind> for SpikeFlags {
    fn from_iter<I: IntoIterator<Item = SpikeKind>>(iter: I) -> Self {
        iter.into_iter().fold(SpikeFlags::NONE, SpikeFlags::with)
    }
}

impl fmt::Display for SpikeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        let parts: Vec<String> = self.iter().map(|k| k.to_string()).collect();
        write!(f, "{}", parts.join("+"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear() {
        let mut flags = SpikeFlags::NONE;
        flags.set(SpikeKind::Mem, true);
        assert!(flags.contains(SpikeKind::Mem));
        assert!(!flags.contains(SpikeKind::Cpu));
        assert_eq!(flags.bits(), 0b010);
        flags.set(SpikeKind::Mem, false);
        assert!(flags.is_empty());
    }

    #[test]
    fn union_and_iter_order() {
        let a = SpikeFlags::NONE.with(SpikeKind::Io);
        let b = SpikeFlags::NONE.with(SpikeKind::Cpu);
        let kinds: Vec<_> = a.union(b).iter().collect();
        assert_eq!(kinds, vec![SpikeKind::Cpu, SpikeKind::Io]);
    }

    #[test]
    fn from_bits_masks_unknown_bits() {
        assert_eq!(SpikeFlags::from_bits(0xff).bits(), 0b111);
    }

    #[test]
    fn display() {
        assert_eq!(SpikeFlags::NONE.to_string(), "-");
        let flags: SpikeFlags = [SpikeKind::Cpu, SpikeKind::Io].into_iter().collect();
        assert_eq!(flags.to_string(), "cpu+io");
    }

    #[test]
    fn kind_serialization() {
        assert_eq!(serde_json::to_string(&SpikeKind::Mem).unwrap(), "\"mem\"");
    }
}
