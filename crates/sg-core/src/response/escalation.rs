//! Escalation levels and the per-category response policy.
//!
//! The level is a pure, monotone function of how many consecutive response
//! ticks a process has been flagged. What each level does per category, and
//! how long a category must wait between actions, comes from
//! [`ResponsePolicy`].

use serde::{Deserialize, Serialize};
use sg_common::{ProcessName, SpikeKind};
use sg_config::ResponseSettings;

use crate::action::IoClass;

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

/// Escalation level, ordered from quiet to most aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    #[default]
    None,
    Advisory,
    Soft,
    Hard,
    Critical,
}

impl EscalationLevel {
    /// Level for a run of `consecutive` flagged ticks.
    ///
    /// | consecutive | level    |
    /// |-------------|----------|
    /// | 0           | None     |
    /// | 1-2         | Advisory |
    /// | 3-5         | Soft     |
    /// | 6-10        | Hard     |
    /// | >10         | Critical |
    pub fn for_consecutive(consecutive: u32) -> Self {
        match consecutive {
            0 => EscalationLevel::None,
            1..=2 => EscalationLevel::Advisory,
            3..=5 => EscalationLevel::Soft,
            6..=10 => EscalationLevel::Hard,
            _ => EscalationLevel::Critical,
        }
    }

    /// Whether this level applies actions (beyond logging).
    pub fn is_active(self) -> bool {
        self >= EscalationLevel::Soft
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EscalationLevel::None => "none",
            EscalationLevel::Advisory => "advisory",
            EscalationLevel::Soft => "soft",
            EscalationLevel::Hard => "hard",
            EscalationLevel::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What the controller asks the sink for, per category and level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Log and count only.
    Advise,
    /// Absolute nice target.
    CpuPriority(i32),
    IoPriority { class: IoClass, level: u8 },
    /// Memory alert; `advise` additionally calls the sink.
    Memory { advise: bool },
}

/// Cooldowns and CPU boosts derived from settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePolicy {
    pub cpu_cooldown_secs: u64,
    pub mem_cooldown_secs: u64,
    pub io_cooldown_secs: u64,
    pub soft_boost: i32,
    pub hard_boost: i32,
    pub critical_boost: i32,
    pub priority_floor: i32,
    pub quiet_window_secs: u64,
    pub persistent_interval_secs: u64,
    pub persistent_min_samples: u32,
    pub persistent_freshness_secs: u64,
    /// Lowercased, truncated like [`ProcessName`] so they compare with
    /// what the sampler stores.
    pub protected: Vec<String>,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self::from_settings(&ResponseSettings::default())
    }
}

/// I/O priority level applied when a process is restored.
pub const IO_RESTORE_LEVEL: u8 = 4;

impl ResponsePolicy {
    pub fn from_settings(settings: &ResponseSettings) -> Self {
        Self {
            cpu_cooldown_secs: settings.cpu.cooldown_secs,
            mem_cooldown_secs: settings.mem.cooldown_secs,
            io_cooldown_secs: settings.io.cooldown_secs,
            soft_boost: settings.cpu.soft_boost,
            hard_boost: settings.cpu.hard_boost,
            critical_boost: settings.cpu.critical_boost,
            priority_floor: settings.cpu.priority_floor,
            quiet_window_secs: settings.quiet_window_secs,
            persistent_interval_secs: settings.persistent_interval_secs,
            persistent_min_samples: settings.persistent_min_samples,
            persistent_freshness_secs: settings.persistent_freshness_secs,
            protected: settings
                .protected
                .iter()
                .map(|name| ProcessName::new(name).as_str().to_lowercase())
                .collect(),
        }
    }

    /// Whether the controller must leave `name` alone.
    pub fn is_protected(&self, name: &ProcessName) -> bool {
        let name = name.as_str().to_lowercase();
        self.protected.iter().any(|p| *p == name)
    }

    pub fn cooldown_secs(&self, kind: SpikeKind) -> u64 {
        match kind {
            SpikeKind::Cpu => self.cpu_cooldown_secs,
            SpikeKind::Mem => self.mem_cooldown_secs,
            SpikeKind::Io => self.io_cooldown_secs,
        }
    }

    /// Whether a category last acted at `last_action_at` may act at `now`.
    pub fn cooldown_elapsed(&self, kind: SpikeKind, last_action_at: Option<u64>, now: u64) -> bool {
        match last_action_at {
            Some(last) => now.saturating_sub(last) >= self.cooldown_secs(kind),
            None => true,
        }
    }

    fn boost(&self, level: EscalationLevel) -> i32 {
        match level {
            EscalationLevel::None | EscalationLevel::Advisory => 0,
            EscalationLevel::Soft => self.soft_boost,
            EscalationLevel::Hard => self.hard_boost,
            EscalationLevel::Critical => self.critical_boost,
        }
    }

    /// Absolute CPU priority for `level`, never below the floor.
    pub fn cpu_target(&self, original: i32, level: EscalationLevel) -> i32 {
        original
            .saturating_add(self.boost(level))
            .max(self.priority_floor)
    }

    /// Directive for a flagged category at `level`.
    ///
    /// `None` for levels that do nothing (only `EscalationLevel::None`).
    /// Directives other than [`Directive::Advise`] are cooldown-gated.
    pub fn directive(&self, kind: SpikeKind, level: EscalationLevel, original_priority: i32) -> Option<Directive> {
        match (kind, level) {
            (_, EscalationLevel::None) => None,
            (_, EscalationLevel::Advisory) => Some(Directive::Advise),
            (SpikeKind::Cpu, level) => Some(Directive::CpuPriority(
                self.cpu_target(original_priority, level),
            )),
            (SpikeKind::Mem, EscalationLevel::Soft) => Some(Directive::Advise),
            (SpikeKind::Mem, EscalationLevel::Hard) => Some(Directive::Memory { advise: false }),
            (SpikeKind::Mem, _) => Some(Directive::Memory { advise: true }),
            (SpikeKind::Io, EscalationLevel::Soft) => Some(Directive::IoPriority {
                class: IoClass::BestEffort,
                level: 0,
            }),
            (SpikeKind::Io, _) => Some(Directive::IoPriority {
                class: IoClass::Realtime,
                level: 4,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_boundaries() {
        let cases = [
            (0, EscalationLevel::None),
            (1, EscalationLevel::Advisory),
            (2, EscalationLevel::Advisory),
            (3, EscalationLevel::Soft),
            (5, EscalationLevel::Soft),
            (6, EscalationLevel::Hard),
            (10, EscalationLevel::Hard),
            (11, EscalationLevel::Critical),
            (u32::MAX, EscalationLevel::Critical),
        ];
        for (n, level) in cases {
            assert_eq!(EscalationLevel::for_consecutive(n), level, "n={n}");
        }
    }

    #[test]
    fn levels_are_ordered() {
        assert!(EscalationLevel::Critical > EscalationLevel::Hard);
        assert!(EscalationLevel::Soft.is_active());
        assert!(!EscalationLevel::Advisory.is_active());
    }

    #[test]
    fn cpu_target_respects_floor() {
        let policy = ResponsePolicy::default();
        assert_eq!(policy.cpu_target(0, EscalationLevel::Soft), -5);
        assert_eq!(policy.cpu_target(0, EscalationLevel::Hard), -10);
        assert_eq!(policy.cpu_target(0, EscalationLevel::Critical), -15);
        assert_eq!(policy.cpu_target(-10, EscalationLevel::Critical), -20);
        assert_eq!(policy.cpu_target(10, EscalationLevel::Soft), 5);
    }

    #[test]
    fn directives_per_category() {
        let policy = ResponsePolicy::default();
        assert_eq!(
            policy.directive(SpikeKind::Mem, EscalationLevel::Soft, 0),
            Some(Directive::Advise)
        );
        assert_eq!(
            policy.directive(SpikeKind::Mem, EscalationLevel::Critical, 0),
            Some(Directive::Memory { advise: true })
        );
        assert_eq!(
            policy.directive(SpikeKind::Io, EscalationLevel::Soft, 0),
            Some(Directive::IoPriority {
                class: IoClass::BestEffort,
                level: 0
            })
        );
        assert_eq!(
            policy.directive(SpikeKind::Io, EscalationLevel::Hard, 0),
            Some(Directive::IoPriority {
                class: IoClass::Realtime,
                level: 4
            })
        );
        assert_eq!(policy.directive(SpikeKind::Cpu, EscalationLevel::None, 0), None);
    }

    #[test]
    fn protected_names_match_case_insensitively() {
        let mut settings = ResponseSettings::default();
        settings.protected = vec!["Postgres".into(), "a-very-long-daemon-name".into()];
        let policy = ResponsePolicy::from_settings(&settings);
        assert!(policy.is_protected(&ProcessName::new("postgres")));
        // Names longer than a stored name still match the truncated form.
        assert!(policy.is_protected(&ProcessName::new("a-very-long-daemon-name")));
        assert!(!policy.is_protected(&ProcessName::new("postgres-worker")));
        assert!(!policy.is_protected(&ProcessName::new("sshd")));
    }

    #[test]
    fn cooldown_boundary() {
        let policy = ResponsePolicy::default();
        assert!(policy.cooldown_elapsed(SpikeKind::Cpu, None, 0));
        assert!(!policy.cooldown_elapsed(SpikeKind::Cpu, Some(100), 109));
        assert!(policy.cooldown_elapsed(SpikeKind::Cpu, Some(100), 110));
        assert!(!policy.cooldown_elapsed(SpikeKind::Mem, Some(100), 114));
    }
}
