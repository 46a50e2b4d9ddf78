//! Fixed-point EMA smoothing and spike prediction.
//!
//! All values use the shared x100 fixed-point scale. For every resource:
//!
//! ```text
//! ema_new = (alpha * sample + (100 - alpha) * ema_old) / 100
//! roc     = ema_new - ema_old
//! spike   = roc > threshold
//! ```
//!
//! Division truncates toward zero. The function is pure; callers own the
//! previous EMA and decide what to do with the flags.

use serde::{Deserialize, Serialize};
use sg_common::{RawSample, SpikeFlags, SpikeKind, FIXED_POINT_SCALE};
use sg_config::PredictorSettings;

/// Default EMA weight of a new sample, out of 100.
pub const DEFAULT_ALPHA: i64 = 30;

/// Spike thresholds on the rate of change (fixed-point, strict `>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu: i64,
    pub mem: i64,
    pub io: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: 2000,
            mem: 1500,
            io: 1000,
        }
    }
}

impl Thresholds {
    pub fn for_kind(&self, kind: SpikeKind) -> i64 {
        match kind {
            SpikeKind::Cpu => self.cpu,
            SpikeKind::Mem => self.mem,
            SpikeKind::Io => self.io,
        }
    }
}

/// Smoothed state of one resource channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Current EMA.
    pub ema: i64,
    /// EMA from the previous tick.
    pub prev: i64,
    /// `ema - prev`.
    pub roc: i64,
}

/// Result of one prediction step for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub cpu: Channel,
    pub mem: Channel,
    pub io: Channel,
    pub flags: SpikeFlags,
}

impl Prediction {
    pub fn channel(&self, kind: SpikeKind) -> &Channel {
        match kind {
            SpikeKind::Cpu => &self.cpu,
            SpikeKind::Mem => &self.mem,
            SpikeKind::Io => &self.io,
        }
    }
}

/// Previous EMAs a prediction starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorEmas {
    pub cpu: i64,
    pub mem: i64,
    pub io: i64,
}

/// Pure EMA/RoC/spike evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predictor {
    alpha: i64,
    thresholds: Thresholds,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA, Thresholds::default())
    }
}

impl Predictor {
    /// `alpha` is clamped into `[1, 100]`.
    pub fn new(alpha: i64, thresholds: Thresholds) -> Self {
        Self {
            alpha: alpha.clamp(1, FIXED_POINT_SCALE),
            thresholds,
        }
    }

    pub fn from_settings(settings: &PredictorSettings) -> Self {
        Self::new(
            settings.alpha,
            Thresholds {
                cpu: settings.cpu_threshold,
                mem: settings.mem_threshold,
                io: settings.io_threshold,
            },
        )
    }

    pub fn alpha(&self) -> i64 {
        self.alpha
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// One EMA step.
    pub fn smooth(&self, ema_old: i64, sample: i64) -> i64 {
        // Widen so extreme readings cannot overflow; the result always lies
        // between `ema_old` and `sample` and therefore fits back into i64.
        let weighted = i128::from(self.alpha) * i128::from(sample)
            + i128::from(FIXED_POINT_SCALE - self.alpha) * i128::from(ema_old);
        (weighted / i128::from(FIXED_POINT_SCALE)) as i64
    }

    fn step(&self, ema_old: i64, sample: i64) -> Channel {
        let ema = self.smooth(ema_old, sample);
        Channel {
            ema,
            prev: ema_old,
            roc: ema.saturating_sub(ema_old),
        }
    }

    /// Evaluate one sample against the previous EMAs.
    pub fn predict(&self, prior: PriorEmas, sample: &RawSample) -> Prediction {
        let cpu = self.step(prior.cpu, sample.cpu_raw);
        let mem = self.step(prior.mem, sample.mem_raw);
        let io = self.step(prior.io, sample.io_raw);

        let mut flags = SpikeFlags::NONE;
        flags.set(SpikeKind::Cpu, cpu.roc > self.thresholds.cpu);
        flags.set(SpikeKind::Mem, mem.roc > self.thresholds.mem);
        flags.set(SpikeKind::Io, io.roc > self.thresholds.io);

        Prediction {
            cpu,
            mem,
            io,
            flags,
        }
    }
}
