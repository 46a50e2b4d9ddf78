//! Property tests for the fixed-point predictor.

use proptest::prelude::*;
use sg_common::{RawSample, SpikeKind};
use sg_core::predict::{Predictor, PriorEmas, Thresholds};

fn sample(cpu: i64, mem: i64, io: i64) -> RawSample {
    RawSample::new(1, "p", cpu, mem, io)
}

proptest! {
    #[test]
    fn repeated_sample_converges_and_settles(
        alpha in 1i64..=100,
        start in 0i64..=10_000,
        target in 0i64..=10_000,
    ) {
        let predictor = Predictor::new(alpha, Thresholds::default());
        let mut prior = PriorEmas { cpu: start, mem: 0, io: 0 };
        let mut distance = (target - start).abs();
        let mut settled = false;

        for _ in 0..=10_001 {
            let p = predictor.predict(prior, &sample(target, 0, 0));
            let next = (target - p.cpu.ema).abs();
            prop_assert!(next <= distance, "moved away: {} -> {}", distance, next);
            distance = next;
            prior.cpu = p.cpu.ema;
            if p.cpu.roc == 0 {
                settled = true;
                break;
            }
        }
        prop_assert!(settled);

        // A settled EMA stays put.
        let again = predictor.predict(prior, &sample(target, 0, 0));
        prop_assert_eq!(again.cpu.roc, 0);
        prop_assert!(again.flags.is_empty());
    }

    #[test]
    fn ema_stays_between_prior_and_sample(
        alpha in 1i64..=100,
        ema in -1_000_000i64..=1_000_000,
        s in -1_000_000i64..=1_000_000,
    ) {
        let predictor = Predictor::new(alpha, Thresholds::default());
        let next = predictor.smooth(ema, s);
        prop_assert!(next >= ema.min(s) - 1 && next <= ema.max(s) + 1);
    }

    #[test]
    fn flags_follow_only_the_current_step(
        cpu in 0i64..=10_000,
        mem in 0i64..=10_000,
        io in 0i64..=10_000,
    ) {
        // alpha 100: roc is exactly the jump from the prior EMA.
        let predictor = Predictor::new(100, Thresholds::default());
        let spiked = predictor.predict(PriorEmas::default(), &sample(cpu, mem, io));
        prop_assert_eq!(spiked.flags.contains(SpikeKind::Cpu), cpu > 2000);
        prop_assert_eq!(spiked.flags.contains(SpikeKind::Mem), mem > 1500);
        prop_assert_eq!(spiked.flags.contains(SpikeKind::Io), io > 1000);

        let prior = PriorEmas { cpu: spiked.cpu.ema, mem: spiked.mem.ema, io: spiked.io.ema };
        let steady = predictor.predict(prior, &sample(cpu, mem, io));
        prop_assert!(steady.flags.is_empty());
    }
}

#[test]
fn thresholds_are_strict_per_category() {
    let predictor = Predictor::new(100, Thresholds::default());
    let at = predictor.predict(PriorEmas::default(), &sample(2000, 1500, 1000));
    assert!(at.flags.is_empty());
    let above = predictor.predict(PriorEmas::default(), &sample(2001, 1501, 1001));
    assert!(above.flags.contains(SpikeKind::Cpu));
    assert!(above.flags.contains(SpikeKind::Mem));
    assert!(above.flags.contains(SpikeKind::Io));
}

#[test]
fn falling_load_never_flags() {
    let predictor = Predictor::default();
    let prior = PriorEmas {
        cpu: 9000,
        mem: 9000,
        io: 9000,
    };
    let p = predictor.predict(prior, &sample(0, 0, 0));
    assert!(p.cpu.roc < 0);
    assert!(p.flags.is_empty());
}
