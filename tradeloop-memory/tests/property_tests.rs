//! Property tests for memory invariants.
//!
//! Uses proptest to verify:
//! 1. Correctness — BUY and SELL are mirror images; HOLD is symmetric in the return
//! 2. Proposals — every confidence scale lies in [floor, 1]
//! 3. Composition — order-independent, never raises a scale, suppression is sticky
//! 4. Review — rejected is final; applied can only be withdrawn

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tradeloop_core::domain::Signal;
use tradeloop_memory::adjustments::AdjustmentPayload;
use tradeloop_memory::journal::is_correct;
use tradeloop_memory::{
    AdjustmentConfig, AdjustmentGenerator, AdjustmentStatus, Pattern, PatternCondition,
    PatternStatus, ReflectionConfig, SignalAdjustment,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_return() -> impl Strategy<Value = f64> {
    -0.5..0.5_f64
}

fn arb_adjustment() -> impl Strategy<Value = SignalAdjustment> {
    (0.1..=1.0_f64, any::<bool>()).prop_map(|(confidence_scale, suppress)| SignalAdjustment {
        confidence_scale,
        suppress,
    })
}

fn arb_status() -> impl Strategy<Value = AdjustmentStatus> {
    prop_oneof![
        Just(AdjustmentStatus::Proposed),
        Just(AdjustmentStatus::Approved),
        Just(AdjustmentStatus::Applied),
        Just(AdjustmentStatus::Rejected),
    ]
}

fn pattern(win_rate: f64, avg_return: f64, sample_count: usize) -> Pattern {
    Pattern {
        id: 1,
        name: "BUY_baseline".into(),
        condition: PatternCondition {
            signal: Some(Signal::Buy),
            ..Default::default()
        },
        signal_type: Some(Signal::Buy),
        win_rate,
        avg_return,
        sample_count,
        status: PatternStatus::Active,
        discovered_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

// ── Correctness ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn buy_and_sell_mirror(r in arb_return()) {
        prop_assume!(r != 0.0);
        prop_assert_eq!(is_correct(Signal::Buy, r, 0.03), is_correct(Signal::Sell, -r, 0.03));
        prop_assert_ne!(is_correct(Signal::Buy, r, 0.03), is_correct(Signal::Sell, r, 0.03));
    }

    #[test]
    fn hold_is_symmetric(r in arb_return(), band in 0.001..0.1_f64) {
        prop_assert_eq!(is_correct(Signal::Hold, r, band), is_correct(Signal::Hold, -r, band));
    }
}

// ── Proposals ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn proposed_scale_within_bounds(
        win_rate in 0.0..=1.0_f64,
        avg_return in arb_return(),
        samples in 0usize..200,
    ) {
        let config = AdjustmentConfig::default();
        let generator = AdjustmentGenerator::new(&config, &ReflectionConfig::default());
        for (payload, reason) in generator.propose(&pattern(win_rate, avg_return, samples)) {
            prop_assert!(!reason.is_empty());
            if let AdjustmentPayload::ConfidenceScale { scale } = payload {
                prop_assert!(scale >= config.scale_floor && scale <= 1.0);
                prop_assert!(win_rate < config.win_rate_threshold);
            }
        }
    }
}

// ── Composition ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn compose_is_commutative(a in arb_adjustment(), b in arb_adjustment()) {
        prop_assert_eq!(a.compose(b), b.compose(a));
    }

    #[test]
    fn compose_never_loosens(a in arb_adjustment(), b in arb_adjustment()) {
        let c = a.compose(b);
        prop_assert!(c.confidence_scale <= a.confidence_scale);
        prop_assert!(c.confidence_scale <= b.confidence_scale);
        prop_assert_eq!(c.suppress, a.suppress || b.suppress);
    }

    #[test]
    fn default_is_identity(a in arb_adjustment()) {
        prop_assert_eq!(a.compose(SignalAdjustment::default()), a);
    }
}

// ── Review ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn rejected_is_final(to in arb_status()) {
        prop_assert!(!AdjustmentStatus::Rejected.can_transition_to(to));
    }

    #[test]
    fn applied_can_only_be_withdrawn(to in arb_status()) {
        prop_assert_eq!(
            AdjustmentStatus::Applied.can_transition_to(to),
            to == AdjustmentStatus::Rejected
        );
    }

    #[test]
    fn no_self_transitions(status in arb_status()) {
        prop_assert!(!status.can_transition_to(status));
    }
}
