//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Window count — a series of length L yields max(0, L − seq_len − forward_days + 1) windows
//! 2. Label ordering — labels are monotone in the forward return
//! 3. Normalization — normalize then denormalize reconstructs the input
//! 4. Fitted stats — normalized training rows have mean ≈ 0 per dimension

use chrono::NaiveDate;
use proptest::prelude::*;
use tradeloop_core::domain::Label;
use tradeloop_core::features::{FeatureRow, FEATURE_DIM};
use tradeloop_core::normalize::NormStats;
use tradeloop_core::window::{Window, Windower};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((1.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0), 0..max_len)
}

fn arb_row() -> impl Strategy<Value = FeatureRow> {
    prop::collection::vec(-1_000.0..1_000.0_f64, FEATURE_DIM).prop_map(|v| {
        let mut row = [0.0; FEATURE_DIM];
        row.copy_from_slice(&v);
        row
    })
}

fn arb_windows() -> impl Strategy<Value = Vec<Window>> {
    prop::collection::vec(prop::collection::vec(arb_row(), 1..6), 1..8)
}

fn fixture(len: usize) -> (Vec<FeatureRow>, Vec<NaiveDate>) {
    let base = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let rows = (0..len).map(|i| [i as f64; FEATURE_DIM]).collect();
    let dates = (0..len).map(|i| base + chrono::Duration::days(i as i64)).collect();
    (rows, dates)
}

// ── 1. Window Count ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn window_count_matches_formula(
        closes in arb_closes(80),
        seq_len in 1usize..30,
        forward_days in 1usize..10,
    ) {
        let windower = Windower { seq_len, forward_days, buy_threshold: 0.02, sell_threshold: -0.02 };
        let (rows, dates) = fixture(closes.len());
        let out = windower.label(&rows, &closes, &dates);

        let expected = (closes.len() + 1).saturating_sub(seq_len + forward_days);
        prop_assert_eq!(out.len(), expected);
        prop_assert_eq!(out.labels.len(), expected);
        prop_assert!(out.windows.iter().all(|w| w.len() == seq_len));
    }

    /// Every window ends strictly before the close that labels it.
    #[test]
    fn window_never_contains_its_label_day(
        closes in arb_closes(60),
        seq_len in 1usize..10,
        forward_days in 1usize..5,
    ) {
        let windower = Windower { seq_len, forward_days, buy_threshold: 0.02, sell_threshold: -0.02 };
        let (rows, dates) = fixture(closes.len());
        let out = windower.label(&rows, &closes, &dates);
        for (i, window) in out.windows.iter().enumerate() {
            let last = window.last().unwrap()[0] as usize;
            prop_assert_eq!(last, i + seq_len - 1);
            prop_assert_eq!(out.window_dates[i], dates[last]);
            let expected = (closes[last + forward_days] - closes[last]) / closes[last];
            prop_assert!((out.forward_returns[i] - expected).abs() < 1e-12);
        }
    }
}

// ── 2. Label Ordering ────────────────────────────────────────────────

proptest! {
    #[test]
    fn labels_are_monotone_in_return(a in -0.5..0.5_f64, b in -0.5..0.5_f64) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let la = Label::from_forward_return(lo, 0.02, -0.02);
        let lb = Label::from_forward_return(hi, 0.02, -0.02);
        prop_assert!(la.as_index() <= lb.as_index());
    }
}

// ── 3. Normalization Roundtrip ───────────────────────────────────────

proptest! {
    #[test]
    fn normalize_roundtrip(windows in arb_windows()) {
        let stats = NormStats::compute(&windows);
        prop_assert!(stats.validate().is_ok());
        for window in &windows {
            let back = stats.denormalize_window(&stats.normalize_window(window));
            for (a, b) in back.iter().flatten().zip(window.iter().flatten()) {
                prop_assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
            }
        }
    }

    // ── 4. Fitted Stats ──────────────────────────────────────────────

    #[test]
    fn normalized_training_rows_are_centered(windows in arb_windows()) {
        let stats = NormStats::compute(&windows);
        let normalized: Vec<Window> = windows.iter().map(|w| stats.normalize_window(w)).collect();
        let n = normalized.iter().map(|w| w.len()).sum::<usize>() as f64;
        for dim in 0..FEATURE_DIM {
            let mean = normalized.iter().flatten().map(|r| r[dim]).sum::<f64>() / n;
            prop_assert!(mean.abs() < 1e-6, "dim {} mean {}", dim, mean);
        }
    }
}
