//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Capped forecasts stay inside ±cap for any forecast level and scalar
//! 2. Weight normalization always sums to 1 and preserves proportions
//! 3. The diversification multiplier stays inside its clamp band
//! 4. Series clipping is idempotent and bounded

use proptest::prelude::*;
use quantsys_core::config::Config;
use quantsys_core::data::InMemoryProvider;
use quantsys_core::domain::{SeriesError, TimeSeries};
use quantsys_core::estimate;
use quantsys_core::rules::{ForecastFn, TradingRule};
use quantsys_core::stages::{ForecastScaleCapFixed, Rules};
use quantsys_core::system::System;
use chrono::NaiveDate;
use std::sync::Arc;

struct ConstantForecast(f64);

impl ForecastFn for ConstantForecast {
    fn rule_type(&self) -> &'static str {
        "constant"
    }

    fn forecast(&self, prices: &TimeSeries) -> Result<TimeSeries, SeriesError> {
        Ok(prices.map(|_| self.0))
    }
}

fn provider() -> Arc<InMemoryProvider> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let values: Vec<f64> = (0..40).map(|i| 100.0 + (i % 3) as f64).collect();
    Arc::new(InMemoryProvider::new().add(
        "X",
        TimeSeries::daily_from(start, &values),
        "USD",
        10.0,
    ))
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_forecast_level() -> impl Strategy<Value = f64> {
    -100.0..100.0_f64
}

fn arb_scalar() -> impl Strategy<Value = f64> {
    0.01..50.0_f64
}

fn arb_weights() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.01..10.0_f64, 2..6)
}

// ── 1. Cap is absolute ───────────────────────────────────────────────

proptest! {
    /// Whatever the raw level and configured scalar, the capped forecast
    /// never leaves the ±cap band.
    #[test]
    fn capped_forecast_is_bounded(level in arb_forecast_level(), scalar in arb_scalar()) {
        let mut config = Config::default();
        config.forecast_scalars = Some([("const".to_string(), scalar)].into_iter().collect());
        let cap = config.forecast_cap_or_default();

        let sys = System::new(
            vec![
                Box::new(Rules::new(vec![TradingRule::new(
                    "const",
                    Box::new(ConstantForecast(level)),
                )])),
                Box::new(ForecastScaleCapFixed),
            ],
            provider(),
            config,
        )
        .unwrap();

        let capped = sys.capped_forecast(&"X".into(), &"const".into()).unwrap();
        for v in capped.values() {
            prop_assert!((-cap..=cap).contains(&v), "value {v} outside ±{cap}");
        }
    }
}

// ── 2. Weight normalization ──────────────────────────────────────────

proptest! {
    #[test]
    fn normalized_weights_sum_to_one(mut weights in arb_weights()) {
        let original = weights.clone();
        estimate::normalize_weights(&mut weights).unwrap();

        let total: f64 = weights.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);

        // Proportions between any two weights are preserved.
        let ratio_before = original[0] / original[1];
        let ratio_after = weights[0] / weights[1];
        prop_assert!((ratio_before - ratio_after).abs() < 1e-6 * ratio_before.abs().max(1.0));
    }
}

// ── 3. Diversification multiplier clamp ──────────────────────────────

proptest! {
    /// For any equal-weight portfolio and any uniform pairwise correlation,
    /// the multiplier stays inside [1.0, 2.5].
    #[test]
    fn div_multiplier_is_clamped(n in 2..6usize, rho in -0.5..1.0_f64) {
        let weights = vec![1.0 / n as f64; n];
        let corr: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { rho }).collect())
            .collect();

        let m = estimate::div_multiplier(&weights, &corr).unwrap();
        prop_assert!(
            (estimate::DIV_MULTIPLIER_MIN..=estimate::DIV_MULTIPLIER_MAX).contains(&m),
            "multiplier {m} outside clamp band"
        );
    }
}

// ── 4. Clipping ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn clip_is_idempotent_and_bounded(
        values in prop::collection::vec(-1000.0..1000.0_f64, 1..50),
        bound in 0.1..100.0_f64,
    ) {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let series = TimeSeries::daily_from(start, &values);

        let once = series.clip(bound);
        let twice = once.clip(bound);
        prop_assert_eq!(once.points(), twice.points());
        for v in once.values() {
            prop_assert!((-bound..=bound).contains(&v));
        }
    }
}
