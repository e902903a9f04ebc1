//! Performance statistics — pure functions over P&L series.
//!
//! Everything here is series-in, scalar-out, with no dependency on the
//! orchestrator or stages.

use crate::domain::TimeSeries;
use serde::{Deserialize, Serialize};

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Square root of [`TRADING_DAYS_PER_YEAR`], for daily → annual vol scaling.
pub fn root_trading_days() -> f64 {
    TRADING_DAYS_PER_YEAR.sqrt()
}

/// Summary statistics for a daily P&L series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveStats {
    /// Annualized mean daily P&L.
    pub ann_mean: f64,
    /// Annualized standard deviation of daily P&L.
    pub ann_std: f64,
    /// ann_mean / ann_std; 0.0 when the curve has no variance.
    pub sharpe: f64,
    /// Largest peak-to-trough fall of the cumulative curve (>= 0).
    pub max_drawdown: f64,
}

impl CurveStats {
    /// Compute all statistics from a daily P&L series.
    pub fn compute(daily_pnl: &TimeSeries) -> Self {
        Self {
            ann_mean: ann_mean(daily_pnl),
            ann_std: ann_std(daily_pnl),
            sharpe: sharpe(daily_pnl),
            max_drawdown: max_drawdown(daily_pnl),
        }
    }
}

/// Annualized mean of daily values.
pub fn ann_mean(daily: &TimeSeries) -> f64 {
    match daily.mean() {
        Ok(m) => m * TRADING_DAYS_PER_YEAR,
        Err(_) => 0.0,
    }
}

/// Annualized standard deviation of daily values.
pub fn ann_std(daily: &TimeSeries) -> f64 {
    daily.std_dev() * root_trading_days()
}

/// Annualized Sharpe-like ratio. Zero when variance is zero.
pub fn sharpe(daily: &TimeSeries) -> f64 {
    let std = ann_std(daily);
    if std < 1e-15 {
        return 0.0;
    }
    ann_mean(daily) / std
}

/// Max peak-to-trough decline of the cumulative sum of `daily`.
pub fn max_drawdown(daily: &TimeSeries) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    let cumulative = daily.cumsum();
    for v in cumulative.values() {
        peak = peak.max(v);
        worst = worst.max(peak - v);
    }
    worst
}

/// Pearson correlation of two equal-length slices. `None` when either side
/// has zero variance or fewer than 2 points.
pub fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a < 1e-15 || var_b < 1e-15 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn constant_pnl_has_zero_sharpe_and_drawdown() {
        let pnl = TimeSeries::daily_from(start(), &[10.0; 100]);
        let stats = CurveStats::compute(&pnl);
        assert_eq!(stats.sharpe, 0.0);
        assert_eq!(stats.max_drawdown, 0.0);
        assert!((stats.ann_mean - 2520.0).abs() < 1e-9);
    }

    #[test]
    fn drawdown_measures_peak_to_trough() {
        // Cumulative: 10, 20, 5, 15 → worst fall is 20 - 5 = 15.
        let pnl = TimeSeries::daily_from(start(), &[10.0, 10.0, -15.0, 10.0]);
        assert_eq!(max_drawdown(&pnl), 15.0);
    }

    #[test]
    fn monotone_gains_have_no_drawdown() {
        let pnl = TimeSeries::daily_from(start(), &[1.0, 2.0, 3.0]);
        assert_eq!(max_drawdown(&pnl), 0.0);
    }

    #[test]
    fn correlation_of_identical_is_one() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let c = correlation(&xs, &xs).unwrap();
        assert!((c - 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_of_opposite_is_minus_one() {
        let xs = [1.0, 2.0, 3.0];
        let ys = [3.0, 2.0, 1.0];
        let c = correlation(&xs, &ys).unwrap();
        assert!((c + 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_degenerate_is_none() {
        assert_eq!(correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(correlation(&[1.0], &[2.0]), None);
    }
}
