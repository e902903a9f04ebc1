//! Statistical estimation procedures used by the "estimated" stage variants.
//!
//! Estimation failures are reported as `EstimationError` rather than quietly
//! substituting a default, so a caller can decide to fall back to the fixed
//! variant instead.

use crate::domain::TimeSeries;
use crate::stats::correlation;
use thiserror::Error;

/// Minimum observations before any estimate is trusted.
pub const MIN_PERIODS: usize = 10;

/// Bounds on estimated diversification multipliers.
pub const DIV_MULTIPLIER_MIN: f64 = 1.0;
pub const DIV_MULTIPLIER_MAX: f64 = 2.5;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EstimationError {
    #[error("insufficient history: {have} observations, need at least {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("degenerate statistics: {0}")]
    Degenerate(String),
}

/// Forecast scalar: ratio of the target average absolute forecast to the
/// realized average absolute magnitude of the raw forecast.
pub fn forecast_scalar(raw: &TimeSeries, target_abs: f64) -> Result<f64, EstimationError> {
    if raw.len() < MIN_PERIODS {
        return Err(EstimationError::InsufficientHistory {
            have: raw.len(),
            need: MIN_PERIODS,
        });
    }
    let realized = raw
        .abs_mean()
        .map_err(|e| EstimationError::Degenerate(e.to_string()))?;
    if realized < 1e-12 {
        return Err(EstimationError::Degenerate(
            "raw forecast has zero average magnitude".into(),
        ));
    }
    Ok(target_abs / realized)
}

/// Aligned value matrix for a set of series: inner join on the dates common
/// to all of them. Returns one column (Vec) per input series.
pub fn aligned_columns(series: &[&TimeSeries]) -> Result<Vec<Vec<f64>>, EstimationError> {
    if series.is_empty() {
        return Err(EstimationError::Degenerate("no series to align".into()));
    }
    let mut common: Vec<chrono::NaiveDate> = series[0].dates().collect();
    for s in &series[1..] {
        let dates: std::collections::BTreeSet<chrono::NaiveDate> = s.dates().collect();
        common.retain(|d| dates.contains(d));
    }
    if common.len() < MIN_PERIODS {
        return Err(EstimationError::InsufficientHistory {
            have: common.len(),
            need: MIN_PERIODS,
        });
    }
    Ok(series
        .iter()
        .map(|s| {
            common
                .iter()
                .map(|&d| s.get(d).expect("date retained from this series"))
                .collect()
        })
        .collect())
}

/// Pairwise correlation matrix of aligned columns, with diagonal 1 and
/// degenerate pairs treated as uncorrelated.
pub fn correlation_matrix(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = columns.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let c = correlation(&columns[i], &columns[j]).unwrap_or(0.0);
            matrix[i][j] = c;
            matrix[j][i] = c;
        }
    }
    matrix
}

/// Diversification multiplier: 1 / sqrt(wᵀ C w), with negative off-diagonal
/// correlations floored at zero and the result clamped to
/// [[`DIV_MULTIPLIER_MIN`], [`DIV_MULTIPLIER_MAX`]].
pub fn div_multiplier(weights: &[f64], corr: &[Vec<f64>]) -> Result<f64, EstimationError> {
    let n = weights.len();
    if n == 0 || corr.len() != n {
        return Err(EstimationError::Degenerate(
            "weight and correlation dimensions disagree".into(),
        ));
    }
    let mut variance = 0.0;
    for i in 0..n {
        for j in 0..n {
            let c = if i == j { 1.0 } else { corr[i][j].max(0.0) };
            variance += weights[i] * weights[j] * c;
        }
    }
    if variance <= 0.0 {
        return Err(EstimationError::Degenerate(
            "non-positive portfolio variance".into(),
        ));
    }
    Ok((1.0 / variance.sqrt()).clamp(DIV_MULTIPLIER_MIN, DIV_MULTIPLIER_MAX))
}

/// Normalize weights to sum to 1. Errors when the total is not positive.
pub fn normalize_weights(weights: &mut [f64]) -> Result<(), EstimationError> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(EstimationError::Degenerate(
            "weights sum to zero or less".into(),
        ));
    }
    for w in weights.iter_mut() {
        *w /= total;
    }
    Ok(())
}
