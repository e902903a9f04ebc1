//! Dated value series — the uniform currency of the pipeline.
//!
//! Prices, forecasts, scalars-over-time, positions, and P&L all travel as
//! `TimeSeries`: an immutable sequence of `(date, value)` pairs with strictly
//! increasing dates, enforced at construction. Derived series are always new
//! allocations; nothing mutates in place.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from series construction and combination.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SeriesError {
    #[error("dates must be strictly increasing (violation at index {index})")]
    NonMonotonicDates { index: usize },

    #[error("series is empty")]
    Empty,

    #[error("series share no dates")]
    DisjointDates,
}

/// An ordered sequence of (date, value) pairs, strictly increasing in date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    points: Vec<(NaiveDate, f64)>,
}

impl TimeSeries {
    /// Build a series, validating that dates strictly increase.
    pub fn new(points: Vec<(NaiveDate, f64)>) -> Result<Self, SeriesError> {
        for (i, pair) in points.windows(2).enumerate() {
            if pair[1].0 <= pair[0].0 {
                return Err(SeriesError::NonMonotonicDates { index: i + 1 });
            }
        }
        Ok(Self { points })
    }

    /// Build a daily series starting at `start`, one value per calendar day.
    ///
    /// Convenient for tests and synthetic data; real providers carry their
    /// own (gappy) calendars.
    pub fn daily_from(start: NaiveDate, values: &[f64]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| (start + chrono::Duration::days(i as i64), v))
            .collect();
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|&(_, v)| v)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|&(d, _)| d)
    }

    /// Value at an exact date, if present.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |&(d, _)| d)
            .ok()
            .map(|i| self.points[i].1)
    }

    pub fn first(&self) -> Option<(NaiveDate, f64)> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        self.points.last().copied()
    }

    /// The final `n` points (or all of them, if shorter).
    pub fn tail(&self, n: usize) -> &[(NaiveDate, f64)] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }

    /// Elementwise transform, preserving dates.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> TimeSeries {
        TimeSeries {
            points: self.points.iter().map(|&(d, v)| (d, f(v))).collect(),
        }
    }

    /// Clip values to the symmetric band [-bound, bound].
    pub fn clip(&self, bound: f64) -> TimeSeries {
        self.map(|v| v.clamp(-bound, bound))
    }

    /// First differences: value[t] - value[t-1], dated at t. One point shorter.
    pub fn diff(&self) -> TimeSeries {
        TimeSeries {
            points: self
                .points
                .windows(2)
                .map(|w| (w[1].0, w[1].1 - w[0].1))
                .collect(),
        }
    }

    /// Shift values forward by one observation: the value dated t becomes the
    /// value that was dated t-1. The first point is dropped.
    ///
    /// Used for trading lags: today's P&L accrues to yesterday's position.
    pub fn lag(&self) -> TimeSeries {
        TimeSeries {
            points: self
                .points
                .windows(2)
                .map(|w| (w[1].0, w[0].1))
                .collect(),
        }
    }

    /// Exponentially weighted moving average with the given span.
    ///
    /// alpha = 2 / (span + 1), seeded with the first value (pandas
    /// `ewm(span=..., adjust=False)` convention).
    pub fn ewma(&self, span: usize) -> TimeSeries {
        let alpha = 2.0 / (span as f64 + 1.0);
        let mut prev = f64::NAN;
        let points = self
            .points
            .iter()
            .enumerate()
            .map(|(i, &(d, v))| {
                let e = if i == 0 { v } else { alpha * v + (1.0 - alpha) * prev };
                prev = e;
                (d, e)
            })
            .collect();
        TimeSeries { points }
    }

    /// Exponentially weighted standard deviation with the given span.
    ///
    /// Tracks an EWMA mean and an EWMA of squared deviations from it; the
    /// result at t is sqrt of the running variance.
    pub fn ewm_std(&self, span: usize) -> TimeSeries {
        let alpha = 2.0 / (span as f64 + 1.0);
        let mut mean = f64::NAN;
        let mut var = 0.0;
        let points = self
            .points
            .iter()
            .enumerate()
            .map(|(i, &(d, v))| {
                if i == 0 {
                    mean = v;
                    var = 0.0;
                } else {
                    let dev = v - mean;
                    mean = alpha * v + (1.0 - alpha) * mean;
                    var = (1.0 - alpha) * (var + alpha * dev * dev);
                }
                (d, var.sqrt())
            })
            .collect();
        TimeSeries { points }
    }

    /// Inner join on dates, combining matched values with `f`.
    pub fn zip_with(
        &self,
        other: &TimeSeries,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<TimeSeries, SeriesError> {
        let mut points = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.points.len() && j < other.points.len() {
            let (da, va) = self.points[i];
            let (db, vb) = other.points[j];
            match da.cmp(&db) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    points.push((da, f(va, vb)));
                    i += 1;
                    j += 1;
                }
            }
        }
        if points.is_empty() {
            return Err(SeriesError::DisjointDates);
        }
        Ok(TimeSeries { points })
    }

    pub fn mul(&self, other: &TimeSeries) -> Result<TimeSeries, SeriesError> {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn add(&self, other: &TimeSeries) -> Result<TimeSeries, SeriesError> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Arithmetic mean of all values. `Err(Empty)` on an empty series.
    pub fn mean(&self) -> Result<f64, SeriesError> {
        if self.points.is_empty() {
            return Err(SeriesError::Empty);
        }
        Ok(self.values().sum::<f64>() / self.len() as f64)
    }

    /// Mean of absolute values.
    pub fn abs_mean(&self) -> Result<f64, SeriesError> {
        if self.points.is_empty() {
            return Err(SeriesError::Empty);
        }
        Ok(self.values().map(f64::abs).sum::<f64>() / self.len() as f64)
    }

    /// Sample standard deviation (n-1 denominator). Zero for fewer than 2 points.
    pub fn std_dev(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let mean = self.values().sum::<f64>() / self.len() as f64;
        let ss: f64 = self.values().map(|v| (v - mean) * (v - mean)).sum();
        (ss / (self.len() as f64 - 1.0)).sqrt()
    }

    /// Drop the first `n` points.
    pub fn skip(&self, n: usize) -> TimeSeries {
        TimeSeries {
            points: self.points.iter().skip(n).copied().collect(),
        }
    }

    /// Running cumulative sum, same dates.
    pub fn cumsum(&self) -> TimeSeries {
        let mut acc = 0.0;
        TimeSeries {
            points: self
                .points
                .iter()
                .map(|&(d, v)| {
                    acc += v;
                    (d, acc)
                })
                .collect(),
        }
    }
}
