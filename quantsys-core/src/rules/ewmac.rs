//! EWMA crossover rule.
//!
//! forecast[t] = (ewma_fast[t] - ewma_slow[t]) / price_vol[t]
//!
//! Volatility normalization makes forecasts comparable across instruments
//! with different price levels. The vol measure is the exponentially
//! weighted std of daily price differences (span 35), floored to avoid
//! division blowups on dead-flat history.

use super::ForecastFn;
use crate::domain::{SeriesError, TimeSeries};

/// Span of the vol-normalization EWMA.
pub const VOL_SPAN: usize = 35;

/// Floor applied to the vol divisor.
const VOL_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct Ewmac {
    lfast: usize,
    lslow: usize,
}

impl Ewmac {
    pub fn new(lfast: usize, lslow: usize) -> Self {
        assert!(lfast >= 1 && lslow > lfast, "need 1 <= lfast < lslow");
        Self { lfast, lslow }
    }

    pub fn lfast(&self) -> usize {
        self.lfast
    }

    pub fn lslow(&self) -> usize {
        self.lslow
    }
}

impl Default for Ewmac {
    fn default() -> Self {
        Self::new(32, 128)
    }
}

impl ForecastFn for Ewmac {
    fn rule_type(&self) -> &'static str {
        "ewmac"
    }

    fn forecast(&self, prices: &TimeSeries) -> Result<TimeSeries, SeriesError> {
        if prices.len() < 2 {
            return Err(SeriesError::Empty);
        }
        let fast = prices.ewma(self.lfast);
        let slow = prices.ewma(self.lslow);
        let crossover = fast.zip_with(&slow, |f, s| f - s)?;
        let vol = prices.diff().ewm_std(VOL_SPAN).map(|v| v.max(VOL_FLOOR));
        crossover.zip_with(&vol, |c, v| c / v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn trending_prices_give_positive_forecast() {
        let values: Vec<f64> = (0..200).map(|i| 100.0 + i as f64 * 0.5).collect();
        let prices = TimeSeries::daily_from(start(), &values);
        let forecast = Ewmac::new(8, 32).forecast(&prices).unwrap();
        // Once the averages have separated, the forecast should be firmly positive.
        let late: Vec<f64> = forecast.tail(50).iter().map(|&(_, v)| v).collect();
        assert!(late.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn downtrend_gives_negative_forecast() {
        let values: Vec<f64> = (0..200).map(|i| 200.0 - i as f64 * 0.5).collect();
        let prices = TimeSeries::daily_from(start(), &values);
        let forecast = Ewmac::new(8, 32).forecast(&prices).unwrap();
        let late: Vec<f64> = forecast.tail(50).iter().map(|&(_, v)| v).collect();
        assert!(late.iter().all(|&v| v < 0.0));
    }

    #[test]
    fn too_short_history_errors() {
        let prices = TimeSeries::daily_from(start(), &[100.0]);
        assert!(Ewmac::default().forecast(&prices).is_err());
    }

    #[test]
    #[should_panic(expected = "lfast < lslow")]
    fn rejects_inverted_spans() {
        Ewmac::new(64, 8);
    }
}
