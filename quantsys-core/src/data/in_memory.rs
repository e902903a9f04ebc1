//! Literal in-memory provider, used by tests and doc examples.

use super::{DataError, DataProvider};
use crate::domain::{InstrumentCode, InstrumentMeta, TimeSeries};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
pub struct InMemoryProvider {
    series: BTreeMap<InstrumentCode, Arc<TimeSeries>>,
    meta: BTreeMap<InstrumentCode, InstrumentMeta>,
    fx: BTreeMap<(String, String), f64>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument with its price history and sizing metadata.
    pub fn add(
        mut self,
        code: impl Into<InstrumentCode>,
        prices: TimeSeries,
        currency: &str,
        point_value: f64,
    ) -> Self {
        let code = code.into();
        self.meta.insert(
            code.clone(),
            InstrumentMeta {
                code: code.clone(),
                currency: currency.to_string(),
                point_value,
            },
        );
        self.series.insert(code, Arc::new(prices));
        self
    }

    pub fn add_fx(mut self, from: &str, to: &str, rate: f64) -> Self {
        self.fx.insert((from.to_string(), to.to_string()), rate);
        self
    }
}

impl DataProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn instruments(&self) -> Vec<InstrumentCode> {
        self.series.keys().cloned().collect()
    }

    fn price_series(&self, code: &InstrumentCode) -> Result<Arc<TimeSeries>, DataError> {
        let series = self
            .series
            .get(code)
            .ok_or_else(|| DataError::UnknownInstrument(code.to_string()))?;
        if series.is_empty() {
            return Err(DataError::Empty(code.to_string()));
        }
        Ok(Arc::clone(series))
    }

    fn instrument_meta(&self, code: &InstrumentCode) -> Result<InstrumentMeta, DataError> {
        self.meta
            .get(code)
            .cloned()
            .ok_or_else(|| DataError::UnknownInstrument(code.to_string()))
    }

    fn fx_rate(&self, from: &str, to: &str) -> Result<f64, DataError> {
        if from == to {
            return Ok(1.0);
        }
        self.fx
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .ok_or_else(|| DataError::MissingFxRate {
                from: from.to_string(),
                to: to.to_string(),
            })
    }
}
