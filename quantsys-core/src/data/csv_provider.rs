//! CSV-backed data provider.
//!
//! Directory layout:
//! - `instruments.csv` — header `code,currency,point_value`, one row per
//!   instrument.
//! - `{CODE}.csv` — header `date,price`, ISO dates, ascending.
//! - `{FROM}{TO}.csv` — optional FX files, header `date,rate`; the last row
//!   is used as the spot rate.
//!
//! Everything is loaded eagerly at construction so provider calls during a
//! computation never touch the filesystem.

use super::{DataError, DataProvider};
use crate::domain::{InstrumentCode, InstrumentMeta, TimeSeries};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct CsvDataProvider {
    series: BTreeMap<InstrumentCode, Arc<TimeSeries>>,
    meta: BTreeMap<InstrumentCode, InstrumentMeta>,
    base_path: PathBuf,
}

impl CsvDataProvider {
    /// Load a data directory. Fails on a missing or malformed
    /// `instruments.csv` or price file.
    pub fn load(base_path: impl Into<PathBuf>) -> Result<Self, DataError> {
        let base_path = base_path.into();
        let mut meta = BTreeMap::new();
        let mut series = BTreeMap::new();

        for m in read_instrument_table(&base_path)? {
            let code = m.code.clone();
            let prices = read_price_file(&base_path, &code)?;
            series.insert(code.clone(), Arc::new(prices));
            meta.insert(code, m);
        }

        Ok(Self {
            series,
            meta,
            base_path,
        })
    }
}

impl DataProvider for CsvDataProvider {
    fn name(&self) -> &str {
        "csv"
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
        let path = self.base_path.join(format!("{from}{to}.csv"));
        if !path.exists() {
            return Err(DataError::MissingFxRate {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let rates = read_dated_values(&path, "rate")?;
        rates
            .last()
            .map(|&(_, rate)| rate)
            .ok_or_else(|| DataError::MissingFxRate {
                from: from.to_string(),
                to: to.to_string(),
            })
    }
}

// ── File readers ─────────────────────────────────────────────────────

fn io_err(path: &Path, e: impl std::fmt::Display) -> DataError {
    DataError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn read_instrument_table(base: &Path) -> Result<Vec<InstrumentMeta>, DataError> {
    let path = base.join("instruments.csv");
    let mut rdr = csv::Reader::from_path(&path).map_err(|e| io_err(&path, e))?;
    let mut out = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| io_err(&path, e))?;
        let code = record
            .get(0)
            .ok_or_else(|| malformed(&path, "missing code column"))?
            .trim();
        let currency = record
            .get(1)
            .ok_or_else(|| malformed(&path, "missing currency column"))?
            .trim();
        let point_value: f64 = record
            .get(2)
            .ok_or_else(|| malformed(&path, "missing point_value column"))?
            .trim()
            .parse()
            .map_err(|e| malformed(&path, format!("bad point_value: {e}")))?;

        out.push(InstrumentMeta {
            code: InstrumentCode::new(code),
            currency: currency.to_string(),
            point_value,
        });
    }

    Ok(out)
}

fn read_price_file(base: &Path, code: &InstrumentCode) -> Result<TimeSeries, DataError> {
    let path = base.join(format!("{code}.csv"));
    let points = read_dated_values(&path, "price")?;
    TimeSeries::new(points).map_err(|e| DataError::Malformed {
        code: code.to_string(),
        reason: e.to_string(),
    })
}

/// Read a two-column `date,<value>` CSV into dated pairs.
fn read_dated_values(path: &Path, column: &str) -> Result<Vec<(NaiveDate, f64)>, DataError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| io_err(path, e))?;
    let mut out = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| io_err(path, e))?;
        let date_str = record
            .get(0)
            .ok_or_else(|| malformed(path, "missing date column"))?
            .trim();
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|e| malformed(path, format!("bad date '{date_str}': {e}")))?;
        let value: f64 = record
            .get(1)
            .ok_or_else(|| malformed(path, format!("missing {column} column")))?
            .trim()
            .parse()
            .map_err(|e| malformed(path, format!("bad {column}: {e}")))?;
        out.push((date, value));
    }

    Ok(out)
}

fn malformed(path: &Path, reason: impl Into<String>) -> DataError {
    DataError::Malformed {
        code: path.display().to_string(),
        reason: reason.into(),
    }
}
