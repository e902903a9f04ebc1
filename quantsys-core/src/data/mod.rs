//! Data provider trait and structured error types.
//!
//! The core only consumes this interface: price history and instrument
//! metadata come from outside. Implementations here cover CSV directories,
//! seeded synthetic random walks, and an in-memory provider for tests.

mod csv_provider;
mod in_memory;
mod synthetic;

pub use csv_provider::CsvDataProvider;
pub use in_memory::InMemoryProvider;
pub use synthetic::SyntheticDataProvider;

use crate::domain::{InstrumentCode, InstrumentMeta, TimeSeries};
use std::sync::Arc;
use thiserror::Error;

/// Structured error types for data access.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("no price history for instrument '{0}'")]
    Empty(String),

    #[error("malformed data for '{code}': {reason}")]
    Malformed { code: String, reason: String },

    #[error("I/O error reading {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("no FX rate from {from} to {to}")]
    MissingFxRate { from: String, to: String },
}

/// Source of prices and instrument metadata.
///
/// `Send + Sync` because accessor evaluation may run per-instrument on a
/// rayon pool.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Every instrument this provider can serve, sorted.
    fn instruments(&self) -> Vec<InstrumentCode>;

    /// Full price history for an instrument.
    fn price_series(&self, code: &InstrumentCode) -> Result<Arc<TimeSeries>, DataError>;

    /// Static metadata (currency, point value).
    fn instrument_meta(&self, code: &InstrumentCode) -> Result<InstrumentMeta, DataError>;

    /// Spot conversion rate from `from` into `to`.
    ///
    /// Same-currency requests are always 1.0; anything else must be
    /// overridden by providers that carry FX data.
    fn fx_rate(&self, from: &str, to: &str) -> Result<f64, DataError> {
        if from == to {
            Ok(1.0)
        } else {
            Err(DataError::MissingFxRate {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}
