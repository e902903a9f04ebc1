//! Domain types shared by every stage: identifiers, metadata, and the
//! `TimeSeries` value type.

mod instrument;
mod series;

pub use instrument::{InstrumentCode, InstrumentMeta, InstrumentSizing, RuleName};
pub use series::{SeriesError, TimeSeries};
