//! Instrument and rule identifiers, plus per-instrument static metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque market identifier (e.g. "EDOLLAR", "CORN"). Identity only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentCode(pub String);

impl InstrumentCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Name of one trading-rule instance. Two instances of the same underlying
/// computation with different parameters get distinct names ("ewmac8",
/// "ewmac32").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleName(pub String);

impl RuleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuleName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Static metadata a data provider carries for each instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub code: InstrumentCode,
    /// Currency the instrument is priced in.
    pub currency: String,
    /// Cash value of a one-point price move in `currency`.
    pub point_value: f64,
}

/// Snapshot used by position sizing: not a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSizing {
    pub currency: String,
    pub point_value: f64,
    pub last_price: f64,
}

impl fmt::Display for InstrumentSizing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "price={} point_value={} ccy={}",
            self.last_price, self.point_value, self.currency
        )
    }
}
