//! Stage contract — the pluggable computation units the orchestrator
//! composes.
//!
//! A stage declares the external name it registers under, the accessor
//! operations it exposes (with argument arity), and the stage names it
//! depends on. All cross-stage calls go through `System::accessor`; a stage
//! never holds a reference to another stage and never caches its own
//! results.

pub mod account;
pub mod forecast_combine;
pub mod forecast_scale_cap;
pub mod portfolio;
pub mod position_sizing;
pub mod rules_stage;

pub use account::{Account, AccountCurve};
pub use forecast_combine::{ForecastCombineEstimated, ForecastCombineFixed};
pub use forecast_scale_cap::{ForecastScaleCapEstimated, ForecastScaleCapFixed};
pub use portfolio::{PortfoliosEstimated, PortfoliosFixed};
pub use position_sizing::PositionSizing;
pub use rules_stage::Rules;

use crate::domain::{InstrumentCode, InstrumentSizing, RuleName, TimeSeries};
use crate::system::{System, SystemError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// External names of the standard pipeline stages.
pub mod names {
    pub const RULES: &str = "rules";
    pub const FORECAST_SCALE_CAP: &str = "forecastScaleCap";
    pub const COMB_FORECAST: &str = "combForecast";
    pub const POSITION_SIZE: &str = "positionSize";
    pub const PORTFOLIO: &str = "portfolio";
    pub const ACCOUNTS: &str = "accounts";
}

/// Argument shape an operation accepts. Checked by the orchestrator before
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpArity {
    /// No arguments.
    None,
    /// An instrument code only.
    Instrument,
    /// An instrument code and a rule name.
    InstrumentRule,
}

impl OpArity {
    pub fn matches(self, args: &CallArgs) -> bool {
        match self {
            OpArity::None => args.instrument.is_none() && args.rule.is_none(),
            OpArity::Instrument => args.instrument.is_some() && args.rule.is_none(),
            OpArity::InstrumentRule => args.instrument.is_some() && args.rule.is_some(),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            OpArity::None => "()",
            OpArity::Instrument => "(instrument)",
            OpArity::InstrumentRule => "(instrument, rule)",
        }
    }
}

/// Declaration of one accessor operation.
#[derive(Debug, Clone, Copy)]
pub struct OpSpec {
    pub name: &'static str,
    pub arity: OpArity,
}

impl OpSpec {
    pub const fn new(name: &'static str, arity: OpArity) -> Self {
        Self { name, arity }
    }
}

/// Arguments of one accessor call. Part of the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallArgs {
    pub instrument: Option<InstrumentCode>,
    pub rule: Option<RuleName>,
}

impl CallArgs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn instrument(code: impl Into<InstrumentCode>) -> Self {
        Self {
            instrument: Some(code.into()),
            rule: None,
        }
    }

    pub fn instrument_rule(code: impl Into<InstrumentCode>, rule: impl Into<RuleName>) -> Self {
        Self {
            instrument: Some(code.into()),
            rule: Some(rule.into()),
        }
    }

    /// The instrument, or a `BadArgs`-shaped error if absent. Stages call
    /// this after arity validation, so failure indicates a stage bug.
    pub fn require_instrument(&self) -> Result<&InstrumentCode, SystemError> {
        self.instrument
            .as_ref()
            .ok_or_else(|| SystemError::NotFound("call is missing an instrument".into()))
    }

    pub fn require_rule(&self) -> Result<&RuleName, SystemError> {
        self.rule
            .as_ref()
            .ok_or_else(|| SystemError::NotFound("call is missing a rule name".into()))
    }
}

impl fmt::Display for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.instrument, &self.rule) {
            (Some(i), Some(r)) => write!(f, "({i}, {r})"),
            (Some(i), None) => write!(f, "({i})"),
            (None, Some(r)) => write!(f, "(?, {r})"),
            (None, None) => write!(f, "()"),
        }
    }
}

/// Result of one accessor operation. Heterogeneous by design: stages expose
/// series, scalars, weight maps, sizing snapshots, name lists, and account
/// curves through the one cache.
#[derive(Debug, Clone)]
pub enum StageValue {
    Series(Arc<TimeSeries>),
    Scalar(f64),
    Weights(BTreeMap<String, f64>),
    Names(Vec<String>),
    Sizing(InstrumentSizing),
    Curve(Arc<AccountCurve>),
}

impl StageValue {
    pub fn kind(&self) -> &'static str {
        match self {
            StageValue::Series(_) => "series",
            StageValue::Scalar(_) => "scalar",
            StageValue::Weights(_) => "weights",
            StageValue::Names(_) => "names",
            StageValue::Sizing(_) => "sizing",
            StageValue::Curve(_) => "curve",
        }
    }

    pub fn into_series(self, key: &str) -> Result<Arc<TimeSeries>, SystemError> {
        match self {
            StageValue::Series(s) => Ok(s),
            other => Err(type_mismatch(key, "series", &other)),
        }
    }

    pub fn into_scalar(self, key: &str) -> Result<f64, SystemError> {
        match self {
            StageValue::Scalar(v) => Ok(v),
            other => Err(type_mismatch(key, "scalar", &other)),
        }
    }

    pub fn into_weights(self, key: &str) -> Result<BTreeMap<String, f64>, SystemError> {
        match self {
            StageValue::Weights(w) => Ok(w),
            other => Err(type_mismatch(key, "weights", &other)),
        }
    }

    pub fn into_names(self, key: &str) -> Result<Vec<String>, SystemError> {
        match self {
            StageValue::Names(n) => Ok(n),
            other => Err(type_mismatch(key, "names", &other)),
        }
    }

    pub fn into_sizing(self, key: &str) -> Result<InstrumentSizing, SystemError> {
        match self {
            StageValue::Sizing(s) => Ok(s),
            other => Err(type_mismatch(key, "sizing", &other)),
        }
    }

    pub fn into_curve(self, key: &str) -> Result<Arc<AccountCurve>, SystemError> {
        match self {
            StageValue::Curve(c) => Ok(c),
            other => Err(type_mismatch(key, "curve", &other)),
        }
    }
}

fn type_mismatch(key: &str, expected: &'static str, actual: &StageValue) -> SystemError {
    SystemError::TypeMismatch {
        key: key.to_string(),
        expected,
        actual: actual.kind(),
    }
}

/// A named, pluggable computation unit.
pub trait Stage: Send + Sync {
    /// External name this stage registers under. Unique per system.
    fn name(&self) -> &'static str;

    /// The accessor operations this stage exposes.
    fn ops(&self) -> &'static [OpSpec];

    /// Names of stages this one calls into. Validated at registration.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// Compute one operation. Upstream values must be pulled through
    /// `sys.accessor(...)` (or the typed wrappers), never computed locally,
    /// so every dependency edge is observed and cached exactly once.
    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError>;
}
