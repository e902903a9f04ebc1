//! Accounting — P&L attribution and the portfolio curve.
//!
//! Per-instrument P&L applies yesterday's notional position to today's
//! price move, in the base currency. The portfolio curve sums every
//! instrument's daily P&L on the union of their dates and attaches summary
//! statistics.

use super::{names, CallArgs, OpArity, OpSpec, Stage, StageValue};
use crate::domain::TimeSeries;
use crate::stats::CurveStats;
use crate::system::{System, SystemError};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const OP_INSTRUMENT_PNL: &str = "get_instrument_pnl";
pub const OP_PORTFOLIO: &str = "portfolio";

static OPS: [OpSpec; 2] = [
    OpSpec::new(OP_INSTRUMENT_PNL, OpArity::Instrument),
    OpSpec::new(OP_PORTFOLIO, OpArity::None),
];

static DEPS: [&str; 1] = [names::PORTFOLIO];

/// A daily P&L series with its summary statistics.
#[derive(Debug, Clone)]
pub struct AccountCurve {
    pub pnl: TimeSeries,
    pub stats: CurveStats,
}

impl AccountCurve {
    pub fn from_pnl(pnl: TimeSeries) -> Self {
        let stats = CurveStats::compute(&pnl);
        Self { pnl, stats }
    }
}

/// P&L attribution over the held notional positions.
pub struct Account;

impl Account {
    fn instrument_pnl(&self, sys: &System, args: &CallArgs) -> Result<StageValue, SystemError> {
        let instrument = args.require_instrument()?;
        let notional = sys.notional_position(instrument)?;
        let prices = sys.data().price_series(instrument)?;
        let meta = sys.data().instrument_meta(instrument)?;
        let base = sys.config().base_currency_or_default();
        let fx = sys.data().fx_rate(&meta.currency, &base)?;

        // Yesterday's position rides today's price move.
        let pnl = notional
            .lag()
            .zip_with(&prices.diff(), |pos, d| pos * d)?
            .map(|v| v * meta.point_value * fx);
        Ok(StageValue::Series(Arc::new(pnl)))
    }

    fn portfolio_curve(&self, sys: &System) -> Result<StageValue, SystemError> {
        let instruments = sys.data().instruments();
        let per_instrument: Vec<Arc<TimeSeries>> = instruments
            .par_iter()
            .map(|code| sys.instrument_pnl(code))
            .collect::<Result<_, _>>()?;

        // Union of dates; instruments without history on a date contribute
        // nothing that day.
        let mut summed: BTreeMap<chrono::NaiveDate, f64> = BTreeMap::new();
        for series in &per_instrument {
            for (date, v) in series.points() {
                *summed.entry(*date).or_insert(0.0) += v;
            }
        }
        let pnl = TimeSeries::new(summed.into_iter().collect())?;
        tracing::info!(
            instruments = instruments.len(),
            days = pnl.len(),
            "portfolio curve built"
        );
        Ok(StageValue::Curve(Arc::new(AccountCurve::from_pnl(pnl))))
    }
}

impl Stage for Account {
    fn name(&self) -> &'static str {
        names::ACCOUNTS
    }

    fn ops(&self) -> &'static [OpSpec] {
        &OPS
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &DEPS
    }

    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError> {
        match op {
            OP_INSTRUMENT_PNL => self.instrument_pnl(sys, args),
            OP_PORTFOLIO => self.portfolio_curve(sys),
            _ => Err(SystemError::UnknownOp {
                stage: self.name().to_string(),
                op: op.to_string(),
            }),
        }
    }
}
