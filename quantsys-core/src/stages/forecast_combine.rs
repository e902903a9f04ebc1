//! Forecast combination — variant pair.
//!
//! Combined forecast = Σ weightᵣ × capped_forecastᵣ, over the dates common
//! to every contributing rule, scaled by the forecast diversification
//! multiplier and re-capped to the same bound as the scale/cap stage.
//!
//! The fixed variant reads weights and multiplier from configuration
//! (defaulting to equal weights and 1.0). The estimated variant scores each
//! rule by the correlation of its lagged capped forecast with subsequent
//! price moves, and backs the multiplier out of the realized correlation
//! structure among the capped forecasts.

use super::{names, CallArgs, OpArity, OpSpec, Stage, StageValue};
use crate::domain::{InstrumentCode, RuleName, TimeSeries};
use crate::estimate;
use crate::stats::correlation;
use crate::system::{System, SystemError};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const OP_COMBINED_FORECAST: &str = "get_combined_forecast";
pub const OP_FORECAST_WEIGHTS: &str = "get_forecast_weights";
pub const OP_FDM: &str = "get_forecast_diversification_multiplier";

static OPS: [OpSpec; 3] = [
    OpSpec::new(OP_COMBINED_FORECAST, OpArity::Instrument),
    OpSpec::new(OP_FORECAST_WEIGHTS, OpArity::Instrument),
    OpSpec::new(OP_FDM, OpArity::Instrument),
];

static DEPS: [&str; 2] = [names::RULES, names::FORECAST_SCALE_CAP];

/// Weighted, multiplied, re-capped combination. Shared by both variants;
/// weights and multiplier arrive through (variant-dispatched) accessors.
fn combined_forecast(sys: &System, args: &CallArgs) -> Result<StageValue, SystemError> {
    let instrument = args.require_instrument()?;
    let weights = sys.forecast_weights(instrument)?;
    let fdm = sys.forecast_div_multiplier(instrument)?;

    let mut combined: Option<TimeSeries> = None;
    for (rule, weight) in &weights {
        let capped = sys.capped_forecast(instrument, &RuleName::new(rule.clone()))?;
        let weighted = capped.map(|v| v * weight);
        combined = Some(match combined {
            None => weighted,
            Some(acc) => acc.add(&weighted)?,
        });
    }

    let combined = combined.ok_or_else(|| {
        SystemError::NotFound(format!("no forecast weights for instrument '{instrument}'"))
    })?;
    let cap = sys.config().forecast_cap_or_default();
    Ok(StageValue::Series(Arc::new(
        combined.map(|v| v * fdm).clip(cap),
    )))
}

/// Normalize an explicit or derived weight map to sum 1.
fn normalized(map: &BTreeMap<String, f64>) -> Result<BTreeMap<String, f64>, SystemError> {
    let mut weights: Vec<f64> = map.values().copied().collect();
    estimate::normalize_weights(&mut weights)?;
    Ok(map.keys().cloned().zip(weights).collect())
}

/// Equal weights across the registered rule names.
fn equal_weights(sys: &System) -> Result<BTreeMap<String, f64>, SystemError> {
    let rules = sys.rule_names()?;
    if rules.is_empty() {
        return Err(SystemError::NotFound("no trading rules registered".into()));
    }
    let w = 1.0 / rules.len() as f64;
    Ok(rules.into_iter().map(|r| (r, w)).collect())
}

/// Fixed variant: weights and multiplier are configuration constants.
pub struct ForecastCombineFixed;

impl Stage for ForecastCombineFixed {
    fn name(&self) -> &'static str {
        names::COMB_FORECAST
    }

    fn ops(&self) -> &'static [OpSpec] {
        &OPS
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &DEPS
    }

    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError> {
        match op {
            OP_FORECAST_WEIGHTS => match sys.config().explicit_forecast_weights() {
                Some(map) => Ok(StageValue::Weights(normalized(map)?)),
                None => Ok(StageValue::Weights(equal_weights(sys)?)),
            },
            OP_FDM => Ok(StageValue::Scalar(
                sys.config().forecast_div_multiplier_or_default(),
            )),
            OP_COMBINED_FORECAST => combined_forecast(sys, args),
            _ => Err(SystemError::UnknownOp {
                stage: self.name().to_string(),
                op: op.to_string(),
            }),
        }
    }
}

/// Estimated variant: weights from forecast/return correlations, multiplier
/// from the capped forecasts' correlation structure.
pub struct ForecastCombineEstimated;

impl ForecastCombineEstimated {
    fn estimated_weights(
        &self,
        sys: &System,
        instrument: &InstrumentCode,
    ) -> Result<BTreeMap<String, f64>, SystemError> {
        let rules = sys.rule_names()?;
        if rules.is_empty() {
            return Err(SystemError::NotFound("no trading rules registered".into()));
        }
        let price_moves = sys.data().price_series(instrument)?.diff();

        let mut scores = Vec::with_capacity(rules.len());
        for rule in &rules {
            let capped = sys.capped_forecast(instrument, &RuleName::new(rule.clone()))?;
            // Yesterday's forecast against today's price move.
            let cols = estimate::aligned_columns(&[&capped.lag(), &price_moves])?;
            let score = correlation(&cols[0], &cols[1]).unwrap_or(0.0).max(0.0);
            scores.push(score);
        }

        // All rules scoring at the floor carry no ranking information;
        // fall back to equal weights rather than dividing by zero.
        if scores.iter().all(|&s| s < 1e-12) {
            scores = vec![1.0; rules.len()];
        }
        estimate::normalize_weights(&mut scores)?;
        tracing::debug!(%instrument, ?rules, ?scores, "estimated forecast weights");
        Ok(rules.into_iter().zip(scores).collect())
    }

    fn estimated_fdm(
        &self,
        sys: &System,
        instrument: &InstrumentCode,
    ) -> Result<f64, SystemError> {
        let weights = sys.forecast_weights(instrument)?;
        if weights.len() == 1 {
            return Ok(1.0);
        }

        let capped: Vec<Arc<TimeSeries>> = weights
            .keys()
            .map(|rule| sys.capped_forecast(instrument, &RuleName::new(rule.clone())))
            .collect::<Result<_, _>>()?;
        let refs: Vec<&TimeSeries> = capped.iter().map(Arc::as_ref).collect();
        let columns = estimate::aligned_columns(&refs)?;
        let corr = estimate::correlation_matrix(&columns);
        let weight_vec: Vec<f64> = weights.values().copied().collect();
        Ok(estimate::div_multiplier(&weight_vec, &corr)?)
    }
}

impl Stage for ForecastCombineEstimated {
    fn name(&self) -> &'static str {
        names::COMB_FORECAST
    }

    fn ops(&self) -> &'static [OpSpec] {
        &OPS
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &DEPS
    }

    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError> {
        match op {
            OP_FORECAST_WEIGHTS => {
                // Explicit configuration wins over estimation.
                if let Some(map) = sys.config().explicit_forecast_weights() {
                    return Ok(StageValue::Weights(normalized(map)?));
                }
                let instrument = args.require_instrument()?;
                Ok(StageValue::Weights(self.estimated_weights(sys, instrument)?))
            }
            OP_FDM => {
                if let Some(fdm) = sys.config().forecast_div_multiplier {
                    return Ok(StageValue::Scalar(fdm));
                }
                let instrument = args.require_instrument()?;
                Ok(StageValue::Scalar(self.estimated_fdm(sys, instrument)?))
            }
            OP_COMBINED_FORECAST => combined_forecast(sys, args),
            _ => Err(SystemError::UnknownOp {
                stage: self.name().to_string(),
                op: op.to_string(),
            }),
        }
    }
}
