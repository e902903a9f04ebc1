//! Portfolio construction — variant pair.
//!
//! Scales each subsystem position by its instrument weight and the
//! instrument diversification multiplier to produce the notional position
//! actually held. The fixed variant reads weights and multiplier from
//! configuration; the estimated variant backs the multiplier out of the
//! correlation structure of per-instrument subsystem returns.

use super::{names, CallArgs, OpArity, OpSpec, Stage, StageValue};
use crate::domain::{InstrumentCode, TimeSeries};
use crate::estimate;
use crate::system::{System, SystemError};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const OP_NOTIONAL_POSITION: &str = "get_notional_position";
pub const OP_INSTRUMENT_WEIGHTS: &str = "get_instrument_weights";
pub const OP_IDM: &str = "get_instrument_diversification_multiplier";

static OPS: [OpSpec; 3] = [
    OpSpec::new(OP_NOTIONAL_POSITION, OpArity::Instrument),
    OpSpec::new(OP_INSTRUMENT_WEIGHTS, OpArity::None),
    OpSpec::new(OP_IDM, OpArity::None),
];

static DEPS: [&str; 1] = [names::POSITION_SIZE];

/// Notional position = subsystem × weight × multiplier. Shared by both
/// variants; weights and multiplier arrive through accessors.
fn notional_position(sys: &System, args: &CallArgs) -> Result<StageValue, SystemError> {
    let instrument = args.require_instrument()?;
    let weights = sys.instrument_weights()?;
    let weight = *weights.get(&instrument.to_string()).ok_or_else(|| {
        SystemError::NotFound(format!("no instrument weight for '{instrument}'"))
    })?;
    let idm = sys.instrument_div_multiplier()?;
    let subsystem = sys.subsystem_position(instrument)?;
    Ok(StageValue::Series(Arc::new(
        subsystem.map(|p| p * weight * idm),
    )))
}

fn normalized(map: &BTreeMap<String, f64>) -> Result<BTreeMap<String, f64>, SystemError> {
    let mut weights: Vec<f64> = map.values().copied().collect();
    estimate::normalize_weights(&mut weights)?;
    Ok(map.keys().cloned().zip(weights).collect())
}

fn equal_weights(sys: &System) -> Result<BTreeMap<String, f64>, SystemError> {
    let instruments = sys.data().instruments();
    if instruments.is_empty() {
        return Err(SystemError::NotFound("data provider has no instruments".into()));
    }
    let w = 1.0 / instruments.len() as f64;
    Ok(instruments.into_iter().map(|i| (i.to_string(), w)).collect())
}

/// Fixed variant: weights and multiplier are configuration constants.
pub struct PortfoliosFixed;

impl Stage for PortfoliosFixed {
    fn name(&self) -> &'static str {
        names::PORTFOLIO
    }

    fn ops(&self) -> &'static [OpSpec] {
        &OPS
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &DEPS
    }

    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError> {
        match op {
            OP_INSTRUMENT_WEIGHTS => match sys.config().explicit_instrument_weights() {
                Some(map) => Ok(StageValue::Weights(normalized(map)?)),
                None => Ok(StageValue::Weights(equal_weights(sys)?)),
            },
            OP_IDM => Ok(StageValue::Scalar(
                sys.config().instrument_div_multiplier_or_default(),
            )),
            OP_NOTIONAL_POSITION => notional_position(sys, args),
            _ => Err(SystemError::UnknownOp {
                stage: self.name().to_string(),
                op: op.to_string(),
            }),
        }
    }
}

/// Estimated variant: the multiplier comes from the correlation structure
/// of subsystem returns across instruments.
pub struct PortfoliosEstimated;

impl PortfoliosEstimated {
    /// Daily subsystem return proxy: yesterday's position times today's
    /// price move, in price points scaled by the point value.
    fn subsystem_returns(
        &self,
        sys: &System,
        instrument: &InstrumentCode,
    ) -> Result<TimeSeries, SystemError> {
        let position = sys.subsystem_position(instrument)?;
        let prices = sys.data().price_series(instrument)?;
        let meta = sys.data().instrument_meta(instrument)?;
        Ok(position
            .lag()
            .zip_with(&prices.diff(), |p, d| p * d)?
            .map(|v| v * meta.point_value))
    }

    fn estimated_idm(&self, sys: &System) -> Result<f64, SystemError> {
        let weights = sys.instrument_weights()?;
        if weights.len() == 1 {
            return Ok(1.0);
        }

        let mut returns = Vec::with_capacity(weights.len());
        for code in weights.keys() {
            returns.push(self.subsystem_returns(sys, &code.as_str().into())?);
        }
        let refs: Vec<&TimeSeries> = returns.iter().collect();
        let columns = estimate::aligned_columns(&refs)?;
        let corr = estimate::correlation_matrix(&columns);
        let weight_vec: Vec<f64> = weights.values().copied().collect();
        let idm = estimate::div_multiplier(&weight_vec, &corr)?;
        tracing::debug!(idm, instruments = weights.len(), "estimated diversification multiplier");
        Ok(idm)
    }
}

impl Stage for PortfoliosEstimated {
    fn name(&self) -> &'static str {
        names::PORTFOLIO
    }

    fn ops(&self) -> &'static [OpSpec] {
        &OPS
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &DEPS
    }

    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError> {
        match op {
            OP_INSTRUMENT_WEIGHTS => {
                // Explicit configuration wins over estimation.
                if let Some(map) = sys.config().explicit_instrument_weights() {
                    return Ok(StageValue::Weights(normalized(map)?));
                }
                Ok(StageValue::Weights(equal_weights(sys)?))
            }
            OP_IDM => {
                if let Some(idm) = sys.config().instrument_div_multiplier {
                    return Ok(StageValue::Scalar(idm));
                }
                Ok(StageValue::Scalar(self.estimated_idm(sys)?))
            }
            OP_NOTIONAL_POSITION => notional_position(sys, args),
            _ => Err(SystemError::UnknownOp {
                stage: self.name().to_string(),
                op: op.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data::InMemoryProvider;
    use crate::domain::SeriesError;
    use crate::rules::{ForecastFn, TradingRule};
    use crate::stages::{ForecastCombineFixed, ForecastScaleCapFixed, PositionSizing, Rules};
    use chrono::NaiveDate;

    struct ConstantForecast(f64);

    impl ForecastFn for ConstantForecast {
        fn rule_type(&self) -> &'static str {
            "constant"
        }

        fn forecast(&self, prices: &TimeSeries) -> Result<TimeSeries, SeriesError> {
            Ok(prices.map(|_| self.0))
        }
    }

    fn provider() -> Arc<InMemoryProvider> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let wiggle: Vec<f64> = (0..80)
            .map(|i| 100.0 + if i % 2 == 0 { 0.0 } else { 1.0 })
            .collect();
        let drift: Vec<f64> = (0..80).map(|i| 50.0 + (i % 5) as f64).collect();
        Arc::new(
            InMemoryProvider::new()
                .add("CORN", TimeSeries::daily_from(start, &wiggle), "USD", 50.0)
                .add("WHEAT", TimeSeries::daily_from(start, &drift), "USD", 25.0),
        )
    }

    fn pipeline(portfolio: Box<dyn Stage>) -> Vec<Box<dyn Stage>> {
        vec![
            Box::new(Rules::new(vec![TradingRule::new(
                "const10",
                Box::new(ConstantForecast(10.0)),
            )])),
            Box::new(ForecastScaleCapFixed),
            Box::new(ForecastCombineFixed),
            Box::new(PositionSizing),
            portfolio,
        ]
    }

    #[test]
    fn fixed_defaults_to_equal_weights() {
        let sys =
            System::with_defaults(pipeline(Box::new(PortfoliosFixed)), provider()).unwrap();
        let weights = sys.instrument_weights().unwrap();
        assert_eq!(weights.len(), 2);
        assert!((weights["CORN"] - 0.5).abs() < 1e-12);
        assert!((weights["WHEAT"] - 0.5).abs() < 1e-12);
        assert_eq!(sys.instrument_div_multiplier().unwrap(), 1.0);
    }

    #[test]
    fn explicit_weights_are_renormalized() {
        let mut config = Config::default();
        config.instrument_weights = Some(
            [("CORN".to_string(), 3.0), ("WHEAT".to_string(), 1.0)]
                .into_iter()
                .collect(),
        );

        let sys = System::new(pipeline(Box::new(PortfoliosFixed)), provider(), config).unwrap();
        let weights = sys.instrument_weights().unwrap();
        assert!((weights["CORN"] - 0.75).abs() < 1e-12);
        assert!((weights["WHEAT"] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn notional_scales_subsystem_by_weight_and_idm() {
        let mut config = Config::default();
        config.instrument_div_multiplier = Some(1.4);

        let sys = System::new(pipeline(Box::new(PortfoliosFixed)), provider(), config).unwrap();
        let subsystem = sys.subsystem_position(&"CORN".into()).unwrap();
        let notional = sys.notional_position(&"CORN".into()).unwrap();

        for ((_, s), (_, n)) in subsystem.points().iter().zip(notional.points()) {
            assert!((n - s * 0.5 * 1.4).abs() < 1e-9);
        }
    }

    #[test]
    fn notional_for_unweighted_instrument_is_not_found() {
        let mut config = Config::default();
        config.instrument_weights = Some([("CORN".to_string(), 1.0)].into_iter().collect());

        let sys = System::new(pipeline(Box::new(PortfoliosFixed)), provider(), config).unwrap();
        match sys.notional_position(&"WHEAT".into()) {
            Err(SystemError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn estimated_idm_honors_explicit_config() {
        let mut config = Config::default();
        config.instrument_div_multiplier = Some(1.2);

        let sys =
            System::new(pipeline(Box::new(PortfoliosEstimated)), provider(), config).unwrap();
        assert_eq!(sys.instrument_div_multiplier().unwrap(), 1.2);
    }

    #[test]
    fn estimated_idm_stays_within_bounds() {
        let sys =
            System::with_defaults(pipeline(Box::new(PortfoliosEstimated)), provider()).unwrap();
        let idm = sys.instrument_div_multiplier().unwrap();
        assert!((estimate::DIV_MULTIPLIER_MIN..=estimate::DIV_MULTIPLIER_MAX).contains(&idm));
    }

    #[test]
    fn single_instrument_idm_is_one() {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let values: Vec<f64> = (0..80)
            .map(|i| 100.0 + if i % 2 == 0 { 0.0 } else { 1.0 })
            .collect();
        let data = Arc::new(InMemoryProvider::new().add(
            "CORN",
            TimeSeries::daily_from(start, &values),
            "USD",
            50.0,
        ));

        let sys = System::with_defaults(pipeline(Box::new(PortfoliosEstimated)), data).unwrap();
        assert_eq!(sys.instrument_div_multiplier().unwrap(), 1.0);
    }
}
