//! Forecast scaling and capping — variant pair.
//!
//! Both variants register under the same external name and expose the same
//! operations; upstream and downstream stages cannot tell which is
//! installed. The fixed variant reads scalars from configuration, the
//! estimated variant derives them from the raw forecast's realized
//! magnitude. An explicit configuration value always wins, even under the
//! estimated variant.

use super::{names, CallArgs, OpArity, OpSpec, Stage, StageValue};
use crate::config::defaults;
use crate::estimate;
use crate::system::{System, SystemError};
use std::sync::Arc;

pub const OP_FORECAST_SCALAR: &str = "get_forecast_scalar";
pub const OP_SCALED_FORECAST: &str = "get_scaled_forecast";
pub const OP_CAPPED_FORECAST: &str = "get_capped_forecast";

static OPS: [OpSpec; 3] = [
    OpSpec::new(OP_FORECAST_SCALAR, OpArity::InstrumentRule),
    OpSpec::new(OP_SCALED_FORECAST, OpArity::InstrumentRule),
    OpSpec::new(OP_CAPPED_FORECAST, OpArity::InstrumentRule),
];

static DEPS: [&str; 1] = [names::RULES];

/// Scaled forecast: raw forecast × the (variant-resolved, cached) scalar.
fn scaled_forecast(sys: &System, args: &CallArgs) -> Result<StageValue, SystemError> {
    let instrument = args.require_instrument()?;
    let rule = args.require_rule()?;
    let raw = sys.raw_forecast(instrument, rule)?;
    let scalar = sys.forecast_scalar(instrument, rule)?;
    Ok(StageValue::Series(Arc::new(raw.map(|v| v * scalar))))
}

/// Capped forecast: scaled forecast clipped to ±forecast_cap, elementwise.
fn capped_forecast(sys: &System, args: &CallArgs) -> Result<StageValue, SystemError> {
    let instrument = args.require_instrument()?;
    let rule = args.require_rule()?;
    let scaled = sys.scaled_forecast(instrument, rule)?;
    let cap = sys.config().forecast_cap_or_default();
    Ok(StageValue::Series(Arc::new(scaled.clip(cap))))
}

/// Fixed variant: scalars come solely from configuration.
pub struct ForecastScaleCapFixed;

impl Stage for ForecastScaleCapFixed {
    fn name(&self) -> &'static str {
        names::FORECAST_SCALE_CAP
    }

    fn ops(&self) -> &'static [OpSpec] {
        &OPS
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &DEPS
    }

    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError> {
        match op {
            OP_FORECAST_SCALAR => {
                let rule = args.require_rule()?;
                let scalar = sys
                    .config()
                    .explicit_forecast_scalar(rule.as_str())
                    .unwrap_or(defaults::FORECAST_SCALAR);
                Ok(StageValue::Scalar(scalar))
            }
            OP_SCALED_FORECAST => scaled_forecast(sys, args),
            OP_CAPPED_FORECAST => capped_forecast(sys, args),
            _ => Err(SystemError::UnknownOp {
                stage: self.name().to_string(),
                op: op.to_string(),
            }),
        }
    }
}

/// Estimated variant: scalars derived from the raw forecast's realized
/// absolute magnitude when configuration is silent.
pub struct ForecastScaleCapEstimated;

impl Stage for ForecastScaleCapEstimated {
    fn name(&self) -> &'static str {
        names::FORECAST_SCALE_CAP
    }

    fn ops(&self) -> &'static [OpSpec] {
        &OPS
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &DEPS
    }

    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError> {
        match op {
            OP_FORECAST_SCALAR => {
                let instrument = args.require_instrument()?;
                let rule = args.require_rule()?;
                // Layer 1: explicit configuration wins verbatim.
                if let Some(scalar) = sys.config().explicit_forecast_scalar(rule.as_str()) {
                    return Ok(StageValue::Scalar(scalar));
                }
                // Layer 2: estimate from the raw forecast.
                let raw = sys.raw_forecast(instrument, rule)?;
                let scalar = estimate::forecast_scalar(&raw, defaults::AVERAGE_ABS_FORECAST)?;
                tracing::debug!(%instrument, %rule, scalar, "estimated forecast scalar");
                Ok(StageValue::Scalar(scalar))
            }
            OP_SCALED_FORECAST => scaled_forecast(sys, args),
            OP_CAPPED_FORECAST => capped_forecast(sys, args),
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
    use crate::domain::{SeriesError, TimeSeries};
    use crate::rules::{ForecastFn, TradingRule};
    use crate::stages::Rules;
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
        let values = vec![100.0; 50];
        Arc::new(InMemoryProvider::new().add(
            "X",
            TimeSeries::daily_from(start, &values),
            "USD",
            10.0,
        ))
    }

    fn rules_with_constant(value: f64) -> Box<Rules> {
        Box::new(Rules::new(vec![TradingRule::new(
            "const",
            Box::new(ConstantForecast(value)),
        )]))
    }

    #[test]
    fn fixed_reads_scalar_from_config() {
        let mut config = Config::default();
        config.forecast_scalars =
            Some([("const".to_string(), 2.5)].into_iter().collect());

        let sys = System::new(
            vec![rules_with_constant(4.0), Box::new(ForecastScaleCapFixed)],
            provider(),
            config,
        )
        .unwrap();

        assert_eq!(sys.forecast_scalar(&"X".into(), &"const".into()).unwrap(), 2.5);
        let scaled = sys.scaled_forecast(&"X".into(), &"const".into()).unwrap();
        assert!(scaled.values().all(|v| v == 10.0));
    }

    #[test]
    fn fixed_defaults_to_unit_scalar() {
        let sys = System::with_defaults(
            vec![rules_with_constant(4.0), Box::new(ForecastScaleCapFixed)],
            provider(),
        )
        .unwrap();
        assert_eq!(sys.forecast_scalar(&"X".into(), &"const".into()).unwrap(), 1.0);
    }

    #[test]
    fn estimated_targets_average_magnitude() {
        // |raw| = 4 everywhere, target 10 → scalar 2.5.
        let sys = System::with_defaults(
            vec![
                rules_with_constant(4.0),
                Box::new(ForecastScaleCapEstimated),
            ],
            provider(),
        )
        .unwrap();

        let scalar = sys.forecast_scalar(&"X".into(), &"const".into()).unwrap();
        assert!((scalar - 2.5).abs() < 1e-12);
    }

    #[test]
    fn explicit_config_beats_estimation() {
        let mut config = Config::default();
        config.forecast_scalars =
            Some([("const".to_string(), 5.3)].into_iter().collect());

        let sys = System::new(
            vec![
                rules_with_constant(4.0),
                Box::new(ForecastScaleCapEstimated),
            ],
            provider(),
            config,
        )
        .unwrap();

        // Exactly the configured value, not the statistically derived 2.5.
        assert_eq!(sys.forecast_scalar(&"X".into(), &"const".into()).unwrap(), 5.3);
    }

    #[test]
    fn estimation_of_zero_forecast_fails_loudly() {
        let sys = System::with_defaults(
            vec![
                rules_with_constant(0.0),
                Box::new(ForecastScaleCapEstimated),
            ],
            provider(),
        )
        .unwrap();

        let err = sys.forecast_scalar(&"X".into(), &"const".into()).unwrap_err();
        assert!(matches!(err, SystemError::Estimation(_)));
    }

    #[test]
    fn cap_pins_at_bound_elementwise() {
        let mut config = Config::default();
        config.forecast_scalars = Some([("const".to_string(), 10.0)].into_iter().collect());

        let sys = System::new(
            vec![rules_with_constant(4.0), Box::new(ForecastScaleCapFixed)],
            provider(),
            config,
        )
        .unwrap();

        // Scaled = 40, cap default 20 → pinned exactly at 20 everywhere.
        let capped = sys.capped_forecast(&"X".into(), &"const".into()).unwrap();
        assert!(capped.values().all(|v| v == 20.0));
    }

    #[test]
    fn negative_cap_is_symmetric() {
        let mut config = Config::default();
        config.forecast_scalars = Some([("const".to_string(), 10.0)].into_iter().collect());

        let sys = System::new(
            vec![rules_with_constant(-4.0), Box::new(ForecastScaleCapFixed)],
            provider(),
            config,
        )
        .unwrap();

        let capped = sys.capped_forecast(&"X".into(), &"const".into()).unwrap();
        assert!(capped.values().all(|v| v == -20.0));
    }
}
