//! Position sizing — volatility targeting.
//!
//! Turns a combined forecast into a subsystem position: the position the
//! instrument would carry if it received the entire capital. The chain runs
//! price volatility → currency value volatility → volatility scalar →
//! subsystem position, with the daily cash volatility target derived from
//! configured capital and the annual percentage target.

use super::{names, CallArgs, OpArity, OpSpec, Stage, StageValue};
use crate::config::defaults;
use crate::data::DataError;
use crate::domain::InstrumentSizing;
use crate::stats::root_trading_days;
use crate::system::{System, SystemError};
use std::sync::Arc;

pub const OP_PRICE_VOL: &str = "get_price_volatility";
pub const OP_BLOCK_VALUE: &str = "get_block_value";
pub const OP_SIZING: &str = "get_instrument_sizing_data";
pub const OP_VALUE_VOL: &str = "get_instrument_value_vol";
pub const OP_VOL_SCALAR: &str = "get_volatility_scalar";
pub const OP_CASH_VOL_TARGET: &str = "get_daily_cash_vol_target";
pub const OP_SUBSYSTEM_POSITION: &str = "get_subsystem_position";

static OPS: [OpSpec; 7] = [
    OpSpec::new(OP_PRICE_VOL, OpArity::Instrument),
    OpSpec::new(OP_BLOCK_VALUE, OpArity::Instrument),
    OpSpec::new(OP_SIZING, OpArity::Instrument),
    OpSpec::new(OP_VALUE_VOL, OpArity::Instrument),
    OpSpec::new(OP_VOL_SCALAR, OpArity::Instrument),
    OpSpec::new(OP_CASH_VOL_TARGET, OpArity::None),
    OpSpec::new(OP_SUBSYSTEM_POSITION, OpArity::Instrument),
];

static DEPS: [&str; 1] = [names::COMB_FORECAST];

/// Span of the exponentially weighted volatility estimate, in trading days.
const VOL_SPAN: usize = 35;

/// Observations discarded while the volatility estimate warms up.
const VOL_WARMUP: usize = 10;

/// Floor applied to the volatility estimate to keep scalars finite.
const VOL_FLOOR: f64 = 1e-10;

/// Sizes positions so each subsystem runs at the cash volatility target.
pub struct PositionSizing;

impl PositionSizing {
    fn price_volatility(
        &self,
        sys: &System,
        args: &CallArgs,
    ) -> Result<StageValue, SystemError> {
        let instrument = args.require_instrument()?;
        let prices = sys.data().price_series(instrument)?;
        let vol = prices
            .diff()
            .ewm_std(VOL_SPAN)
            .skip(VOL_WARMUP)
            .map(|v| v.max(VOL_FLOOR));
        if vol.is_empty() {
            return Err(DataError::Empty(instrument.to_string()).into());
        }
        Ok(StageValue::Series(Arc::new(vol)))
    }

    fn block_value(&self, sys: &System, args: &CallArgs) -> Result<StageValue, SystemError> {
        let instrument = args.require_instrument()?;
        let meta = sys.data().instrument_meta(instrument)?;
        let prices = sys.data().price_series(instrument)?;
        // Currency value of a 1% move in one block.
        Ok(StageValue::Series(Arc::new(
            prices.map(|p| p * meta.point_value / 100.0),
        )))
    }

    fn sizing_data(&self, sys: &System, args: &CallArgs) -> Result<StageValue, SystemError> {
        let instrument = args.require_instrument()?;
        let meta = sys.data().instrument_meta(instrument)?;
        let prices = sys.data().price_series(instrument)?;
        let (_, last_price) = prices
            .last()
            .ok_or_else(|| DataError::Empty(instrument.to_string()))?;
        Ok(StageValue::Sizing(InstrumentSizing {
            currency: meta.currency,
            point_value: meta.point_value,
            last_price,
        }))
    }

    fn value_vol(&self, sys: &System, args: &CallArgs) -> Result<StageValue, SystemError> {
        let instrument = args.require_instrument()?;
        let meta = sys.data().instrument_meta(instrument)?;
        let base = sys.config().base_currency_or_default();
        let fx = sys.data().fx_rate(&meta.currency, &base)?;
        let price_vol = sys.price_volatility(instrument)?;
        // Daily cash volatility of one block, in the base currency.
        Ok(StageValue::Series(Arc::new(
            price_vol.map(|v| v * meta.point_value * fx),
        )))
    }

    fn vol_scalar(&self, sys: &System, args: &CallArgs) -> Result<StageValue, SystemError> {
        let instrument = args.require_instrument()?;
        let target = sys.daily_cash_vol_target()?;
        let value_vol = sys.instrument_value_vol(instrument)?;
        Ok(StageValue::Series(Arc::new(
            value_vol.map(|v| target / v),
        )))
    }

    fn cash_vol_target(&self, sys: &System) -> StageValue {
        let capital = sys.config().notional_trading_capital_or_default();
        let pct = sys.config().percentage_vol_target_or_default();
        StageValue::Scalar(capital * pct / 100.0 / root_trading_days())
    }

    fn subsystem_position(
        &self,
        sys: &System,
        args: &CallArgs,
    ) -> Result<StageValue, SystemError> {
        let instrument = args.require_instrument()?;
        let combined = sys.combined_forecast(instrument)?;
        let vol_scalar = sys.volatility_scalar(instrument)?;
        // A forecast at the average absolute level holds exactly one
        // volatility scalar's worth of blocks.
        let position = combined.zip_with(&vol_scalar, |f, vs| {
            f * vs / defaults::AVERAGE_ABS_FORECAST
        })?;
        Ok(StageValue::Series(Arc::new(position)))
    }
}

impl Stage for PositionSizing {
    fn name(&self) -> &'static str {
        names::POSITION_SIZE
    }

    fn ops(&self) -> &'static [OpSpec] {
        &OPS
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &DEPS
    }

    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError> {
        match op {
            OP_PRICE_VOL => self.price_volatility(sys, args),
            OP_BLOCK_VALUE => self.block_value(sys, args),
            OP_SIZING => self.sizing_data(sys, args),
            OP_VALUE_VOL => self.value_vol(sys, args),
            OP_VOL_SCALAR => self.vol_scalar(sys, args),
            OP_CASH_VOL_TARGET => Ok(self.cash_vol_target(sys)),
            OP_SUBSYSTEM_POSITION => self.subsystem_position(sys, args),
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
    use crate::stages::{ForecastCombineFixed, ForecastScaleCapFixed, Rules};
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
        // Alternating ±1 moves give a stable, nonzero volatility.
        let values: Vec<f64> = (0..80)
            .map(|i| 100.0 + if i % 2 == 0 { 0.0 } else { 1.0 })
            .collect();
        Arc::new(InMemoryProvider::new().add(
            "CORN",
            TimeSeries::daily_from(start, &values),
            "USD",
            50.0,
        ))
    }

    fn pipeline() -> Vec<Box<dyn Stage>> {
        vec![
            Box::new(Rules::new(vec![TradingRule::new(
                "const10",
                Box::new(ConstantForecast(10.0)),
            )])),
            Box::new(ForecastScaleCapFixed),
            Box::new(ForecastCombineFixed),
            Box::new(PositionSizing),
        ]
    }

    #[test]
    fn cash_vol_target_from_defaults() {
        let sys = System::with_defaults(pipeline(), provider()).unwrap();
        let target = sys.daily_cash_vol_target().unwrap();
        let expected = 1_000_000.0 * 16.0 / 100.0 / root_trading_days();
        assert!((target - expected).abs() < 1e-9);
    }

    #[test]
    fn cash_vol_target_reads_config() {
        let mut config = Config::default();
        config.notional_trading_capital = Some(500_000.0);
        config.percentage_vol_target = Some(25.0);

        let sys = System::new(pipeline(), provider(), config).unwrap();
        let expected = 500_000.0 * 25.0 / 100.0 / root_trading_days();
        assert!((sys.daily_cash_vol_target().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn price_volatility_is_positive_and_warmed_up() {
        let sys = System::with_defaults(pipeline(), provider()).unwrap();
        let prices_len = sys.data().price_series(&"CORN".into()).unwrap().len();
        let vol = sys.price_volatility(&"CORN".into()).unwrap();

        // diff drops one point, the warmup drops VOL_WARMUP more.
        assert_eq!(vol.len(), prices_len - 1 - VOL_WARMUP);
        assert!(vol.values().all(|v| v > 0.0));
    }

    #[test]
    fn block_value_scales_price_by_point_value() {
        let sys = System::with_defaults(pipeline(), provider()).unwrap();
        let block = sys.block_value(&"CORN".into()).unwrap();
        let (_, first) = block.first().unwrap();
        // 100.0 × 50.0 / 100 = 50.0
        assert!((first - 50.0).abs() < 1e-12);
    }

    #[test]
    fn sizing_data_snapshot() {
        let sys = System::with_defaults(pipeline(), provider()).unwrap();
        let sizing = sys.instrument_sizing_data(&"CORN".into()).unwrap();
        assert_eq!(sizing.currency, "USD");
        assert_eq!(sizing.point_value, 50.0);
        assert_eq!(sizing.last_price, 101.0);
    }

    #[test]
    fn value_vol_applies_point_value_and_fx() {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let values: Vec<f64> = (0..80)
            .map(|i| 100.0 + if i % 2 == 0 { 0.0 } else { 1.0 })
            .collect();
        let data = Arc::new(
            InMemoryProvider::new()
                .add("DAX", TimeSeries::daily_from(start, &values), "EUR", 25.0)
                .add_fx("EUR", "USD", 1.1),
        );

        let sys = System::with_defaults(pipeline(), data).unwrap();
        let price_vol = sys.price_volatility(&"DAX".into()).unwrap();
        let value_vol = sys.instrument_value_vol(&"DAX".into()).unwrap();

        let (_, pv) = price_vol.first().unwrap();
        let (_, vv) = value_vol.first().unwrap();
        assert!((vv - pv * 25.0 * 1.1).abs() < 1e-9);
    }

    #[test]
    fn subsystem_position_at_average_forecast_equals_vol_scalar() {
        // Forecast pinned at the average absolute level, so position must
        // equal the volatility scalar on every shared date.
        let sys = System::with_defaults(pipeline(), provider()).unwrap();
        let position = sys.subsystem_position(&"CORN".into()).unwrap();
        let scalar = sys.volatility_scalar(&"CORN".into()).unwrap();

        for (date, p) in position.points() {
            let s = scalar.get(*date).unwrap();
            assert!((p - s).abs() < 1e-9, "position {p} vs scalar {s}");
        }
    }

    #[test]
    fn vol_scalar_inverts_value_vol() {
        let sys = System::with_defaults(pipeline(), provider()).unwrap();
        let target = sys.daily_cash_vol_target().unwrap();
        let value_vol = sys.instrument_value_vol(&"CORN".into()).unwrap();
        let scalar = sys.volatility_scalar(&"CORN".into()).unwrap();

        let (_, vv) = value_vol.first().unwrap();
        let (_, vs) = scalar.first().unwrap();
        assert!((vs - target / vv).abs() < 1e-6);
    }
}
