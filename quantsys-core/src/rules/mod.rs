//! Trading rules — forecast-generating functions.
//!
//! A `TradingRule` is a named instance of a forecast function: the same
//! underlying computation with different parameters is a different rule
//! ("ewmac8" vs "ewmac32"). Rules are user-constructed or built from
//! configuration by the factory; either way they are immutable once the
//! system owns them.

pub mod ewmac;
pub mod factory;

pub use ewmac::Ewmac;
pub use factory::{create_rule, RuleFactoryError};

use crate::domain::{RuleName, SeriesError, TimeSeries};

/// A forecast function over a price history.
///
/// Implementations must be pure: same prices in, same forecast out.
pub trait ForecastFn: Send + Sync {
    /// The rule type name, e.g. "ewmac".
    fn rule_type(&self) -> &'static str;

    /// Unscaled forecast series for a price history.
    fn forecast(&self, prices: &TimeSeries) -> Result<TimeSeries, SeriesError>;
}

/// One named rule instance.
pub struct TradingRule {
    name: RuleName,
    func: Box<dyn ForecastFn>,
}

impl TradingRule {
    pub fn new(name: impl Into<RuleName>, func: Box<dyn ForecastFn>) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    pub fn name(&self) -> &RuleName {
        &self.name
    }

    pub fn rule_type(&self) -> &'static str {
        self.func.rule_type()
    }

    pub fn forecast(&self, prices: &TimeSeries) -> Result<TimeSeries, SeriesError> {
        self.func.forecast(prices)
    }
}

impl std::fmt::Debug for TradingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingRule")
            .field("name", &self.name)
            .field("rule_type", &self.func.rule_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    struct AlwaysTen;

    impl ForecastFn for AlwaysTen {
        fn rule_type(&self) -> &'static str {
            "always_ten"
        }

        fn forecast(&self, prices: &TimeSeries) -> Result<TimeSeries, SeriesError> {
            Ok(prices.map(|_| 10.0))
        }
    }

    #[test]
    fn trading_rule_delegates_to_its_function() {
        let rule = TradingRule::new("ten", Box::new(AlwaysTen));
        let prices = TimeSeries::daily_from(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            &[1.0, 2.0, 3.0],
        );
        let forecast = rule.forecast(&prices).unwrap();
        assert!(forecast.values().all(|v| v == 10.0));
        assert_eq!(rule.name().as_str(), "ten");
        assert_eq!(rule.rule_type(), "always_ten");
    }
}
