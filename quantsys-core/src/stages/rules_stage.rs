//! Rules stage — raw forecasts from trading rules.
//!
//! Holds the rule set: either passed directly at construction, or (when the
//! direct set is empty) resolved from the configuration's `trading_rules`
//! entries through the rule factory. Direct rules take precedence over
//! configuration-sourced ones — if any were supplied, configuration is not
//! consulted at all.

use super::{names, CallArgs, OpArity, OpSpec, Stage, StageValue};
use crate::domain::RuleName;
use crate::rules::{create_rule, TradingRule};
use crate::system::{System, SystemError};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const OP_RAW_FORECAST: &str = "get_raw_forecast";
pub const OP_RULE_NAMES: &str = "get_rule_names";

static OPS: [OpSpec; 2] = [
    OpSpec::new(OP_RAW_FORECAST, OpArity::InstrumentRule),
    OpSpec::new(OP_RULE_NAMES, OpArity::None),
];

pub struct Rules {
    direct: BTreeMap<RuleName, TradingRule>,
}

impl Rules {
    /// Stage with a direct rule set.
    pub fn new(rules: Vec<TradingRule>) -> Self {
        let direct = rules
            .into_iter()
            .map(|r| (r.name().clone(), r))
            .collect();
        Self { direct }
    }

    /// Stage with no direct rules; the configuration supplies them.
    pub fn empty() -> Self {
        Self {
            direct: BTreeMap::new(),
        }
    }

    fn rule_names(&self, sys: &System) -> Vec<String> {
        if !self.direct.is_empty() {
            return self.direct.keys().map(|n| n.to_string()).collect();
        }
        sys.config()
            .trading_rules
            .as_ref()
            .map(|rules| rules.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn raw_forecast(
        &self,
        sys: &System,
        args: &CallArgs,
    ) -> Result<StageValue, SystemError> {
        let instrument = args.require_instrument()?;
        let rule_name = args.require_rule()?;
        let prices = sys.data().price_series(instrument)?;

        let forecast = if !self.direct.is_empty() {
            let rule = self.direct.get(rule_name).ok_or_else(|| {
                SystemError::NotFound(format!("trading rule '{rule_name}'"))
            })?;
            rule.forecast(&prices)?
        } else {
            let configured = sys
                .config()
                .trading_rules
                .as_ref()
                .and_then(|rules| rules.get(rule_name.as_str()))
                .ok_or_else(|| {
                    SystemError::NotFound(format!("trading rule '{rule_name}'"))
                })?;
            let rule = create_rule(rule_name.as_str(), configured)?;
            rule.forecast(&prices)?
        };

        Ok(StageValue::Series(Arc::new(forecast)))
    }
}

impl Stage for Rules {
    fn name(&self) -> &'static str {
        names::RULES
    }

    fn ops(&self) -> &'static [OpSpec] {
        &OPS
    }

    fn call(&self, sys: &System, op: &str, args: &CallArgs) -> Result<StageValue, SystemError> {
        match op {
            OP_RAW_FORECAST => self.raw_forecast(sys, args),
            OP_RULE_NAMES => Ok(StageValue::Names(self.rule_names(sys))),
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
    use crate::config::{Config, RuleConfig};
    use crate::data::InMemoryProvider;
    use crate::domain::TimeSeries;
    use crate::rules::Ewmac;
    use chrono::NaiveDate;

    fn provider() -> Arc<InMemoryProvider> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let values: Vec<f64> = (0..300).map(|i| 100.0 + i as f64 * 0.3).collect();
        Arc::new(InMemoryProvider::new().add(
            "EDOLLAR",
            TimeSeries::daily_from(start, &values),
            "USD",
            2500.0,
        ))
    }

    fn ewmac_rule(name: &str, lfast: usize, lslow: usize) -> TradingRule {
        TradingRule::new(name, Box::new(Ewmac::new(lfast, lslow)))
    }

    #[test]
    fn direct_rules_produce_forecasts() {
        let sys = System::with_defaults(
            vec![Box::new(Rules::new(vec![ewmac_rule("ewmac8", 8, 32)]))],
            provider(),
        )
        .unwrap();

        let forecast = sys.raw_forecast(&"EDOLLAR".into(), &"ewmac8".into()).unwrap();
        assert!(!forecast.is_empty());
    }

    #[test]
    fn config_rules_used_when_no_direct_rules() {
        let mut config = Config::default();
        let mut rules = BTreeMap::new();
        rules.insert(
            "ewmac32".to_string(),
            RuleConfig {
                rule_type: "ewmac".to_string(),
                params: [("lfast".to_string(), 32.0), ("lslow".to_string(), 128.0)]
                    .into_iter()
                    .collect(),
            },
        );
        config.trading_rules = Some(rules);

        let sys = System::new(vec![Box::new(Rules::empty())], provider(), config).unwrap();
        assert!(sys.raw_forecast(&"EDOLLAR".into(), &"ewmac32".into()).is_ok());
        assert_eq!(sys.rule_names().unwrap(), vec!["ewmac32".to_string()]);
    }

    #[test]
    fn direct_rules_shadow_config_rules() {
        let mut config = Config::default();
        let mut rules = BTreeMap::new();
        rules.insert(
            "from_config".to_string(),
            RuleConfig {
                rule_type: "ewmac".to_string(),
                params: BTreeMap::new(),
            },
        );
        config.trading_rules = Some(rules);

        let sys = System::new(
            vec![Box::new(Rules::new(vec![ewmac_rule("direct", 8, 32)]))],
            provider(),
            config,
        )
        .unwrap();

        // Config-sourced rule is invisible; direct rule is served.
        assert!(sys
            .raw_forecast(&"EDOLLAR".into(), &"from_config".into())
            .is_err());
        assert!(sys.raw_forecast(&"EDOLLAR".into(), &"direct".into()).is_ok());
        assert_eq!(sys.rule_names().unwrap(), vec!["direct".to_string()]);
    }

    #[test]
    fn unknown_rule_is_not_found() {
        let sys = System::with_defaults(
            vec![Box::new(Rules::new(vec![ewmac_rule("ewmac8", 8, 32)]))],
            provider(),
        )
        .unwrap();

        let err = sys
            .raw_forecast(&"EDOLLAR".into(), &"missing".into())
            .unwrap_err();
        assert!(matches!(err, SystemError::NotFound(_)));
    }

    #[test]
    fn unknown_instrument_is_data_error() {
        let sys = System::with_defaults(
            vec![Box::new(Rules::new(vec![ewmac_rule("ewmac8", 8, 32)]))],
            provider(),
        )
        .unwrap();

        let err = sys
            .raw_forecast(&"GHOST".into(), &"ewmac8".into())
            .unwrap_err();
        assert!(matches!(err, SystemError::Data(_)));
    }
}
