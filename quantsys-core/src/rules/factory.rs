//! Rule factory — converts configuration `RuleConfig` entries into live
//! `TradingRule` instances.

use super::{Ewmac, TradingRule};
use crate::config::RuleConfig;

/// Errors from rule construction.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RuleFactoryError {
    #[error("unknown rule type: {0}")]
    UnknownRuleType(String),

    #[error("bad parameter for rule type '{rule_type}': {reason}")]
    BadParameter { rule_type: String, reason: String },
}

/// Extract a named usize parameter, falling back to `default`. Configured
/// values must be non-negative integers; fractional or negative values are
/// rejected rather than truncated.
fn param_usize(
    config: &RuleConfig,
    name: &str,
    default: usize,
) -> Result<usize, RuleFactoryError> {
    match config.params.get(name).copied() {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(v) => Err(RuleFactoryError::BadParameter {
            rule_type: config.rule_type.clone(),
            reason: format!("'{name}' must be a non-negative integer, got {v}"),
        }),
    }
}

/// Create a trading rule from its configured declaration.
pub fn create_rule(name: &str, config: &RuleConfig) -> Result<TradingRule, RuleFactoryError> {
    match config.rule_type.as_str() {
        "ewmac" => {
            let lfast = param_usize(config, "lfast", 32)?;
            let lslow = param_usize(config, "lslow", 128)?;
            if lfast < 1 || lslow <= lfast {
                return Err(RuleFactoryError::BadParameter {
                    rule_type: "ewmac".into(),
                    reason: format!("need 1 <= lfast < lslow, got lfast={lfast} lslow={lslow}"),
                });
            }
            Ok(TradingRule::new(name, Box::new(Ewmac::new(lfast, lslow))))
        }
        other => Err(RuleFactoryError::UnknownRuleType(other.to_string())),
    }
}
