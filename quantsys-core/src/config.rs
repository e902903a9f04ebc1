//! Layered configuration store.
//!
//! Every tunable is an `Option`: `None` is a first-class "unset" state,
//! distinct from an explicit zero or empty map. Stages resolve a parameter
//! as explicit config → (estimated variants only) statistical estimate →
//! built-in default, and never mix layers inside one value.
//!
//! A `Config` is read-only once a `System` owns it; the only mutation path
//! is `System::update_config`, which invalidates the whole cache. The
//! snapshot hash here is the provenance tag cache entries carry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Built-in fallbacks, used when a parameter is neither configured nor
/// estimated.
pub mod defaults {
    /// Symmetric bound on scaled forecasts.
    pub const FORECAST_CAP: f64 = 20.0;
    /// The forecast value treated as "average strength" when sizing.
    pub const AVERAGE_ABS_FORECAST: f64 = 10.0;
    /// Forecast scalar when nothing is configured or estimated.
    pub const FORECAST_SCALAR: f64 = 1.0;
    pub const FORECAST_DIV_MULTIPLIER: f64 = 1.0;
    pub const INSTRUMENT_DIV_MULTIPLIER: f64 = 1.0;
    /// Annualized volatility target, percent of capital.
    pub const PERCENTAGE_VOL_TARGET: f64 = 16.0;
    pub const NOTIONAL_TRADING_CAPITAL: f64 = 1_000_000.0;
    pub const BASE_CURRENCY: &str = "USD";
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Declaration of one trading-rule instance in configuration: the rule type
/// plus its numeric parameters. The rule factory turns this into a live
/// forecast function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub rule_type: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

/// The configuration document. All fields optional; see [`defaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Rule name → rule declaration. Used by the rules stage when it was
    /// constructed without a direct rule set.
    pub trading_rules: Option<BTreeMap<String, RuleConfig>>,

    /// Rule name → fixed forecast scalar.
    pub forecast_scalars: Option<BTreeMap<String, f64>>,

    /// Symmetric forecast cap.
    pub forecast_cap: Option<f64>,

    /// Rule name → forecast weight (re-normalized to sum 1 on use).
    pub forecast_weights: Option<BTreeMap<String, f64>>,

    pub forecast_div_multiplier: Option<f64>,

    /// Instrument code → portfolio weight (re-normalized to sum 1 on use).
    pub instrument_weights: Option<BTreeMap<String, f64>>,

    pub instrument_div_multiplier: Option<f64>,

    /// Annualized volatility target as a percentage of capital.
    pub percentage_vol_target: Option<f64>,

    pub notional_trading_capital: Option<f64>,

    pub base_currency: Option<String>,
}

impl Config {
    /// Parse from a TOML document. Unknown keys are ignored so callers can
    /// keep application-level sections in the same file.
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        toml::from_str(doc).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let doc = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&doc)
    }

    /// blake3 hex digest of the canonical JSON rendering.
    ///
    /// BTreeMap fields give deterministic key order, so equal configs hash
    /// equal across builds and platforms.
    pub fn snapshot_hash(&self) -> String {
        let json = serde_json::to_string(self).expect("Config must serialize");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    // ── Resolved getters: explicit value or built-in default ─────────

    pub fn forecast_cap_or_default(&self) -> f64 {
        self.forecast_cap.unwrap_or(defaults::FORECAST_CAP)
    }

    pub fn forecast_div_multiplier_or_default(&self) -> f64 {
        self.forecast_div_multiplier
            .unwrap_or(defaults::FORECAST_DIV_MULTIPLIER)
    }

    pub fn instrument_div_multiplier_or_default(&self) -> f64 {
        self.instrument_div_multiplier
            .unwrap_or(defaults::INSTRUMENT_DIV_MULTIPLIER)
    }

    pub fn percentage_vol_target_or_default(&self) -> f64 {
        self.percentage_vol_target
            .unwrap_or(defaults::PERCENTAGE_VOL_TARGET)
    }

    pub fn notional_trading_capital_or_default(&self) -> f64 {
        self.notional_trading_capital
            .unwrap_or(defaults::NOTIONAL_TRADING_CAPITAL)
    }

    pub fn base_currency_or_default(&self) -> &str {
        self.base_currency
            .as_deref()
            .unwrap_or(defaults::BASE_CURRENCY)
    }

    /// Explicit forecast scalar for a rule, if one is configured.
    pub fn explicit_forecast_scalar(&self, rule: &str) -> Option<f64> {
        self.forecast_scalars.as_ref()?.get(rule).copied()
    }

    /// Explicit forecast weight map, if configured (not yet normalized).
    pub fn explicit_forecast_weights(&self) -> Option<&BTreeMap<String, f64>> {
        self.forecast_weights.as_ref()
    }

    pub fn explicit_instrument_weights(&self) -> Option<&BTreeMap<String, f64>> {
        self.instrument_weights.as_ref()
    }
}
