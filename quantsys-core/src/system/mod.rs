//! The orchestrator — stage registry, accessor dispatch, and cache
//! ownership.
//!
//! A `System` is built once from an ordered list of stages, a data provider,
//! and a configuration store. The list order never affects results
//! (dispatch is by name); duplicate names and unsatisfiable dependencies
//! fail construction. Stages reach each other exclusively through
//! `System::accessor`, which validates the call, consults the memoization
//! cache, and only then dispatches to the owning stage.

mod cache;

pub use cache::{CacheStats, CallKey, MemoCache};

use crate::config::Config;
use crate::data::{DataError, DataProvider};
use crate::domain::{InstrumentCode, InstrumentSizing, RuleName, SeriesError, TimeSeries};
use crate::estimate::EstimationError;
use crate::rules::RuleFactoryError;
use crate::stages::{
    account, forecast_combine, forecast_scale_cap, names, portfolio, position_sizing, rules_stage,
    AccountCurve, CallArgs, Stage, StageValue,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by system construction and accessor evaluation.
///
/// `Clone` because a cached failure may be handed to several blocked
/// callers.
#[derive(Debug, Clone, Error)]
pub enum SystemError {
    #[error("duplicate stage name '{0}' at system construction")]
    DuplicateStage(String),

    #[error("stage '{stage}' depends on '{missing}', which is not registered")]
    MissingDependency { stage: String, missing: String },

    #[error("no stage registered under name '{0}'")]
    UnknownStage(String),

    #[error("stage '{stage}' has no operation '{op}'")]
    UnknownOp { stage: String, op: String },

    #[error("'{stage}.{op}' takes {expected}, called with {got}")]
    BadArgs {
        stage: String,
        op: String,
        expected: &'static str,
        got: String,
    },

    #[error("cyclic dependency: '{0}' requested while still being computed on the same thread")]
    CyclicDependency(String),

    #[error("computation of '{0}' panicked")]
    Panicked(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("accessor '{key}' returned {actual}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("estimation failed: {0}")]
    Estimation(#[from] EstimationError),

    #[error("rule construction failed: {0}")]
    RuleFactory(#[from] RuleFactoryError),

    #[error(transparent)]
    Series(#[from] SeriesError),
}

pub struct System {
    stages: BTreeMap<&'static str, Box<dyn Stage>>,
    data: Arc<dyn DataProvider>,
    config: Config,
    config_hash: String,
    cache: MemoCache,
}

impl System {
    /// Build a system from an ordered stage list, a data provider, and a
    /// configuration store.
    pub fn new(
        stages: Vec<Box<dyn Stage>>,
        data: Arc<dyn DataProvider>,
        config: Config,
    ) -> Result<Self, SystemError> {
        let mut registry: BTreeMap<&'static str, Box<dyn Stage>> = BTreeMap::new();
        for stage in stages {
            let name = stage.name();
            if registry.contains_key(name) {
                return Err(SystemError::DuplicateStage(name.to_string()));
            }
            registry.insert(name, stage);
        }

        for stage in registry.values() {
            for dep in stage.depends_on() {
                if !registry.contains_key(dep) {
                    return Err(SystemError::MissingDependency {
                        stage: stage.name().to_string(),
                        missing: dep.to_string(),
                    });
                }
            }
        }

        let config_hash = config.snapshot_hash();
        tracing::info!(
            stages = ?registry.keys().collect::<Vec<_>>(),
            provider = data.name(),
            config = %config_hash,
            "system built"
        );

        Ok(Self {
            stages: registry,
            data,
            config,
            config_hash,
            cache: MemoCache::new(),
        })
    }

    /// Build with an all-defaults configuration store.
    pub fn with_defaults(
        stages: Vec<Box<dyn Stage>>,
        data: Arc<dyn DataProvider>,
    ) -> Result<Self, SystemError> {
        Self::new(stages, data, Config::default())
    }

    pub fn data(&self) -> &dyn DataProvider {
        self.data.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Hash of the configuration snapshot current cache entries derive from.
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Mutate the configuration. Every cached value is invalidated, since
    /// configuration is an implicit input to all of them. Requires `&mut`,
    /// so no accessor can run concurrently.
    pub fn update_config(&mut self, mutate: impl FnOnce(&mut Config)) {
        mutate(&mut self.config);
        self.config_hash = self.config.snapshot_hash();
        self.cache.invalidate_all();
        tracing::info!(config = %self.config_hash, "configuration updated, cache cleared");
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.keys().copied().collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Snapshot hash recorded with a completed cache entry, if present.
    pub fn entry_snapshot(&self, stage: &str, op: &str, args: &CallArgs) -> Option<String> {
        self.cache
            .entry_snapshot(&CallKey::new(stage, op, args.clone()))
    }

    /// Route one accessor call: validate, then return cached or compute.
    pub fn accessor(
        &self,
        stage_name: &str,
        op: &str,
        args: &CallArgs,
    ) -> Result<StageValue, SystemError> {
        let stage = self
            .stages
            .get(stage_name)
            .ok_or_else(|| SystemError::UnknownStage(stage_name.to_string()))?;

        let spec = stage
            .ops()
            .iter()
            .find(|spec| spec.name == op)
            .ok_or_else(|| SystemError::UnknownOp {
                stage: stage_name.to_string(),
                op: op.to_string(),
            })?;

        if !spec.arity.matches(args) {
            return Err(SystemError::BadArgs {
                stage: stage_name.to_string(),
                op: op.to_string(),
                expected: spec.arity.describe(),
                got: args.to_string(),
            });
        }

        let key = CallKey::new(stage_name, op, args.clone());
        self.cache
            .get_or_compute(key, &self.config_hash, || stage.call(self, op, args))
    }

    // ── Typed accessor wrappers, mirroring the user-facing surface ───

    pub fn raw_forecast(
        &self,
        instrument: &InstrumentCode,
        rule: &RuleName,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::RULES,
            rules_stage::OP_RAW_FORECAST,
            CallArgs::instrument_rule(instrument.clone(), rule.clone()),
        )
    }

    pub fn rule_names(&self) -> Result<Vec<String>, SystemError> {
        let args = CallArgs::none();
        let key = qualified(names::RULES, rules_stage::OP_RULE_NAMES, &args);
        self.accessor(names::RULES, rules_stage::OP_RULE_NAMES, &args)?
            .into_names(&key)
    }

    pub fn forecast_scalar(
        &self,
        instrument: &InstrumentCode,
        rule: &RuleName,
    ) -> Result<f64, SystemError> {
        self.scalar(
            names::FORECAST_SCALE_CAP,
            forecast_scale_cap::OP_FORECAST_SCALAR,
            CallArgs::instrument_rule(instrument.clone(), rule.clone()),
        )
    }

    pub fn scaled_forecast(
        &self,
        instrument: &InstrumentCode,
        rule: &RuleName,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::FORECAST_SCALE_CAP,
            forecast_scale_cap::OP_SCALED_FORECAST,
            CallArgs::instrument_rule(instrument.clone(), rule.clone()),
        )
    }

    pub fn capped_forecast(
        &self,
        instrument: &InstrumentCode,
        rule: &RuleName,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::FORECAST_SCALE_CAP,
            forecast_scale_cap::OP_CAPPED_FORECAST,
            CallArgs::instrument_rule(instrument.clone(), rule.clone()),
        )
    }

    pub fn combined_forecast(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::COMB_FORECAST,
            forecast_combine::OP_COMBINED_FORECAST,
            CallArgs::instrument(instrument.clone()),
        )
    }

    pub fn forecast_weights(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<BTreeMap<String, f64>, SystemError> {
        let args = CallArgs::instrument(instrument.clone());
        let key = qualified(names::COMB_FORECAST, forecast_combine::OP_FORECAST_WEIGHTS, &args);
        self.accessor(names::COMB_FORECAST, forecast_combine::OP_FORECAST_WEIGHTS, &args)?
            .into_weights(&key)
    }

    pub fn forecast_div_multiplier(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<f64, SystemError> {
        self.scalar(
            names::COMB_FORECAST,
            forecast_combine::OP_FDM,
            CallArgs::instrument(instrument.clone()),
        )
    }

    pub fn price_volatility(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::POSITION_SIZE,
            position_sizing::OP_PRICE_VOL,
            CallArgs::instrument(instrument.clone()),
        )
    }

    pub fn block_value(&self, instrument: &InstrumentCode) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::POSITION_SIZE,
            position_sizing::OP_BLOCK_VALUE,
            CallArgs::instrument(instrument.clone()),
        )
    }

    pub fn instrument_sizing_data(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<InstrumentSizing, SystemError> {
        let args = CallArgs::instrument(instrument.clone());
        let key = qualified(names::POSITION_SIZE, position_sizing::OP_SIZING, &args);
        self.accessor(names::POSITION_SIZE, position_sizing::OP_SIZING, &args)?
            .into_sizing(&key)
    }

    pub fn instrument_value_vol(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::POSITION_SIZE,
            position_sizing::OP_VALUE_VOL,
            CallArgs::instrument(instrument.clone()),
        )
    }

    pub fn volatility_scalar(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::POSITION_SIZE,
            position_sizing::OP_VOL_SCALAR,
            CallArgs::instrument(instrument.clone()),
        )
    }

    pub fn daily_cash_vol_target(&self) -> Result<f64, SystemError> {
        self.scalar(
            names::POSITION_SIZE,
            position_sizing::OP_CASH_VOL_TARGET,
            CallArgs::none(),
        )
    }

    pub fn subsystem_position(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::POSITION_SIZE,
            position_sizing::OP_SUBSYSTEM_POSITION,
            CallArgs::instrument(instrument.clone()),
        )
    }

    pub fn instrument_weights(&self) -> Result<BTreeMap<String, f64>, SystemError> {
        let args = CallArgs::none();
        let key = qualified(names::PORTFOLIO, portfolio::OP_INSTRUMENT_WEIGHTS, &args);
        self.accessor(names::PORTFOLIO, portfolio::OP_INSTRUMENT_WEIGHTS, &args)?
            .into_weights(&key)
    }

    pub fn instrument_div_multiplier(&self) -> Result<f64, SystemError> {
        self.scalar(names::PORTFOLIO, portfolio::OP_IDM, CallArgs::none())
    }

    pub fn notional_position(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::PORTFOLIO,
            portfolio::OP_NOTIONAL_POSITION,
            CallArgs::instrument(instrument.clone()),
        )
    }

    pub fn instrument_pnl(
        &self,
        instrument: &InstrumentCode,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        self.series(
            names::ACCOUNTS,
            account::OP_INSTRUMENT_PNL,
            CallArgs::instrument(instrument.clone()),
        )
    }

    /// Portfolio-level P&L curve with summary statistics — the terminal
    /// consumer of every upstream stage.
    pub fn portfolio_curve(&self) -> Result<Arc<AccountCurve>, SystemError> {
        let args = CallArgs::none();
        let key = qualified(names::ACCOUNTS, account::OP_PORTFOLIO, &args);
        self.accessor(names::ACCOUNTS, account::OP_PORTFOLIO, &args)?
            .into_curve(&key)
    }

    // ── Shared extraction helpers ────────────────────────────────────

    fn series(
        &self,
        stage: &str,
        op: &str,
        args: CallArgs,
    ) -> Result<Arc<TimeSeries>, SystemError> {
        let key = qualified(stage, op, &args);
        self.accessor(stage, op, &args)?.into_series(&key)
    }

    fn scalar(&self, stage: &str, op: &str, args: CallArgs) -> Result<f64, SystemError> {
        let key = qualified(stage, op, &args);
        self.accessor(stage, op, &args)?.into_scalar(&key)
    }
}

fn qualified(stage: &str, op: &str, args: &CallArgs) -> String {
    format!("{stage}.{op}{args}")
}
