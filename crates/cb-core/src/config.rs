//! Strategy and time-shift parameters.
//!
//! Everything is `#[serde(default)]` so a config file only needs to name the
//! fields it overrides. `validate()` is called once at the top of each run.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// How much confirmation the RSI reversal entry requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiReversalMode {
    /// Zone on prev1 plus two agreeing RSI steps (prev2 -> prev1 -> current).
    Strict,
    /// Zone on prev1 plus one agreeing step (prev1 -> current).
    Relaxed,
    /// Zone on prev1 alone.
    ZoneOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_reversal_mode: RsiReversalMode,
    pub ema_period: usize,
    /// Minimum distance (percent of close) price must sit on the adverse side
    /// of the EMA for an entry to qualify.
    pub ema_distance_percent: f64,
    /// Net-of-nothing gross PnL floor for an EMA-cross exit, percent.
    pub min_profit_percent: f64,
    /// Adverse move from entry (percent) that arms the averaging step.
    pub averaging_threshold: f64,
    /// Cycle total PnL (percent) above which every open slot is liquidated.
    pub cycle_profit_threshold: f64,
    /// Round-trip commission, percent of full size. Charged pro rata to the
    /// slot's size fraction on exit.
    pub commission_percent: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 35.0,
            rsi_overbought: 65.0,
            rsi_reversal_mode: RsiReversalMode::Strict,
            ema_period: 50,
            ema_distance_percent: 0.15,
            min_profit_percent: 0.5,
            averaging_threshold: 0.5,
            cycle_profit_threshold: 0.5,
            commission_percent: 0.1,
        }
    }
}

impl StrategyParams {
    pub fn validate(&self) -> SimResult<()> {
        if self.rsi_period < 2 {
            return Err(SimError::Config("rsi_period must be at least 2".into()));
        }
        if self.ema_period < 1 {
            return Err(SimError::Config("ema_period must be at least 1".into()));
        }
        if !(self.rsi_oversold < self.rsi_overbought) {
            return Err(SimError::Config(format!(
                "rsi_oversold ({}) must be below rsi_overbought ({})",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        for (name, v) in [
            ("ema_distance_percent", self.ema_distance_percent),
            ("min_profit_percent", self.min_profit_percent),
            ("averaging_threshold", self.averaging_threshold),
            ("cycle_profit_threshold", self.cycle_profit_threshold),
            ("commission_percent", self.commission_percent),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(SimError::Config(format!(
                    "{name} must be finite and non-negative, got {v}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeShiftParams {
    pub enabled: bool,
    /// Number of equal deposit tranches.
    pub deposit_parts: usize,
    /// Calendar spacing between tranche entries.
    pub entry_interval_days: f64,
}

impl Default for TimeShiftParams {
    fn default() -> Self {
        Self {
            enabled: false,
            deposit_parts: 10,
            entry_interval_days: 7.0,
        }
    }
}

impl TimeShiftParams {
    pub fn validate(&self) -> SimResult<()> {
        if self.deposit_parts == 0 {
            return Err(SimError::Config("deposit_parts must be at least 1".into()));
        }
        if !self.entry_interval_days.is_finite() || self.entry_interval_days <= 0.0 {
            return Err(SimError::Config(format!(
                "entry_interval_days must be positive, got {}",
                self.entry_interval_days
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        StrategyParams::default().validate().unwrap();
        TimeShiftParams::default().validate().unwrap();
    }

    #[test]
    fn inverted_rsi_zones_rejected() {
        let params = StrategyParams {
            rsi_oversold: 70.0,
            rsi_overbought: 30.0,
            ..StrategyParams::default()
        };
        assert!(matches!(params.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn negative_commission_rejected() {
        let params = StrategyParams {
            commission_percent: -0.1,
            ..StrategyParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn zero_parts_rejected() {
        let shift = TimeShiftParams {
            deposit_parts: 0,
            ..TimeShiftParams::default()
        };
        assert!(shift.validate().is_err());
    }

    #[test]
    fn reversal_mode_parses_snake_case() {
        let mode: RsiReversalMode = serde_json::from_str("\"zone_only\"").unwrap();
        assert_eq!(mode, RsiReversalMode::ZoneOnly);
    }
}
