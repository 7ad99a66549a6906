//! Indicator pass: enrich a candle slice in place before the engine runs.

pub mod ema;
pub mod rsi;

use crate::candle::Candle;
use crate::config::StrategyParams;

/// Run the full indicator pass for one strategy configuration.
pub fn enrich(candles: &mut [Candle], params: &StrategyParams) {
    rsi::compute(candles, params.rsi_period);
    ema::compute(candles, params.ema_period);
}
