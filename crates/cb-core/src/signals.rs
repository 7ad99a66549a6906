//! Pure entry/exit predicates. The engine owns all state; everything here is
//! a function of the current bar, its two predecessors, and the params.

use crate::config::RsiReversalMode;
use crate::position::Direction;

/// RSI reversal entry trigger.
///
/// The zone test always runs on `prev1`: below oversold for longs, above
/// overbought for shorts. The mode controls how many agreeing RSI steps are
/// required on top of that.
pub fn rsi_reversal(
    mode: RsiReversalMode,
    direction: Direction,
    rsi: f64,
    rsi_prev1: f64,
    rsi_prev2: f64,
    oversold: f64,
    overbought: f64,
) -> bool {
    match direction {
        Direction::Long => {
            let in_zone = rsi_prev1 < oversold;
            match mode {
                RsiReversalMode::Strict => in_zone && rsi > rsi_prev1 && rsi_prev1 > rsi_prev2,
                RsiReversalMode::Relaxed => in_zone && rsi > rsi_prev1,
                RsiReversalMode::ZoneOnly => in_zone,
            }
        }
        Direction::Short => {
            let in_zone = rsi_prev1 > overbought;
            match mode {
                RsiReversalMode::Strict => in_zone && rsi < rsi_prev1 && rsi_prev1 < rsi_prev2,
                RsiReversalMode::Relaxed => in_zone && rsi < rsi_prev1,
                RsiReversalMode::ZoneOnly => in_zone,
            }
        }
    }
}

/// EMA distance filter: price must sit at least `distance_percent` of close
/// on the adverse side of the EMA (below for longs, above for shorts).
pub fn ema_distance_ok(direction: Direction, close: f64, ema: f64, distance_percent: f64) -> bool {
    match direction {
        Direction::Long => ema > close * (1.0 + distance_percent / 100.0),
        Direction::Short => ema < close * (1.0 - distance_percent / 100.0),
    }
}

/// EMA cross from the favorable to the unfavorable side between the previous
/// and current bar. For longs: close was above EMA, now at or below it.
pub fn ema_cross_exit(
    direction: Direction,
    prev_close: f64,
    prev_ema: f64,
    close: f64,
    ema: f64,
) -> bool {
    match direction {
        Direction::Long => prev_close > prev_ema && close <= ema,
        Direction::Short => prev_close < prev_ema && close >= ema,
    }
}

/// Recovery cross arming the averaging step: price crosses back through the
/// EMA in the position's favor.
pub fn ema_cross_recovery(
    direction: Direction,
    prev_close: f64,
    prev_ema: f64,
    close: f64,
    ema: f64,
) -> bool {
    match direction {
        Direction::Long => prev_close <= prev_ema && close > ema,
        Direction::Short => prev_close >= prev_ema && close < ema,
    }
}

// ---------------------------------------------------------------------------
