//! Combined long + short strategy replay.
//!
//! One pass over the candle series from index 2, with a fixed per-candle
//! order: warm-up skip, mark-to-market, cycle PnL check (a forced closure
//! consumes the candle), long exit-or-averaging, short exit-or-averaging,
//! long entry, short entry. A slot that exits on a candle does not re-enter
//! on the same candle.

use serde::Serialize;

use crate::candle::Candle;
use crate::config::StrategyParams;
use crate::cycle::{Cycle, CycleAction, CycleManager};
use crate::error::{SimError, SimResult};
use crate::position::{Direction, Position, EXIT_EMA_TOUCH};
use crate::signals;

/// Everything a single replay produces.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedRun {
    pub cycles: Vec<Cycle>,
    pub long_closed: Vec<Position>,
    pub short_closed: Vec<Position>,
    /// Closed trades from both directions in close order.
    pub all_closed: Vec<Position>,
    pub open_long: Option<Position>,
    pub open_short: Option<Position>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    pub forced_closures: u32,
}

pub fn run_combined(candles: &[Candle], params: &StrategyParams) -> SimResult<CombinedRun> {
    params.validate()?;
    if candles.is_empty() {
        return Err(SimError::Data("empty candle series".into()));
    }
    if let Some(w) = candles.windows(2).find(|w| w[0].timestamp_ms > w[1].timestamp_ms) {
        return Err(SimError::Data(format!(
            "candles not in chronological order near timestamp {}",
            w[0].timestamp_ms
        )));
    }

    let mut manager = CycleManager::new(params.cycle_profit_threshold, params.commission_percent);
    manager.start_new_cycle(&candles[0]);

    let mut open_long: Option<Position> = None;
    let mut open_short: Option<Position> = None;
    let mut long_closed: Vec<Position> = Vec::new();
    let mut short_closed: Vec<Position> = Vec::new();
    let mut all_closed: Vec<Position> = Vec::new();
    let mut forced_closures: u32 = 0;

    for i in 2..candles.len() {
        let current = &candles[i];
        let prev1 = &candles[i - 1];
        let prev2 = &candles[i - 2];

        // Warm-up: every indicator on the current bar and both predecessors
        // must exist, or the bar is skipped outright.
        let (Some(rsi), Some(rsi_p1), Some(rsi_p2), Some(ema), Some(ema_p1)) =
            (current.rsi, prev1.rsi, prev2.rsi, current.ema, prev1.ema)
        else {
            continue;
        };
        if prev2.ema.is_none() {
            continue;
        }

        if let Some(pos) = open_long.as_mut() {
            pos.mark_to_market(current);
        }
        if let Some(pos) = open_short.as_mut() {
            pos.mark_to_market(current);
        }

        let check = manager.check_cycle_pnl(open_long.as_ref(), open_short.as_ref(), current);
        if check.should_force_close {
            force_close(
                &mut manager,
                &mut open_long,
                &mut open_short,
                current,
                &mut long_closed,
                &mut short_closed,
                &mut all_closed,
                &mut forced_closures,
            );
            continue;
        }

        let mut long_exited = false;
        let mut short_exited = false;

        // --- long slot: exit, else averaging -------------------------------
        let close_long = open_long.as_ref().map_or(false, |pos| {
            signals::ema_cross_exit(Direction::Long, prev1.close, ema_p1, current.close, ema)
                && pos.pnl_percent_at(current.close) >= params.min_profit_percent
        });
        if close_long {
            if let Some(mut pos) = open_long.take() {
                pos.opposite_on_exit = open_short.as_ref().map(Position::snapshot);
                pos.close_at(current, EXIT_EMA_TOUCH, params.commission_percent);
                manager.record_closed_trade(&pos);
                manager.log_event(
                    CycleAction::LongClosed,
                    &format!(
                        "entry {} -> exit {} ({:+.4}%)",
                        pos.entry_price,
                        current.close,
                        pos.pnl_percent.unwrap_or(0.0)
                    ),
                    Some(current.close),
                    pos.pnl_percent,
                    None,
                    open_short.as_ref(),
                );
                long_closed.push(pos.clone());
                all_closed.push(pos);
            }
            long_exited = true;
            // Realizing a profit can push the cycle over the threshold on
            // the same candle; that closure also consumes the candle.
            let post = manager.check_cycle_pnl(None, open_short.as_ref(), current);
            if post.should_force_close {
                force_close(
                    &mut manager,
                    &mut open_long,
                    &mut open_short,
                    current,
                    &mut long_closed,
                    &mut short_closed,
                    &mut all_closed,
                    &mut forced_closures,
                );
                continue;
            }
        } else {
            let average_long = open_long.as_ref().map_or(false, |pos| {
                !pos.has_averaging
                    && pos.adverse_move_percent(current.close) >= params.averaging_threshold
                    && signals::ema_cross_recovery(
                        Direction::Long,
                        prev1.close,
                        ema_p1,
                        current.close,
                        ema,
                    )
            });
            if average_long {
                let mut detail = String::new();
                if let Some(pos) = open_long.as_mut() {
                    let adverse = pos.adverse_move_percent(current.close);
                    pos.apply_averaging(current);
                    pos.mark_to_market(current);
                    detail = format!(
                        "{} + {} -> avg {} (drawdown {:.2}%)",
                        pos.entry_price, current.close, pos.average_price, adverse
                    );
                }
                if let Some(pos) = open_long.as_ref() {
                    manager.sync_open_trade(pos);
                }
                manager.log_event(
                    CycleAction::LongAveraging,
                    &detail,
                    Some(current.close),
                    None,
                    open_long.as_ref(),
                    open_short.as_ref(),
                );
            }
        }

        // --- short slot: exit, else averaging ------------------------------
        let close_short = open_short.as_ref().map_or(false, |pos| {
            signals::ema_cross_exit(Direction::Short, prev1.close, ema_p1, current.close, ema)
                && pos.pnl_percent_at(current.close) >= params.min_profit_percent
        });
        if close_short {
            if let Some(mut pos) = open_short.take() {
                pos.opposite_on_exit = open_long.as_ref().map(Position::snapshot);
                pos.close_at(current, EXIT_EMA_TOUCH, params.commission_percent);
                manager.record_closed_trade(&pos);
                manager.log_event(
                    CycleAction::ShortClosed,
                    &format!(
                        "entry {} -> exit {} ({:+.4}%)",
                        pos.entry_price,
                        current.close,
                        pos.pnl_percent.unwrap_or(0.0)
                    ),
                    Some(current.close),
                    pos.pnl_percent,
                    open_long.as_ref(),
                    None,
                );
                short_closed.push(pos.clone());
                all_closed.push(pos);
            }
            short_exited = true;
            let post = manager.check_cycle_pnl(open_long.as_ref(), None, current);
            if post.should_force_close {
                force_close(
                    &mut manager,
                    &mut open_long,
                    &mut open_short,
                    current,
                    &mut long_closed,
                    &mut short_closed,
                    &mut all_closed,
                    &mut forced_closures,
                );
                continue;
            }
        } else {
            let average_short = open_short.as_ref().map_or(false, |pos| {
                !pos.has_averaging
                    && pos.adverse_move_percent(current.close) >= params.averaging_threshold
                    && signals::ema_cross_recovery(
                        Direction::Short,
                        prev1.close,
                        ema_p1,
                        current.close,
                        ema,
                    )
            });
            if average_short {
                let mut detail = String::new();
                if let Some(pos) = open_short.as_mut() {
                    let adverse = pos.adverse_move_percent(current.close);
                    pos.apply_averaging(current);
                    pos.mark_to_market(current);
                    detail = format!(
                        "{} + {} -> avg {} (drawdown {:.2}%)",
                        pos.entry_price, current.close, pos.average_price, adverse
                    );
                }
                if let Some(pos) = open_short.as_ref() {
                    manager.sync_open_trade(pos);
                }
                manager.log_event(
                    CycleAction::ShortAveraging,
                    &detail,
                    Some(current.close),
                    None,
                    open_long.as_ref(),
                    open_short.as_ref(),
                );
            }
        }

        // --- entries -------------------------------------------------------
        if open_long.is_none() && !long_exited {
            let reversal = signals::rsi_reversal(
                params.rsi_reversal_mode,
                Direction::Long,
                rsi,
                rsi_p1,
                rsi_p2,
                params.rsi_oversold,
                params.rsi_overbought,
            );
            if reversal
                && signals::ema_distance_ok(
                    Direction::Long,
                    current.close,
                    ema,
                    params.ema_distance_percent,
                )
            {
                let pos = Position::open(
                    Direction::Long,
                    current,
                    ema,
                    rsi,
                    open_short.as_ref().map(Position::snapshot),
                );
                manager.add_open_trade(&pos);
                manager.log_event(
                    CycleAction::LongEntry,
                    &format!("entry {} (RSI {:.1})", current.close, rsi),
                    Some(current.close),
                    Some(0.0),
                    Some(&pos),
                    open_short.as_ref(),
                );
                open_long = Some(pos);
            }
        }

        if open_short.is_none() && !short_exited {
            let reversal = signals::rsi_reversal(
                params.rsi_reversal_mode,
                Direction::Short,
                rsi,
                rsi_p1,
                rsi_p2,
                params.rsi_oversold,
                params.rsi_overbought,
            );
            if reversal
                && signals::ema_distance_ok(
                    Direction::Short,
                    current.close,
                    ema,
                    params.ema_distance_percent,
                )
            {
                let pos = Position::open(
                    Direction::Short,
                    current,
                    ema,
                    rsi,
                    open_long.as_ref().map(Position::snapshot),
                );
                manager.add_open_trade(&pos);
                manager.log_event(
                    CycleAction::ShortEntry,
                    &format!("entry {} (RSI {:.1})", current.close, rsi),
                    Some(current.close),
                    Some(0.0),
                    open_long.as_ref(),
                    Some(&pos),
                );
                open_short = Some(pos);
            }
        }
    }

    // End of data: either close the books on an empty cycle, or leave the
    // cycle active with the final marks recorded.
    let last = &candles[candles.len() - 1];
    if open_long.is_none() && open_short.is_none() {
        manager.end_active_cycle(last);
    } else {
        for pos in [open_long.as_ref(), open_short.as_ref()].into_iter().flatten() {
            manager.sync_open_trade(pos);
        }
        manager.check_cycle_pnl(open_long.as_ref(), open_short.as_ref(), last);
    }

    let realized_pnl: f64 = all_closed.iter().map(|t| t.pnl_percent.unwrap_or(0.0)).sum();
    let unrealized_pnl = open_long
        .as_ref()
        .map_or(0.0, |p| p.unrealized_pnl_percent)
        + open_short
            .as_ref()
            .map_or(0.0, |p| p.unrealized_pnl_percent);

    Ok(CombinedRun {
        cycles: manager.into_cycles(),
        long_closed,
        short_closed,
        all_closed,
        open_long,
        open_short,
        realized_pnl,
        unrealized_pnl,
        total_pnl: realized_pnl + unrealized_pnl,
        forced_closures,
    })
}

#[allow(clippy::too_many_arguments)]
fn force_close(
    manager: &mut CycleManager,
    open_long: &mut Option<Position>,
    open_short: &mut Option<Position>,
    candle: &Candle,
    long_closed: &mut Vec<Position>,
    short_closed: &mut Vec<Position>,
    all_closed: &mut Vec<Position>,
    forced_closures: &mut u32,
) {
    let (cl, cs) = manager.force_close_cycle(open_long.take(), open_short.take(), candle);
    if let Some(pos) = cl {
        long_closed.push(pos.clone());
        all_closed.push(pos);
    }
    if let Some(pos) = cs {
        short_closed.push(pos.clone());
        all_closed.push(pos);
    }
    *forced_closures += 1;
    manager.start_new_cycle(candle);
}

// ---------------------------------------------------------------------------
