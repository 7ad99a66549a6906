//! End-to-end replay scenarios over hand-built candle fixtures. Indicator
//! values are set explicitly so each scenario pins down one behavior.

use cb_core::candle::Candle;
use cb_core::config::StrategyParams;
use cb_core::cycle::CycleAction;
use cb_core::engine::run_combined;
use cb_core::position::{EXIT_EMA_TOUCH, EXIT_PROFIT_THRESHOLD};
use cb_core::timeshift::run_time_shifted;
use cb_core::TimeShiftParams;

const HOUR_MS: i64 = 3_600_000;

fn candle(i: usize, close: f64, rsi: f64, ema: f64) -> Candle {
    let mut c = Candle::new(
        i as i64 * HOUR_MS,
        format!("bar-{i:04}"),
        close,
        close,
        close,
        close,
        1.0,
    );
    c.rsi = Some(rsi);
    c.ema = Some(ema);
    c
}

fn quiet_params() -> StrategyParams {
    // commission off and a threshold high enough that cycles never force
    // close unless a scenario wants them to
    StrategyParams {
        commission_percent: 0.0,
        cycle_profit_threshold: 100.0,
        ..StrategyParams::default()
    }
}

#[test]
fn long_entry_and_ema_cross_exit() {
    let candles = vec![
        candle(0, 100.0, 20.0, 100.0),
        candle(1, 100.0, 30.0, 101.0),
        // strict reversal (40 > 30 > 20), zone on prev1, EMA 1% above close
        candle(2, 100.0, 40.0, 101.0),
        candle(3, 104.0, 50.0, 103.0),
        // cross down through EMA with 0.625% size-weighted profit
        candle(4, 102.5, 50.0, 103.0),
    ];
    let run = run_combined(&candles, &quiet_params()).unwrap();

    assert_eq!(run.long_closed.len(), 1);
    assert!(run.short_closed.is_empty());
    assert!(run.open_long.is_none());

    let trade = &run.long_closed[0];
    assert_eq!(trade.entry_price, 100.0);
    assert_eq!(trade.exit_price, Some(102.5));
    assert_eq!(trade.size_fraction, 0.25);
    assert_eq!(trade.reason.as_deref(), Some(EXIT_EMA_TOUCH));
    assert!((trade.pnl_percent.unwrap() - 0.625).abs() < 1e-12);
    assert!((run.realized_pnl - 0.625).abs() < 1e-12);

    // no open slots at end of data, so the cycle is finalized
    assert_eq!(run.cycles.len(), 1);
    let cycle = &run.cycles[0];
    assert!(!cycle.is_active);
    assert!(!cycle.force_closed);
    assert!((cycle.final_pnl.unwrap() - 0.625).abs() < 1e-12);
    let actions: Vec<CycleAction> = cycle.logs.iter().map(|e| e.action).collect();
    assert!(actions.contains(&CycleAction::LongEntry));
    assert!(actions.contains(&CycleAction::LongClosed));
    assert_eq!(actions.last(), Some(&CycleAction::CycleEnd));
}

#[test]
fn no_exit_below_min_profit() {
    let mut params = quiet_params();
    params.min_profit_percent = 0.7;
    let candles = vec![
        candle(0, 100.0, 20.0, 100.0),
        candle(1, 100.0, 30.0, 101.0),
        candle(2, 100.0, 40.0, 101.0),
        candle(3, 104.0, 50.0, 103.0),
        // cross happens but 0.625% < 0.7% floor
        candle(4, 102.5, 50.0, 103.0),
    ];
    let run = run_combined(&candles, &params).unwrap();
    assert!(run.long_closed.is_empty());
    assert!(run.open_long.is_some());
    assert!(run.cycles[0].is_active);
}

#[test]
fn averaging_at_half_percent_drawdown() {
    let candles = vec![
        candle(0, 100.0, 20.0, 100.0),
        candle(1, 100.0, 30.0, 101.0),
        candle(2, 100.0, 40.0, 101.0),
        // drop below EMA, not enough recovery yet
        candle(3, 99.3, 50.0, 99.5),
        // recovery cross with a 0.6% adverse move: averaging fires
        candle(4, 99.4, 50.0, 99.35),
    ];
    let run = run_combined(&candles, &quiet_params()).unwrap();

    let pos = run.open_long.as_ref().expect("long stays open");
    assert!(pos.has_averaging);
    assert_eq!(pos.averaging_price, Some(99.4));
    assert!((pos.average_price - 99.7).abs() < 1e-12);
    assert_eq!(pos.size_fraction, 0.5);
    // (99.4 - 99.7) / 99.7 * 100 * 0.5
    let want = (99.4 - 99.7) / 99.7 * 100.0 * 0.5;
    assert!((pos.unrealized_pnl_percent - want).abs() < 1e-12);

    // the cycle record mirrors the averaged state and stays active
    let cycle = &run.cycles[0];
    assert!(cycle.is_active);
    assert_eq!(cycle.long_trades.len(), 1);
    assert!(cycle.long_trades[0].has_averaging);
    assert!(cycle
        .logs
        .iter()
        .any(|e| e.action == CycleAction::LongAveraging));
}

#[test]
fn averaging_fires_at_most_once() {
    let candles = vec![
        candle(0, 100.0, 20.0, 100.0),
        candle(1, 100.0, 30.0, 101.0),
        candle(2, 100.0, 40.0, 101.0),
        candle(3, 99.3, 50.0, 99.5),
        candle(4, 99.4, 50.0, 99.35),
        // second recovery cross with an even deeper move: ignored
        candle(5, 99.0, 50.0, 99.2),
        candle(6, 99.1, 50.0, 99.05),
    ];
    let run = run_combined(&candles, &quiet_params()).unwrap();
    let pos = run.open_long.as_ref().expect("long stays open");
    assert_eq!(pos.averaging_price, Some(99.4));
    assert_eq!(pos.size_fraction, 0.5);
    let averaging_events = run.cycles[0]
        .logs
        .iter()
        .filter(|e| e.action == CycleAction::LongAveraging)
        .count();
    assert_eq!(averaging_events, 1);
}

#[test]
fn unrealized_gain_forces_cycle_closure() {
    let mut params = quiet_params();
    params.cycle_profit_threshold = 0.5;
    let candles = vec![
        candle(0, 100.0, 20.0, 100.0),
        candle(1, 100.0, 30.0, 101.0),
        candle(2, 100.0, 40.0, 101.0),
        // mark: 2.5% * 0.25 = 0.625 > 0.5 -> forced closure consumes the bar
        candle(3, 102.5, 50.0, 102.0),
        candle(4, 102.5, 50.0, 102.2),
    ];
    let run = run_combined(&candles, &params).unwrap();

    assert_eq!(run.forced_closures, 1);
    assert_eq!(run.all_closed.len(), 1);
    let trade = &run.all_closed[0];
    assert_eq!(trade.reason.as_deref(), Some(EXIT_PROFIT_THRESHOLD));
    assert!((trade.pnl_percent.unwrap() - 0.625).abs() < 1e-12);

    assert_eq!(run.cycles.len(), 2);
    assert!(run.cycles[0].force_closed);
    assert_eq!(run.cycles[0].end_time_ms, Some(3 * HOUR_MS));
    assert!(!run.cycles[1].force_closed);
    assert!(!run.cycles[1].is_active);
    assert!(run.cycles[0]
        .logs
        .iter()
        .any(|e| e.action == CycleAction::ForceClose));
}

#[test]
fn commission_reduces_realized_pnl() {
    let mut params = quiet_params();
    params.commission_percent = 0.1;
    let candles = vec![
        candle(0, 100.0, 20.0, 100.0),
        candle(1, 100.0, 30.0, 101.0),
        candle(2, 100.0, 40.0, 101.0),
        candle(3, 104.0, 50.0, 103.0),
        candle(4, 102.5, 50.0, 103.0),
    ];
    let run = run_combined(&candles, &params).unwrap();
    let trade = &run.long_closed[0];
    assert!((trade.gross_pnl_percent.unwrap() - 0.625).abs() < 1e-12);
    assert!((trade.commission_amount.unwrap() - 0.025).abs() < 1e-12);
    assert!((trade.pnl_percent.unwrap() - 0.6).abs() < 1e-12);
}

#[test]
fn short_side_mirrors_long_lifecycle() {
    let candles = vec![
        candle(0, 100.0, 80.0, 100.0),
        candle(1, 100.0, 70.0, 99.0),
        // strict short reversal (60 < 70 < 80), EMA 1% below close
        candle(2, 100.0, 60.0, 99.0),
        candle(3, 96.0, 50.0, 97.0),
        // cross back up through EMA with profit
        candle(4, 97.5, 50.0, 97.0),
    ];
    let run = run_combined(&candles, &quiet_params()).unwrap();
    assert_eq!(run.short_closed.len(), 1);
    assert!(run.long_closed.is_empty());
    let trade = &run.short_closed[0];
    // (100 - 97.5) / 100 * 100 * 0.25
    assert!((trade.pnl_percent.unwrap() - 0.625).abs() < 1e-12);
    assert_eq!(trade.reason.as_deref(), Some(EXIT_EMA_TOUCH));
}

#[test]
fn time_shift_weighs_identical_tranches_by_fraction() {
    // 40 daily candles; the trade pattern sits at indices 30..35 so every
    // tranche (starts 0, 7, 14, 21) replays the identical trade.
    let mut candles: Vec<Candle> = (0..40)
        .map(|i| {
            let mut c = Candle::new(
                i as i64 * 86_400_000,
                format!("day-{i:02}"),
                100.0,
                100.0,
                100.0,
                100.0,
                1.0,
            );
            c.rsi = Some(50.0);
            c.ema = Some(100.0);
            c
        })
        .collect();
    let pattern = [
        (30, 100.0, 20.0, 100.0),
        (31, 100.0, 30.0, 101.0),
        (32, 100.0, 40.0, 101.0),
        (33, 104.0, 50.0, 103.0),
        (34, 102.5, 50.0, 103.0),
    ];
    for (i, close, rsi, ema) in pattern {
        candles[i].close = close;
        candles[i].open = close;
        candles[i].high = close;
        candles[i].low = close;
        candles[i].rsi = Some(rsi);
        candles[i].ema = Some(ema);
    }
    for c in candles.iter_mut().skip(35) {
        c.close = 102.5;
        c.ema = Some(102.5);
    }

    let shift = TimeShiftParams {
        enabled: true,
        deposit_parts: 4,
        entry_interval_days: 7.0,
    };
    let run = run_time_shifted(&candles, &quiet_params(), &shift).unwrap();

    assert_eq!(run.active_parts, 4);
    assert_eq!(run.total_trades, 4);
    for part in &run.parts {
        assert!((part.run.realized_pnl - 0.625).abs() < 1e-12);
        assert!((part.deposit_fraction - 0.25).abs() < 1e-12);
    }
    // 4 tranches at quarter weight with identical PnL: same as one deposit
    assert!((run.realized_pnl - 0.625).abs() < 1e-12);
    assert!((run.total_pnl - 0.625).abs() < 1e-12);
    assert!((run.weighted_average_return - 0.625).abs() < 1e-12);
}
