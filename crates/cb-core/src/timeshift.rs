//! Staggered-tranche replays: the deposit is split into equal parts that
//! enter the market at calendar offsets, each running the combined strategy
//! over its own suffix of the series. Tranche results are aggregated with
//! capital weighting; the runs themselves are independent and fan out on
//! rayon.

use rayon::prelude::*;
use serde::Serialize;

use crate::candle::Candle;
use crate::config::{StrategyParams, TimeShiftParams};
use crate::engine::{run_combined, CombinedRun};
use crate::error::{SimError, SimResult};

/// A tranche is skipped when its start leaves this many candles or fewer.
pub const MIN_TRAILING_CANDLES: usize = 10;

const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Serialize)]
pub struct DepositPart {
    pub part_id: usize,
    pub start_offset_days: f64,
    pub start_index: usize,
    pub start_time: String,
    /// Share of the total deposit, `1 / deposit_parts`.
    pub deposit_fraction: f64,
    /// Unscaled replay over the tranche's candle suffix.
    pub run: CombinedRun,
}

#[derive(Debug, Serialize)]
pub struct TimeShiftRun {
    pub enabled: bool,
    pub parts: Vec<DepositPart>,
    pub active_parts: usize,
    /// Capital-weighted PnL figures (percent of the total deposit).
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    /// Tranche total returns weighted by deposit fraction. Equals
    /// `total_pnl` while every tranche holds an equal fraction; kept as its
    /// own figure so skipped tranches read as zero-return capital.
    pub weighted_average_return: f64,
    /// Counts are summed unscaled across tranches.
    pub total_cycles: usize,
    pub closed_cycles: usize,
    pub forced_closures: u32,
    pub total_trades: usize,
    pub first_entry_time: String,
    pub last_entry_time: String,
    pub trading_days: f64,
}

pub fn run_time_shifted(
    candles: &[Candle],
    params: &StrategyParams,
    shift: &TimeShiftParams,
) -> SimResult<TimeShiftRun> {
    params.validate()?;
    shift.validate()?;
    if candles.is_empty() {
        return Err(SimError::Data("empty candle series".into()));
    }

    if !shift.enabled {
        // Single tranche covering the whole series with the full deposit.
        let run = run_combined(candles, params)?;
        let part = DepositPart {
            part_id: 1,
            start_offset_days: 0.0,
            start_index: 0,
            start_time: candles[0].display_time.clone(),
            deposit_fraction: 1.0,
            run,
        };
        return Ok(aggregate(false, vec![part], candles));
    }

    let first_ts = candles[0].timestamp_ms;
    let mut specs: Vec<(usize, f64, usize)> = Vec::new();
    for part_id in 1..=shift.deposit_parts {
        let offset_days = (part_id - 1) as f64 * shift.entry_interval_days;
        let target_ts = first_ts + (offset_days * MS_PER_DAY) as i64;
        let start_index = candles
            .iter()
            .position(|c| c.timestamp_ms >= target_ts)
            .unwrap_or(candles.len());
        if start_index >= candles.len().saturating_sub(MIN_TRAILING_CANDLES) {
            tracing::warn!(
                part_id,
                start_index,
                candles = candles.len(),
                "deposit part skipped, too close to end of data"
            );
            continue;
        }
        specs.push((part_id, offset_days, start_index));
    }

    if specs.is_empty() {
        return Err(SimError::NoActiveParts {
            requested: shift.deposit_parts,
            candles: candles.len(),
        });
    }

    let fraction = 1.0 / shift.deposit_parts as f64;
    let parts: Vec<DepositPart> = specs
        .par_iter()
        .map(|&(part_id, start_offset_days, start_index)| {
            let slice = &candles[start_index..];
            let run = run_combined(slice, params)?;
            Ok(DepositPart {
                part_id,
                start_offset_days,
                start_index,
                start_time: slice[0].display_time.clone(),
                deposit_fraction: fraction,
                run,
            })
        })
        .collect::<SimResult<Vec<_>>>()?;

    Ok(aggregate(true, parts, candles))
}

fn aggregate(enabled: bool, parts: Vec<DepositPart>, candles: &[Candle]) -> TimeShiftRun {
    let mut realized_pnl = 0.0;
    let mut unrealized_pnl = 0.0;
    let mut weighted_average_return = 0.0;
    let mut total_cycles = 0;
    let mut closed_cycles = 0;
    let mut forced_closures = 0;
    let mut total_trades = 0;
    for part in &parts {
        realized_pnl += part.run.realized_pnl * part.deposit_fraction;
        unrealized_pnl += part.run.unrealized_pnl * part.deposit_fraction;
        weighted_average_return += part.run.total_pnl * part.deposit_fraction;
        total_cycles += part.run.cycles.len();
        closed_cycles += part.run.cycles.iter().filter(|c| !c.is_active).count();
        forced_closures += part.run.forced_closures;
        total_trades += part.run.all_closed.len();
    }

    let first_entry_time = parts
        .iter()
        .min_by_key(|p| p.start_index)
        .map(|p| p.start_time.clone())
        .unwrap_or_default();
    let last_entry_time = parts
        .iter()
        .max_by_key(|p| p.start_index)
        .map(|p| p.start_time.clone())
        .unwrap_or_default();
    let trading_days = (candles[candles.len() - 1].timestamp_ms - candles[0].timestamp_ms) as f64
        / MS_PER_DAY;

    TimeShiftRun {
        enabled,
        active_parts: parts.len(),
        parts,
        realized_pnl,
        unrealized_pnl,
        total_pnl: realized_pnl + unrealized_pnl,
        weighted_average_return,
        total_cycles,
        closed_cycles,
        forced_closures,
        total_trades,
        first_entry_time,
        last_entry_time,
        trading_days,
    }
}

// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn daily_series(days: usize) -> Vec<Candle> {
        (0..days)
            .map(|i| {
                let ts = i as i64 * 86_400_000;
                let mut c = Candle::new(ts, format!("day-{i}"), 100.0, 100.0, 100.0, 100.0, 1.0);
                c.rsi = Some(50.0);
                c.ema = Some(100.0);
                c
            })
            .collect()
    }

    #[test]
    fn disabled_runs_single_full_tranche() {
        let candles = daily_series(30);
        let shift = TimeShiftParams {
            enabled: false,
            ..TimeShiftParams::default()
        };
        let run = run_time_shifted(&candles, &StrategyParams::default(), &shift).unwrap();
        assert_eq!(run.active_parts, 1);
        assert_eq!(run.parts[0].deposit_fraction, 1.0);
        assert_eq!(run.parts[0].start_index, 0);
    }

    #[test]
    fn tranche_offsets_and_skip_floor() {
        // 26 daily candles, 4 parts at 7-day spacing: starts 0, 7, 14, 21.
        // Part 4 leaves only 5 candles and is skipped.
        let candles = daily_series(26);
        let shift = TimeShiftParams {
            enabled: true,
            deposit_parts: 4,
            entry_interval_days: 7.0,
        };
        let run = run_time_shifted(&candles, &StrategyParams::default(), &shift).unwrap();
        assert_eq!(run.active_parts, 3);
        let starts: Vec<usize> = run.parts.iter().map(|p| p.start_index).collect();
        assert_eq!(starts, vec![0, 7, 14]);
        for p in &run.parts {
            assert!((p.deposit_fraction - 0.25).abs() < 1e-12);
        }
        // flat series: every weighted figure is zero
        assert_eq!(run.weighted_average_return, 0.0);
    }

    #[test]
    fn all_parts_active_fractions_sum_to_one() {
        let candles = daily_series(40);
        let shift = TimeShiftParams {
            enabled: true,
            deposit_parts: 4,
            entry_interval_days: 7.0,
        };
        let run = run_time_shifted(&candles, &StrategyParams::default(), &shift).unwrap();
        assert_eq!(run.active_parts, 4);
        let sum: f64 = run.parts.iter().map(|p| p.deposit_fraction).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_surviving_tranches_is_an_error() {
        let candles = daily_series(5);
        let shift = TimeShiftParams {
            enabled: true,
            deposit_parts: 2,
            entry_interval_days: 7.0,
        };
        let err = run_time_shifted(&candles, &StrategyParams::default(), &shift).unwrap_err();
        assert!(matches!(err, SimError::NoActiveParts { requested: 2, .. }));
    }
}
