//! Session-level analytics over a finished replay.

use std::fmt::Write as _;

use serde::Serialize;

use crate::cycle::Cycle;
use crate::engine::CombinedRun;
use crate::position::Position;

#[derive(Debug, Clone, Serialize)]
pub struct CycleRow {
    pub cycle_id: u32,
    pub status: &'static str,
    pub start_time: String,
    pub end_time: Option<String>,
    pub trades: usize,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    pub force_closed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub total_cycles: usize,
    pub closed_cycles: usize,
    pub open_cycles: usize,
    pub total_trades: usize,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    pub win_rate: f64,
    /// Gross profit over gross loss; infinite when there are profits and no
    /// losses, zero when there are no trades at all.
    pub profit_factor: f64,
    /// Deepest peak-to-trough drop of the cumulative closed-trade PnL curve.
    pub max_drawdown: f64,
    pub avg_cycle_pnl: f64,
    pub forced_closures: u32,
    pub cycles: Vec<CycleRow>,
}

impl SessionReport {
    pub fn from_run(run: &CombinedRun) -> Self {
        let closed_cycles = run.cycles.iter().filter(|c| !c.is_active).count();
        let closed: Vec<&Cycle> = run.cycles.iter().filter(|c| !c.is_active).collect();
        let avg_cycle_pnl = if closed.is_empty() {
            0.0
        } else {
            closed
                .iter()
                .map(|c| c.final_pnl.unwrap_or(c.realized_pnl))
                .sum::<f64>()
                / closed.len() as f64
        };

        Self {
            total_cycles: run.cycles.len(),
            closed_cycles,
            open_cycles: run.cycles.len() - closed_cycles,
            total_trades: run.all_closed.len(),
            realized_pnl: run.realized_pnl,
            unrealized_pnl: run.unrealized_pnl,
            total_pnl: run.total_pnl,
            win_rate: win_rate(&run.all_closed),
            profit_factor: profit_factor(&run.all_closed),
            max_drawdown: max_drawdown(&run.all_closed),
            avg_cycle_pnl,
            forced_closures: run.forced_closures,
            cycles: run.cycles.iter().map(cycle_row).collect(),
        }
    }

    /// Human-readable one-screen summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "cycles: {} total, {} closed, {} open", self.total_cycles, self.closed_cycles, self.open_cycles);
        let _ = writeln!(out, "trades: {} closed, win rate {:.1}%", self.total_trades, self.win_rate);
        let _ = writeln!(out, "pnl: {:+.4}% realized, {:+.4}% unrealized, {:+.4}% total", self.realized_pnl, self.unrealized_pnl, self.total_pnl);
        if self.profit_factor.is_finite() {
            let _ = writeln!(out, "profit factor: {:.2}", self.profit_factor);
        } else {
            let _ = writeln!(out, "profit factor: inf (no losing trades)");
        }
        let _ = writeln!(out, "max drawdown: {:.4}%", self.max_drawdown);
        let _ = writeln!(out, "avg closed-cycle pnl: {:+.4}%", self.avg_cycle_pnl);
        let _ = writeln!(out, "forced closures: {}", self.forced_closures);
        out
    }

    /// Per-cycle breakdown as CSV.
    pub fn cycles_csv(&self) -> String {
        let mut out = String::from(
            "cycle_id,status,start_time,end_time,trades,realized_pnl,unrealized_pnl,total_pnl,force_closed\n",
        );
        for row in &self.cycles {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{:.6},{:.6},{:.6},{}",
                row.cycle_id,
                row.status,
                row.start_time,
                row.end_time.as_deref().unwrap_or(""),
                row.trades,
                row.realized_pnl,
                row.unrealized_pnl,
                row.total_pnl,
                row.force_closed,
            );
        }
        out
    }
}

fn cycle_row(cycle: &Cycle) -> CycleRow {
    CycleRow {
        cycle_id: cycle.id,
        status: if cycle.is_active { "OPEN" } else { "CLOSED" },
        start_time: cycle.start_time.clone(),
        end_time: cycle.end_time.clone(),
        trades: cycle.trade_count(),
        realized_pnl: cycle.realized_pnl,
        unrealized_pnl: cycle.unrealized_pnl,
        total_pnl: cycle.realized_pnl + cycle.unrealized_pnl,
        force_closed: cycle.force_closed,
    }
}

fn win_rate(trades: &[Position]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades
        .iter()
        .filter(|t| t.pnl_percent.unwrap_or(0.0) > 0.0)
        .count();
    wins as f64 / trades.len() as f64 * 100.0
}

fn profit_factor(trades: &[Position]) -> f64 {
    let mut profit = 0.0;
    let mut loss = 0.0;
    for t in trades {
        let pnl = t.pnl_percent.unwrap_or(0.0);
        if pnl > 0.0 {
            profit += pnl;
        } else {
            loss += -pnl;
        }
    }
    if loss == 0.0 {
        if profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        profit / loss
    }
}

fn max_drawdown(trades: &[Position]) -> f64 {
    let mut equity = 0.0;
    let mut peak = 0.0;
    let mut drawdown = 0.0_f64;
    for t in trades {
        equity += t.pnl_percent.unwrap_or(0.0);
        if equity > peak {
            peak = equity;
        }
        drawdown = drawdown.max(peak - equity);
    }
    drawdown
}

// ---------------------------------------------------------------------------
