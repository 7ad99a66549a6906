//! Trading cycles: grouped trades, PnL accounting, forced liquidation, and
//! the append-only audit log.
//!
//! Realized PnL is never carried as a running counter; it is recomputed as a
//! fold over the cycle's closed trades every time it is needed. Closed trades
//! overwrite their open records in place, located by the
//! `(entry_time_ms, entry_price)` identity key.

use serde::Serialize;

use crate::candle::Candle;
use crate::position::{Direction, Position, EXIT_PROFIT_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleAction {
    CycleStart,
    LongEntry,
    ShortEntry,
    LongAveraging,
    ShortAveraging,
    LongClosed,
    ShortClosed,
    ForceClose,
    CycleEnd,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleLogEntry {
    pub time_ms: i64,
    pub time: String,
    pub action: CycleAction,
    pub detail: String,
    pub price: Option<f64>,
    pub pnl: Option<f64>,
    /// Cycle realized PnL at the instant the entry was appended.
    pub realized_pnl: f64,
    /// Rendered summary of the open slots at that instant.
    pub open_positions: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cycle {
    pub id: u32,
    pub start_time_ms: i64,
    pub start_time: String,
    pub end_time_ms: Option<i64>,
    pub end_time: Option<String>,
    pub long_trades: Vec<Position>,
    pub short_trades: Vec<Position>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub is_active: bool,
    pub force_closed: bool,
    pub final_pnl: Option<f64>,
    pub logs: Vec<CycleLogEntry>,
}

impl Cycle {
    fn new(id: u32, start_time_ms: i64, start_time: String) -> Self {
        Self {
            id,
            start_time_ms,
            start_time,
            end_time_ms: None,
            end_time: None,
            long_trades: Vec::new(),
            short_trades: Vec::new(),
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            is_active: true,
            force_closed: false,
            final_pnl: None,
            logs: Vec::new(),
        }
    }

    /// Fold net PnL over closed trades and store the result.
    pub fn recompute_realized(&mut self) -> f64 {
        let sum: f64 = self
            .long_trades
            .iter()
            .chain(self.short_trades.iter())
            .filter(|t| t.exit_time_ms.is_some())
            .map(|t| t.pnl_percent.unwrap_or(0.0))
            .sum();
        self.realized_pnl = sum;
        sum
    }

    pub fn trade_count(&self) -> usize {
        self.long_trades.len() + self.short_trades.len()
    }
}

/// Result of the once-per-candle cycle PnL check.
#[derive(Debug, Clone, Copy)]
pub struct CyclePnlCheck {
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    pub threshold: f64,
    pub should_force_close: bool,
}

pub struct CycleManager {
    cycles: Vec<Cycle>,
    next_id: u32,
    profit_threshold: f64,
    commission_percent: f64,
    // Last seen candle time, so lazily created cycles never need a clock.
    last_time_ms: i64,
    last_time: String,
}

impl CycleManager {
    pub fn new(profit_threshold: f64, commission_percent: f64) -> Self {
        Self {
            cycles: Vec::new(),
            next_id: 0,
            profit_threshold,
            commission_percent,
            last_time_ms: 0,
            last_time: String::new(),
        }
    }

    pub fn touch(&mut self, candle: &Candle) {
        self.last_time_ms = candle.timestamp_ms;
        self.last_time = candle.display_time.clone();
    }

    fn active_index(&self) -> Option<usize> {
        self.cycles.iter().rposition(|c| c.is_active)
    }

    fn push_new_cycle(&mut self) -> usize {
        self.next_id += 1;
        let mut cycle = Cycle::new(self.next_id, self.last_time_ms, self.last_time.clone());
        cycle.logs.push(CycleLogEntry {
            time_ms: self.last_time_ms,
            time: self.last_time.clone(),
            action: CycleAction::CycleStart,
            detail: format!("cycle {} started", self.next_id),
            price: None,
            pnl: None,
            realized_pnl: 0.0,
            open_positions: "none".to_string(),
        });
        self.cycles.push(cycle);
        self.cycles.len() - 1
    }

    /// The active cycle, created lazily at the last seen candle time.
    pub fn current_cycle(&mut self) -> &mut Cycle {
        let idx = match self.active_index() {
            Some(i) => i,
            None => self.push_new_cycle(),
        };
        &mut self.cycles[idx]
    }

    /// Append an audit entry to the active cycle. Close-type actions refresh
    /// the realized fold first so the entry carries the post-close figure.
    pub fn log_event(
        &mut self,
        action: CycleAction,
        detail: &str,
        price: Option<f64>,
        pnl: Option<f64>,
        open_long: Option<&Position>,
        open_short: Option<&Position>,
    ) {
        let open_positions = render_open_positions(open_long, open_short);
        let time_ms = self.last_time_ms;
        let time = self.last_time.clone();
        let cycle = self.current_cycle();
        let realized_pnl = match action {
            CycleAction::LongClosed
            | CycleAction::ShortClosed
            | CycleAction::ForceClose
            | CycleAction::CycleEnd => cycle.recompute_realized(),
            _ => cycle.realized_pnl,
        };
        cycle.logs.push(CycleLogEntry {
            time_ms,
            time,
            action,
            detail: detail.to_string(),
            price,
            pnl,
            realized_pnl,
            open_positions,
        });
    }

    /// Record a freshly opened position in the active cycle.
    pub fn add_open_trade(&mut self, pos: &Position) {
        let cycle = self.current_cycle();
        match pos.direction {
            Direction::Long => cycle.long_trades.push(pos.clone()),
            Direction::Short => cycle.short_trades.push(pos.clone()),
        }
    }

    fn overwrite_open_record(&mut self, pos: &Position) {
        let cycle = self.current_cycle();
        let list = match pos.direction {
            Direction::Long => &mut cycle.long_trades,
            Direction::Short => &mut cycle.short_trades,
        };
        let slot = list.iter_mut().find(|t| {
            t.exit_time_ms.is_none()
                && t.entry_time_ms == pos.entry_time_ms
                && t.entry_price == pos.entry_price
        });
        match slot {
            Some(record) => *record = pos.clone(),
            None => tracing::error!(
                direction = %pos.direction,
                entry_time_ms = pos.entry_time_ms,
                entry_price = pos.entry_price,
                "open trade record not found in active cycle"
            ),
        }
    }

    /// Mirror the latest state of a still-open position into its cycle record
    /// (after averaging, or for the final mark at end of data).
    pub fn sync_open_trade(&mut self, pos: &Position) {
        self.overwrite_open_record(pos);
    }

    /// Overwrite the open record with its closed state and refresh the fold.
    pub fn record_closed_trade(&mut self, pos: &Position) {
        self.overwrite_open_record(pos);
        self.current_cycle().recompute_realized();
    }

    /// Recompute realized and unrealized PnL for the active cycle. Unrealized
    /// marks are each reduced by the commission the slot would pay to close.
    /// Pure with respect to engine state: calling twice in a row with the
    /// same inputs yields the same result.
    pub fn check_cycle_pnl(
        &mut self,
        open_long: Option<&Position>,
        open_short: Option<&Position>,
        candle: &Candle,
    ) -> CyclePnlCheck {
        self.touch(candle);
        let commission = self.commission_percent;
        let threshold = self.profit_threshold;
        let cycle = self.current_cycle();
        let realized_pnl = cycle.recompute_realized();
        let mut unrealized_pnl = 0.0;
        for pos in [open_long, open_short].into_iter().flatten() {
            unrealized_pnl += pos.unrealized_pnl_percent - commission * pos.size_fraction;
        }
        cycle.unrealized_pnl = unrealized_pnl;
        let total_pnl = realized_pnl + unrealized_pnl;
        CyclePnlCheck {
            realized_pnl,
            unrealized_pnl,
            total_pnl,
            threshold,
            should_force_close: total_pnl > threshold,
        }
    }

    /// Liquidate every open slot at the candle's close and finalize the
    /// cycle. Returns the closed positions so the engine can collect them.
    pub fn force_close_cycle(
        &mut self,
        open_long: Option<Position>,
        open_short: Option<Position>,
        candle: &Candle,
    ) -> (Option<Position>, Option<Position>) {
        self.touch(candle);
        let commission = self.commission_percent;

        let long_snap = open_long.as_ref().map(Position::snapshot);
        let short_snap = open_short.as_ref().map(Position::snapshot);

        let closed_long = open_long.map(|mut pos| {
            pos.opposite_on_exit = short_snap.clone();
            pos.close_at(candle, EXIT_PROFIT_THRESHOLD, commission);
            pos
        });
        let closed_short = open_short.map(|mut pos| {
            pos.opposite_on_exit = long_snap;
            pos.close_at(candle, EXIT_PROFIT_THRESHOLD, commission);
            pos
        });

        for pos in [closed_long.as_ref(), closed_short.as_ref()]
            .into_iter()
            .flatten()
        {
            self.overwrite_open_record(pos);
        }
        // Each entry shows the slot that has not been logged yet, so the
        // trail reflects the in-progress liquidation.
        if let Some(pos) = closed_long.as_ref() {
            self.log_event(
                CycleAction::ForceClose,
                &force_close_detail(pos, candle),
                Some(candle.close),
                pos.pnl_percent,
                None,
                closed_short.as_ref(),
            );
        }
        if let Some(pos) = closed_short.as_ref() {
            self.log_event(
                CycleAction::ForceClose,
                &force_close_detail(pos, candle),
                Some(candle.close),
                pos.pnl_percent,
                None,
                None,
            );
        }

        let final_pnl;
        {
            let cycle = self.current_cycle();
            final_pnl = cycle.recompute_realized();
        }
        self.log_event(
            CycleAction::CycleEnd,
            &format!("cycle force closed at {final_pnl:+.4}%"),
            Some(candle.close),
            Some(final_pnl),
            None,
            None,
        );
        let time_ms = self.last_time_ms;
        let time = self.last_time.clone();
        let cycle = self.current_cycle();
        cycle.end_time_ms = Some(time_ms);
        cycle.end_time = Some(time);
        cycle.force_closed = true;
        cycle.final_pnl = Some(final_pnl);
        cycle.unrealized_pnl = 0.0;
        cycle.is_active = false;

        tracing::debug!(
            cycle_id = cycle.id,
            final_pnl,
            "cycle force closed"
        );

        (closed_long, closed_short)
    }

    /// Close the books on the active cycle without liquidation (end of data).
    pub fn end_active_cycle(&mut self, candle: &Candle) {
        self.touch(candle);
        if self.active_index().is_none() {
            return;
        }
        let realized = self.current_cycle().recompute_realized();
        self.log_event(
            CycleAction::CycleEnd,
            &format!("cycle ended at {realized:+.4}%"),
            None,
            Some(realized),
            None,
            None,
        );
        let time_ms = self.last_time_ms;
        let time = self.last_time.clone();
        let cycle = self.current_cycle();
        cycle.end_time_ms = Some(time_ms);
        cycle.end_time = Some(time);
        cycle.final_pnl = Some(cycle.realized_pnl);
        cycle.is_active = false;
    }

    /// Finalize any active cycle and open a fresh one at the candle's time.
    pub fn start_new_cycle(&mut self, candle: &Candle) {
        self.touch(candle);
        if self.active_index().is_some() {
            self.end_active_cycle(candle);
        }
        self.push_new_cycle();
    }

    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    pub fn into_cycles(self) -> Vec<Cycle> {
        self.cycles
    }
}

fn force_close_detail(pos: &Position, candle: &Candle) -> String {
    format!(
        "{} force closed: entry {} -> exit {}",
        pos.direction,
        pos.entry_price,
        pos.exit_price.unwrap_or(candle.close),
    )
}

fn render_open_positions(open_long: Option<&Position>, open_short: Option<&Position>) -> String {
    let mut parts = Vec::new();
    for pos in [open_long, open_short].into_iter().flatten() {
        parts.push(format!(
            "{} {} ({:+.2}%)",
            pos.direction, pos.entry_price, pos.unrealized_pnl_percent
        ));
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(" | ")
    }
}

// ---------------------------------------------------------------------------
