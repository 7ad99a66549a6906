//! Position lifecycle: open, mark, average once, close.

use std::fmt;

use serde::Serialize;

use crate::candle::Candle;

/// Size fraction at entry.
pub const BASE_SIZE_FRACTION: f64 = 0.25;
/// Size fraction after the single allowed averaging step.
pub const AVERAGED_SIZE_FRACTION: f64 = 0.5;

/// Exit reason for a regular EMA-cross close.
pub const EXIT_EMA_TOUCH: &str = "EMA_TOUCH_WITH_PROFIT";
/// Exit reason for a cycle-level forced liquidation.
pub const EXIT_PROFIT_THRESHOLD: &str = "PROFIT_THRESHOLD_REACHED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

/// State of the opposing slot captured when a position opens or closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSnapshot {
    pub entry_price: f64,
    pub entry_time: String,
    pub has_averaging: bool,
    pub unrealized_pnl: Option<f64>,
}

/// One long or short position. A direction has at most one open position at a
/// time; its identity inside cycle records is `(entry_time_ms, entry_price)`.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub direction: Direction,
    pub entry_time_ms: i64,
    pub entry_time: String,
    pub entry_price: f64,
    pub entry_ema: f64,
    pub entry_rsi: f64,

    pub has_averaging: bool,
    pub averaging_price: Option<f64>,
    pub averaging_time: Option<String>,
    pub averaging_ema: Option<f64>,

    pub exit_time_ms: Option<i64>,
    pub exit_time: Option<String>,
    pub exit_price: Option<f64>,
    pub exit_ema: Option<f64>,

    /// Entry price, or the entry/averaging midpoint after averaging.
    pub average_price: f64,
    /// 0.25 at entry, 0.5 after averaging.
    pub size_fraction: f64,

    pub gross_pnl_percent: Option<f64>,
    pub commission_rate: Option<f64>,
    pub commission_amount: Option<f64>,
    /// Net realized PnL percent (gross minus commission). `None` while open.
    pub pnl_percent: Option<f64>,
    pub reason: Option<String>,

    pub current_price: f64,
    pub current_time: String,
    pub unrealized_pnl_percent: f64,

    pub opposite_on_entry: Option<SlotSnapshot>,
    pub opposite_on_exit: Option<SlotSnapshot>,
}

impl Position {
    /// Open a position at the candle's close with the base size fraction.
    pub fn open(
        direction: Direction,
        candle: &Candle,
        ema: f64,
        rsi: f64,
        opposite: Option<SlotSnapshot>,
    ) -> Self {
        Self {
            direction,
            entry_time_ms: candle.timestamp_ms,
            entry_time: candle.display_time.clone(),
            entry_price: candle.close,
            entry_ema: ema,
            entry_rsi: rsi,
            has_averaging: false,
            averaging_price: None,
            averaging_time: None,
            averaging_ema: None,
            exit_time_ms: None,
            exit_time: None,
            exit_price: None,
            exit_ema: None,
            average_price: candle.close,
            size_fraction: BASE_SIZE_FRACTION,
            gross_pnl_percent: None,
            commission_rate: None,
            commission_amount: None,
            pnl_percent: None,
            reason: None,
            current_price: candle.close,
            current_time: candle.display_time.clone(),
            unrealized_pnl_percent: 0.0,
            opposite_on_entry: opposite,
            opposite_on_exit: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_time_ms.is_none()
    }

    /// Size-weighted PnL percent at the given close.
    ///
    /// A non-positive average price means the bookkeeping is broken; the
    /// value is reported as zero and the problem surfaced at error level
    /// rather than letting NaN propagate through cycle totals.
    pub fn pnl_percent_at(&self, close: f64) -> f64 {
        if self.average_price <= 0.0 {
            tracing::error!(
                direction = %self.direction,
                entry_price = self.entry_price,
                average_price = self.average_price,
                "non-positive average price, reporting PnL as zero"
            );
            return 0.0;
        }
        let favorable = match self.direction {
            Direction::Long => close - self.average_price,
            Direction::Short => self.average_price - close,
        };
        favorable / self.average_price * 100.0 * self.size_fraction
    }

    /// Refresh the live mark fields against the current candle.
    pub fn mark_to_market(&mut self, candle: &Candle) {
        self.current_price = candle.close;
        self.current_time = candle.display_time.clone();
        self.unrealized_pnl_percent = self.pnl_percent_at(candle.close);
    }

    /// Adverse move from entry, percent. Positive when the market has moved
    /// against the position.
    pub fn adverse_move_percent(&self, close: f64) -> f64 {
        match self.direction {
            Direction::Long => (self.entry_price - close) / self.entry_price * 100.0,
            Direction::Short => (close - self.entry_price) / self.entry_price * 100.0,
        }
    }

    /// Apply the single averaging step at the candle's close. The average
    /// price becomes the entry/averaging midpoint and the size doubles.
    pub fn apply_averaging(&mut self, candle: &Candle) {
        self.has_averaging = true;
        self.averaging_price = Some(candle.close);
        self.averaging_time = Some(candle.display_time.clone());
        self.averaging_ema = candle.ema;
        self.average_price = (self.entry_price + candle.close) / 2.0;
        self.size_fraction = AVERAGED_SIZE_FRACTION;
    }

    /// Close at the candle's close. Commission is charged pro rata to the
    /// size fraction and deducted from the gross PnL.
    pub fn close_at(&mut self, candle: &Candle, reason: &str, commission_percent: f64) {
        let gross = self.pnl_percent_at(candle.close);
        let commission = commission_percent * self.size_fraction;
        self.exit_time_ms = Some(candle.timestamp_ms);
        self.exit_time = Some(candle.display_time.clone());
        self.exit_price = Some(candle.close);
        self.exit_ema = candle.ema;
        self.gross_pnl_percent = Some(gross);
        self.commission_rate = Some(commission_percent);
        self.commission_amount = Some(commission);
        self.pnl_percent = Some(gross - commission);
        self.reason = Some(reason.to_string());
        self.current_price = candle.close;
        self.current_time = candle.display_time.clone();
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        SlotSnapshot {
            entry_price: self.entry_price,
            entry_time: self.entry_time.clone(),
            has_averaging: self.has_averaging,
            unrealized_pnl: Some(self.unrealized_pnl_percent),
        }
    }
}

// ---------------------------------------------------------------------------
